//! Scan-based queries, each a [`KeyFilter`] driven by [`scan_collect`]

use crate::error::StoreResult;
use crate::ingest::entity_id;
use crate::scan::{scan_collect, KeyFilter, KeyScan};
use crate::store::KeyValueStore;

use serde::Serialize;
use std::ops::RangeInclusive;

/// Glob matching every user hash
pub const USER_PATTERN: &str = "user:*";

/// Keys and last names of users whose id starts with an even digit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvenIdUsers {
    /// Matching keys, in scan order
    pub keys: Vec<String>,
    /// Last names of the matching users that have one
    pub last_names: Vec<String>,
}

/// Fixed projection of a user kept by [`RegionFilter`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// Store key (`user:<id>`)
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub country: String,
    pub latitude: String,
    pub longitude: String,
    pub email: String,
}

/// Whether an id's first character is an even digit (0 included)
pub fn starts_with_even_digit(id: &str) -> bool {
    id.chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .is_some_and(|d| d % 2 == 0)
}

/// Keeps keys whose id starts with an even digit and fetches `last_name`
pub struct EvenIdFilter;

#[async_trait::async_trait]
impl KeyFilter for EvenIdFilter {
    type Output = (String, Option<String>);

    async fn apply(
        &self,
        store: &dyn KeyValueStore,
        key: &str,
    ) -> StoreResult<Option<Self::Output>> {
        if !starts_with_even_digit(entity_id(key)) {
            return Ok(None);
        }
        let last_name = store
            .hash_get(key, "last_name")
            .await?
            .filter(|name| !name.is_empty());
        Ok(Some((key.to_string(), last_name)))
    }
}

/// Users of a given gender, in a set of countries, inside a latitude band
#[derive(Debug, Clone)]
pub struct RegionFilter {
    pub gender: String,
    pub countries: Vec<String>,
    pub latitude: RangeInclusive<f64>,
}

impl Default for RegionFilter {
    /// Women in China or Russia between latitudes 40 and 46
    fn default() -> Self {
        Self {
            gender: "female".to_string(),
            countries: vec!["China".to_string(), "Russia".to_string()],
            latitude: 40.0..=46.0,
        }
    }
}

#[async_trait::async_trait]
impl KeyFilter for RegionFilter {
    type Output = UserProfile;

    async fn apply(
        &self,
        store: &dyn KeyValueStore,
        key: &str,
    ) -> StoreResult<Option<UserProfile>> {
        let mut fields = store.hash_get_all(key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let gender = fields.remove("gender").unwrap_or_default();
        let country = fields.remove("country").unwrap_or_default();
        if gender != self.gender || !self.countries.contains(&country) {
            return Ok(None);
        }

        let latitude = fields.remove("latitude").unwrap_or_default();
        match latitude.trim().parse::<f64>() {
            Ok(lat) if self.latitude.contains(&lat) => {}
            Ok(_) => return Ok(None),
            Err(_) => {
                if !latitude.is_empty() {
                    tracing::debug!("Skipping {}: latitude '{}' is not a number", key, latitude);
                }
                return Ok(None);
            }
        }

        let mut take = |name: &str| fields.remove(name).unwrap_or_default();
        Ok(Some(UserProfile {
            id: key.to_string(),
            first_name: take("first_name"),
            last_name: take("last_name"),
            gender,
            country,
            latitude,
            longitude: take("longitude"),
            email: take("email"),
        }))
    }
}

/// Walk user keys from `scan` and keep those with an even leading digit
pub async fn even_id_users(store: &dyn KeyValueStore, scan: KeyScan) -> StoreResult<EvenIdUsers> {
    let kept = scan_collect(store, scan, &EvenIdFilter).await?;

    let mut result = EvenIdUsers::default();
    for (key, last_name) in kept {
        result.keys.push(key);
        result.last_names.extend(last_name);
    }
    tracing::info!(
        "{} users with an even leading digit, {} last names",
        result.keys.len(),
        result.last_names.len()
    );
    Ok(result)
}

/// Full walk of user keys keeping those `filter` accepts
pub async fn users_in_region(
    store: &dyn KeyValueStore,
    filter: &RegionFilter,
    page_size: usize,
) -> StoreResult<Vec<UserProfile>> {
    let scan = KeyScan::new(USER_PATTERN).with_page_size(page_size);
    let users = scan_collect(store, scan, filter).await?;
    tracing::info!("{} users matched the region filter", users.len());
    Ok(users)
}
