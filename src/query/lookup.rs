//! Direct lookups: no keyspace walk needed

use crate::error::StoreResult;
use crate::ingest::{leaderboard_key, user_key};
use crate::store::{FieldMap, KeyValueStore};

use serde::Serialize;

/// A user's position, exactly as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coordinates {
    pub longitude: String,
    pub latitude: String,
}

/// One leaderboard rank that has an email on file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEmail {
    pub user_id: String,
    pub score: f64,
    pub email: String,
}

/// Every attribute of a user, or `None` when the user does not exist
pub async fn user_attributes(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> StoreResult<Option<FieldMap>> {
    let fields = store.hash_get_all(&user_key(user_id)).await?;
    if fields.is_empty() {
        tracing::info!("No user found with id {}", user_id);
        Ok(None)
    } else {
        Ok(Some(fields))
    }
}

/// Longitude and latitude of a user; `None` unless both are present and
/// non-empty
pub async fn user_coordinates(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> StoreResult<Option<Coordinates>> {
    let values = store
        .hash_get_fields(&user_key(user_id), &["longitude", "latitude"])
        .await?;

    let present = |v: Option<&Option<String>>| v.cloned().flatten().filter(|s| !s.is_empty());

    match (present(values.first()), present(values.get(1))) {
        (Some(longitude), Some(latitude)) => Ok(Some(Coordinates {
            longitude,
            latitude,
        })),
        _ => {
            tracing::info!("Coordinates not found for user {}", user_id);
            Ok(None)
        }
    }
}

/// Emails of the `limit` best-scored players of a leaderboard, best first.
///
/// Ranks whose user has no email are left out, so fewer than `limit`
/// entries may come back.
pub async fn top_emails(
    store: &dyn KeyValueStore,
    leaderboard_id: &str,
    limit: usize,
) -> StoreResult<Vec<RankedEmail>> {
    let ranks = store.top_members(&leaderboard_key(leaderboard_id), limit).await?;

    let mut emails = Vec::with_capacity(ranks.len());
    for (user_id, score) in ranks {
        match store.hash_get(&user_key(&user_id), "email").await? {
            Some(email) if !email.is_empty() => emails.push(RankedEmail {
                user_id,
                score,
                email,
            }),
            _ => tracing::debug!("User {} (score {}) has no email", user_id, score),
        }
    }

    Ok(emails)
}
