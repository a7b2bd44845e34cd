//! Cursor-driven keyspace walking
//!
//! [`KeyScan`] is the scan loop as a small state machine: it starts
//! `Scanning` at a caller-chosen cursor and becomes `Terminated` exactly
//! when the store hands back cursor 0. It never deduplicates; if the
//! keyspace changes mid-walk a key may come back twice, as the store's own
//! SCAN contract allows.
//!
//! [`KeyFilter`] and [`scan_collect`] compose a walk with a per-key
//! predicate so each query states only what it keeps.

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::StoreResult;
use crate::store::{KeyValueStore, SCAN_COMPLETE};

/// Where a walk stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Next call will resume from this cursor
    Scanning(u64),
    /// The store returned cursor 0
    Terminated,
}

/// An incremental walk over keys matching a glob pattern
#[derive(Debug, Clone)]
pub struct KeyScan {
    pattern: String,
    page_size: usize,
    state: ScanState,
    pages: u64,
}

impl KeyScan {
    /// Full walk starting at cursor 0
    pub fn new(pattern: impl Into<String>) -> Self {
        Self::starting_at(pattern, SCAN_COMPLETE)
    }

    /// Walk starting at an arbitrary cursor.
    ///
    /// A non-zero start covers only part of the keyspace, and which part
    /// depends on the store's cursor encoding.
    pub fn starting_at(pattern: impl Into<String>, cursor: u64) -> Self {
        Self {
            pattern: pattern.into(),
            page_size: DEFAULT_PAGE_SIZE,
            state: ScanState::Scanning(cursor),
            pages: 0,
        }
    }

    /// Keys requested per call; a hint to the store, not a limit
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ScanState::Terminated
    }

    /// Store calls made so far
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Fetch the next page of keys, or `None` once the walk has ended.
    ///
    /// A page may be empty while the walk continues.
    pub async fn next_page<S>(&mut self, store: &S) -> StoreResult<Option<Vec<String>>>
    where
        S: KeyValueStore + ?Sized,
    {
        let cursor = match self.state {
            ScanState::Scanning(cursor) => cursor,
            ScanState::Terminated => return Ok(None),
        };

        let page = store.scan(cursor, &self.pattern, self.page_size).await?;
        self.pages += 1;

        self.state = if page.cursor == SCAN_COMPLETE {
            ScanState::Terminated
        } else {
            ScanState::Scanning(page.cursor)
        };

        tracing::debug!(
            "SCAN {} {} -> {} keys, next {:?}",
            cursor,
            self.pattern,
            page.keys.len(),
            self.state
        );

        Ok(Some(page.keys))
    }
}

/// Per-key predicate applied during a walk
#[async_trait::async_trait]
pub trait KeyFilter: Send + Sync {
    /// What a kept key turns into
    type Output: Send;

    /// Inspect one key; `None` drops it
    async fn apply(
        &self,
        store: &dyn KeyValueStore,
        key: &str,
    ) -> StoreResult<Option<Self::Output>>;
}

/// Walk to the end, keeping what the filter keeps, in visiting order
pub async fn scan_collect<F>(
    store: &dyn KeyValueStore,
    mut scan: KeyScan,
    filter: &F,
) -> StoreResult<Vec<F::Output>>
where
    F: KeyFilter + ?Sized,
{
    let mut kept = Vec::new();
    let mut visited = 0u64;

    while let Some(keys) = scan.next_page(store).await? {
        for key in keys {
            visited += 1;
            if let Some(item) = filter.apply(store, &key).await? {
                kept.push(item);
            }
        }
    }

    tracing::debug!(
        "Scanned '{}' in {} pages: {} keys visited, {} kept",
        scan.pattern(),
        scan.pages(),
        visited,
        kept.len()
    );

    Ok(kept)
}

/// Walk to the end and return every key
pub async fn scan_keys(store: &dyn KeyValueStore, scan: KeyScan) -> StoreResult<Vec<String>> {
    struct KeepAll;

    #[async_trait::async_trait]
    impl KeyFilter for KeepAll {
        type Output = String;

        async fn apply(&self, _: &dyn KeyValueStore, key: &str) -> StoreResult<Option<String>> {
            Ok(Some(key.to_string()))
        }
    }

    scan_collect(store, scan, &KeepAll).await
}
