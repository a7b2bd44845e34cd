//! Session: one store handle plus the operations offered to callers
//!
//! A session owns its store for its whole lifetime. Nothing is global, so
//! tests build a session over [`MemoryStore`](crate::store::MemoryStore)
//! and the binary builds one over [`RedisStore`].

use crate::config::{CliArgs, SessionConfig, StoreConfig};
use crate::error::{IngestResult, Result, StoreResult};
use crate::ingest::{IngestPipeline, LoadProgress, LoadReport};
use crate::query::{
    self, Coordinates, EvenIdUsers, RankedEmail, RegionFilter, UserProfile, DEFAULT_LEADERBOARD,
    DEFAULT_TOP_N, EVEN_IDS_START_CURSOR, USER_PATTERN,
};
use crate::scan::KeyScan;
use crate::store::{FieldMap, KeyValueStore, RedisStore};

use std::io::{BufRead, Read};
use std::path::Path;

/// A store handle and the settings used against it
pub struct Session<S: KeyValueStore> {
    store: S,
    config: SessionConfig,
}

impl Session<RedisStore> {
    /// Validate both configs, connect to Redis and verify it answers
    pub async fn connect(store: StoreConfig, config: SessionConfig) -> Result<Self> {
        store.validate()?;
        config.validate()?;
        let store = RedisStore::connect(store).await?;
        Ok(Self::new(store, config))
    }

    /// Connect using the global command-line flags
    pub async fn open(args: &CliArgs) -> Result<Self> {
        Self::connect(args.store_config()?, args.session_config()?).await
    }
}

impl<S: KeyValueStore> Session<S> {
    /// Wrap an already connected store
    pub fn new(store: S, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Check the store is still reachable
    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await
    }

    fn pipeline(&self) -> IngestPipeline<'_, S> {
        IngestPipeline::new(&self.store, self.config.batch_size)
    }

    /// Bulk-load a users file; returns the number of users staged
    pub async fn load_users(&self, path: &Path) -> IngestResult<u64> {
        Ok(self.pipeline().load_users_file(path, |_| {}).await?.staged)
    }

    /// Bulk-load a scores file; returns the number of scores staged
    pub async fn load_scores(&self, path: &Path) -> IngestResult<u64> {
        Ok(self.pipeline().load_scores_file(path, |_| {}).await?.staged)
    }

    /// Load a users file, reporting progress after every flush
    pub async fn load_users_with_progress<F>(
        &self,
        path: &Path,
        on_progress: F,
    ) -> IngestResult<LoadReport>
    where
        F: FnMut(LoadProgress) + Send,
    {
        self.pipeline().load_users_file(path, on_progress).await
    }

    /// Load a scores file, reporting progress after every flush
    pub async fn load_scores_with_progress<F>(
        &self,
        path: &Path,
        on_progress: F,
    ) -> IngestResult<LoadReport>
    where
        F: FnMut(LoadProgress) + Send,
    {
        self.pipeline().load_scores_file(path, on_progress).await
    }

    /// Load users from an in-memory or streamed source
    pub async fn load_users_from<R: BufRead + Send>(&self, reader: R) -> IngestResult<LoadReport> {
        self.pipeline().load_users(reader, |_| {}).await
    }

    /// Load scores from an in-memory or streamed source
    pub async fn load_scores_from<R: Read + Send>(&self, reader: R) -> IngestResult<LoadReport> {
        self.pipeline().load_scores(reader, |_| {}).await
    }

    /// Delete keys; one flag per key telling whether it existed
    pub async fn delete_keys(&self, keys: &[String]) -> StoreResult<Vec<bool>> {
        let removed = self.store.delete(keys).await?;
        tracing::info!(
            "Deleted {} of {} keys",
            removed.iter().filter(|r| **r).count(),
            keys.len()
        );
        Ok(removed)
    }

    /// Erase the whole database. Irreversible.
    pub async fn delete_all(&self) -> StoreResult<()> {
        self.store.flush_all().await?;
        tracing::warn!("All data erased from the store");
        Ok(())
    }

    /// Query 1: every attribute of a user
    pub async fn user_attributes(&self, user_id: &str) -> StoreResult<Option<FieldMap>> {
        query::user_attributes(&self.store, user_id).await
    }

    /// Query 2: a user's longitude and latitude
    pub async fn user_coordinates(&self, user_id: &str) -> StoreResult<Option<Coordinates>> {
        query::user_coordinates(&self.store, user_id).await
    }

    /// Query 3: users whose id starts with an even digit, probing the
    /// keyspace from cursor 1280
    pub async fn even_prefixed_users(&self) -> StoreResult<EvenIdUsers> {
        self.even_prefixed_users_from(EVEN_IDS_START_CURSOR).await
    }

    /// Query 3 from an explicit start cursor
    pub async fn even_prefixed_users_from(&self, cursor: u64) -> StoreResult<EvenIdUsers> {
        let scan = KeyScan::starting_at(USER_PATTERN, cursor).with_page_size(self.config.page_size);
        query::even_id_users(&self.store, scan).await
    }

    /// Query 4: women in China or Russia between latitudes 40 and 46
    pub async fn regional_female_users(&self) -> StoreResult<Vec<UserProfile>> {
        self.users_matching(&RegionFilter::default()).await
    }

    /// Query 4 with a custom filter
    pub async fn users_matching(&self, filter: &RegionFilter) -> StoreResult<Vec<UserProfile>> {
        query::users_in_region(&self.store, filter, self.config.page_size).await
    }

    /// Query 5: emails of the top 10 players of leaderboard 2
    pub async fn top_player_emails(&self) -> StoreResult<Vec<RankedEmail>> {
        self.top_emails(DEFAULT_LEADERBOARD, DEFAULT_TOP_N).await
    }

    /// Query 5 for any leaderboard and rank count
    pub async fn top_emails(
        &self,
        leaderboard_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RankedEmail>> {
        query::top_emails(&self.store, leaderboard_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, RankError};
    use crate::store::MemoryStore;
    use clap::Parser;
    use std::io::Cursor;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_validates_before_dialing() {
        let bad_batch = SessionConfig {
            batch_size: 0,
            page_size: 100,
        };
        let err = Session::connect(StoreConfig::default(), bad_batch)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RankError::Config(ConfigError::InvalidBatchSize { size: 0, .. })
        ));

        let err = Session::connect(StoreConfig::with_url("not a url"), SessionConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RankError::Config(ConfigError::InvalidRedisUrl { .. })));
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_store_error() {
        let store = StoreConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_secs(2),
        };
        match Session::connect(store, SessionConfig::default()).await {
            Err(RankError::Store(e)) => assert!(e.is_connection_failure()),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[tokio::test]
    async fn test_open_rejects_bad_flags() {
        let args = CliArgs::parse_from(["rankstore", "--page-size", "0", "regional"]);
        let err = Session::open(&args).await.err().unwrap();
        assert!(matches!(
            err,
            RankError::Config(ConfigError::InvalidPageSize { size: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_session_over_memory_store() {
        let session = Session::new(MemoryStore::new(), SessionConfig::default());
        session.ping().await.unwrap();

        let report = session
            .load_users_from(Cursor::new("\"user:1\" \"email\" \"a@x.io\"\n"))
            .await
            .unwrap();
        assert_eq!(report.staged, 1);

        let report = session
            .load_scores_from(Cursor::new("user:id,leaderboard,score\nuser:1,2,5\n"))
            .await
            .unwrap();
        assert_eq!(report.staged, 1);

        let top = session.top_player_emails().await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].email, "a@x.io");

        let removed = session
            .delete_keys(&["user:1".to_string(), "user:99".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec![true, false]);
        assert!(session.top_player_emails().await.unwrap().is_empty());
    }
}
