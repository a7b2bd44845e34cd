//! Redis-backed store session
//!
//! Holds one multiplexed async connection. Batches are committed as
//! MULTI/EXEC pipelines so each flush is all-or-nothing on the server.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{FieldMap, KeyValueStore, ScanPage, WriteOp};

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Redis store session
pub struct RedisStore {
    connection: Arc<RwLock<MultiplexedConnection>>,
    config: StoreConfig,
}

impl RedisStore {
    /// Connect and ping; any failure is a connection failure
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            StoreError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            }
        })?;

        let connection = tokio::time::timeout(
            config.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Timeout {
            url: config.url.clone(),
            after: config.connect_timeout,
        })?
        .map_err(|e| StoreError::ConnectionFailed {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let store = Self {
            connection: Arc::new(RwLock::new(connection)),
            config,
        };

        store.ping().await?;
        tracing::info!("Connected to Redis at {}", store.config.url);

        Ok(store)
    }

    /// URL this session is connected to
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn connection_error(&self, err: redis::RedisError) -> StoreError {
        StoreError::ConnectionFailed {
            url: self.config.url.clone(),
            reason: err.to_string(),
        }
    }

    fn store_error(&self, err: redis::RedisError) -> StoreError {
        StoreError::from(err).at_url(&self.config.url)
    }
}

/// ZREVRANGE stop index for the first `n` ranks (`n` > 0)
fn last_rank(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX) - 1
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection.write().await;

        let reply: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| self.connection_error(e))?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::ConnectionFailed {
                url: self.config.url.clone(),
                reason: format!("unexpected PING reply '{}'", reply),
            })
        }
    }

    async fn commit(&self, batch: &[WriteOp]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in batch {
            match op {
                WriteOp::HashSet { key, fields } => {
                    pipe.hset_multiple(key, fields.as_slice()).ignore();
                }
                WriteOp::SortedSetAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                }
            }
        }

        let mut conn = self.connection.write().await;
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<FieldMap> {
        let mut conn = self.connection.write().await;
        let fields: FieldMap = conn.hgetall(key).await.map_err(|e| self.store_error(e))?;
        Ok(fields)
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.write().await;
        let value: Option<String> = conn
            .hget(key, field)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(value)
    }

    async fn hash_get_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> StoreResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.write().await;

        // HMGET always replies with an array, even for a single field
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut *conn)
            .await
            .map_err(|e| self.store_error(e))?;

        Ok(values)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let mut conn = self.connection.write().await;

        let (cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut *conn)
            .await
            .map_err(|e| self.store_error(e))?;

        Ok(ScanPage { cursor, keys })
    }

    async fn top_members(&self, key: &str, n: usize) -> StoreResult<Vec<(String, f64)>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.write().await;
        let members: Vec<(String, f64)> = conn
            .zrevrange_withscores(key, 0, last_rank(n))
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(members)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.del(key);
        }

        let mut conn = self.connection.write().await;
        let removed: Vec<i64> = pipe
            .query_async(&mut *conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(removed.into_iter().map(|n| n > 0).collect())
    }

    async fn flush_all(&self) -> StoreResult<()> {
        let mut conn = self.connection.write().await;
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(())
    }
}
