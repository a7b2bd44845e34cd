//! Store module: the session seam between rankstore and the key-value store
//!
//! Everything above this module talks to a [`KeyValueStore`]. Two
//! implementations are provided: [`RedisStore`] for a live server and
//! [`MemoryStore`], an in-process store with the same key, hash, sorted-set
//! and SCAN semantics.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::error::StoreResult;
use std::collections::HashMap;

/// Attribute name to value, as stored in one hash
pub type FieldMap = HashMap<String, String>;

/// Cursor value that ends an incremental scan
pub const SCAN_COMPLETE: u64 = 0;

/// A pending write, staged in a batch until the batch is committed
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// HSET key field value [field value ...]
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },

    /// ZADD key score member
    SortedSetAdd {
        key: String,
        member: String,
        score: f64,
    },
}

impl WriteOp {
    /// Key this operation writes to
    pub fn key(&self) -> &str {
        match self {
            WriteOp::HashSet { key, .. } | WriteOp::SortedSetAdd { key, .. } => key,
        }
    }
}

/// One page of an incremental scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next call; [`SCAN_COMPLETE`] when the walk is over
    pub cursor: u64,
    /// Keys returned by this call (may be empty even mid-scan)
    pub keys: Vec<String>,
}

/// Primitive operations rankstore needs from a key-value store
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Verify the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Apply all operations as one atomic unit, in order
    async fn commit(&self, batch: &[WriteOp]) -> StoreResult<()>;

    /// All fields of a hash; empty when the key does not exist
    async fn hash_get_all(&self, key: &str) -> StoreResult<FieldMap>;

    /// One field of a hash
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Several fields of a hash, positionally aligned with `fields`
    async fn hash_get_fields(&self, key: &str, fields: &[&str]) -> StoreResult<Vec<Option<String>>>;

    /// One incremental step over keys matching a glob pattern
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Highest-scored `n` members of a sorted set, best first
    async fn top_members(&self, key: &str, n: usize) -> StoreResult<Vec<(String, f64)>>;

    /// Delete keys; one flag per key telling whether it existed
    async fn delete(&self, keys: &[String]) -> StoreResult<Vec<bool>>;

    /// Erase every key in the database
    async fn flush_all(&self) -> StoreResult<()>;
}

// Re-export async_trait for implementors
pub use async_trait::async_trait;
