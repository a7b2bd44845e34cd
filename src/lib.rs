//! rankstore - User and leaderboard data in Redis
//!
//! Loads two flat files into a Redis-compatible store and answers a fixed
//! set of queries over them.
//!
//! # Data layout
//!
//! - `user:<id>` is a hash of user attributes, loaded from a users file
//!   holding one user per line as double-quoted tokens:
//!   `"user:1" "first_name" "Ana" "last_name" "Li"`
//! - `leaderboard:<id>` is a sorted set of user ids scored by their result,
//!   loaded from a CSV file with `user:id`, `leaderboard` and `score` columns
//!
//! # Loading
//!
//! Both loads stream their input once and commit staged writes in atomic
//! batches (100 records by default). A malformed line is logged and skipped;
//! a rejected batch aborts the load and reports how many records had
//! already been committed.
//!
//! # Queries
//!
//! - attributes of a user
//! - coordinates of a user
//! - users whose id starts with an even digit, with their last names
//! - women in China or Russia between latitudes 40 and 46
//! - emails of the ten best players of leaderboard 2
//!
//! Keyspace walks go through SCAN one page at a time, never `KEYS`.
//!
//! # Example
//!
//! ```bash
//! rankstore load-users users.txt
//! rankstore load-scores userscores.csv
//! rankstore top-emails --leaderboard 2 --limit 10
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod scan;
pub mod session;
pub mod store;

pub use config::{CliArgs, OutputFormat, SessionConfig, StoreConfig};
pub use error::{RankError, Result};
pub use session::Session;
pub use store::{KeyValueStore, MemoryStore, RedisStore};
