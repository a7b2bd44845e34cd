//! Configuration types for rankstore
//!
//! Defines CLI arguments, store connection settings and session tuning.

use crate::error::ConfigError;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Records per batch flush
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Keys requested per SCAN call
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Upper bound for batch and page sizes
const MAX_CHUNK: usize = 100_000;

/// Default Redis URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Load user and leaderboard data into Redis and query it
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rankstore",
    version,
    about = "Load user and leaderboard data into Redis and query it",
    long_about = "Bulk-loads a users file and a scores file into Redis in batched\n\
                  transactions, then answers fixed queries by walking the keyspace\n\
                  with SCAN instead of fetching it whole.",
    after_help = "EXAMPLES:\n    \
        # Load both datasets\n    \
        rankstore load-users users.txt\n    \
        rankstore load-scores userscores.csv\n\n    \
        # Look up a user\n    \
        rankstore attributes 299\n\n    \
        # Erase, load and run every query\n    \
        rankstore demo users.txt userscores.csv"
)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Redis URL
    #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL, global = true)]
    pub redis: String,

    /// Connect timeout in seconds
    #[arg(long, default_value = "5", value_name = "SECS", global = true)]
    pub timeout: u64,

    /// Records committed per transaction
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_name = "NUM", global = true)]
    pub batch_size: usize,

    /// Keys requested per SCAN call
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_name = "NUM", global = true)]
    pub page_size: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Result rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load the users file (quoted key/value tokens, one user per line)
    LoadUsers {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Load the scores file (CSV with user:id, leaderboard, score columns)
    LoadScores {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print every attribute of a user
    Attributes {
        #[arg(value_name = "USER_ID")]
        user_id: String,
    },

    /// Print a user's longitude and latitude
    Coordinates {
        #[arg(value_name = "USER_ID")]
        user_id: String,
    },

    /// List users whose id starts with an even digit, with their last names
    EvenIds {
        /// SCAN cursor to start from
        #[arg(long, default_value_t = crate::query::EVEN_IDS_START_CURSOR, value_name = "CURSOR")]
        cursor: u64,
    },

    /// List women in China or Russia between latitudes 40 and 46
    Regional,

    /// Print the emails of a leaderboard's top players
    TopEmails {
        /// Leaderboard id
        #[arg(long, default_value = crate::query::DEFAULT_LEADERBOARD, value_name = "ID")]
        leaderboard: String,

        /// Number of ranks to read
        #[arg(long, default_value_t = crate::query::DEFAULT_TOP_N, value_name = "NUM")]
        limit: usize,
    },

    /// Delete the given keys
    Delete {
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
    },

    /// Erase the whole database
    Flush {
        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Erase, load both files, then run all five queries
    Demo {
        #[arg(value_name = "USERS_FILE")]
        users: PathBuf,

        #[arg(value_name = "SCORES_FILE")]
        scores: PathBuf,
    },
}

/// Connection settings for the Redis store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis connection URL
    pub url: String,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Reject URLs the Redis client cannot parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        redis::Client::open(self.url.as_str())
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidRedisUrl {
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }
}

/// Batching and scanning parameters of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Records per batch flush
    pub batch_size: usize,
    /// Keys requested per SCAN call
    pub page_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SessionConfig {
    /// Build a validated session config
    pub fn new(batch_size: usize, page_size: usize) -> Result<Self, ConfigError> {
        let config = Self {
            batch_size,
            page_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes of zero or above the chunk limit
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_CHUNK {
            return Err(ConfigError::InvalidBatchSize {
                size: self.batch_size,
                max: MAX_CHUNK,
            });
        }
        if self.page_size == 0 || self.page_size > MAX_CHUNK {
            return Err(ConfigError::InvalidPageSize {
                size: self.page_size,
                max: MAX_CHUNK,
            });
        }
        Ok(())
    }
}

impl CliArgs {
    /// Store settings from the global flags
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        let config = StoreConfig {
            url: self.redis.clone(),
            connect_timeout: Duration::from_secs(self.timeout),
        };
        config.validate()?;
        Ok(config)
    }

    /// Session settings from the global flags
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        SessionConfig::new(self.batch_size, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));

        let config = StoreConfig::with_url("redis://custom:6380");
        assert_eq!(config.url, "redis://custom:6380");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        let config = StoreConfig::with_url("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRedisUrl { .. })
        ));
    }

    #[test]
    fn test_session_config_bounds() {
        assert_eq!(SessionConfig::new(100, 100).unwrap(), SessionConfig::default());
        assert!(matches!(
            SessionConfig::new(0, 100),
            Err(ConfigError::InvalidBatchSize { size: 0, .. })
        ));
        assert!(matches!(
            SessionConfig::new(100, 0),
            Err(ConfigError::InvalidPageSize { size: 0, .. })
        ));
    }

    #[test]
    fn test_cli_parsing() {
        let args = CliArgs::parse_from(["rankstore", "--batch-size", "50", "attributes", "299"]);
        assert_eq!(args.batch_size, 50);
        assert!(matches!(args.command, Command::Attributes { ref user_id } if user_id == "299"));

        let args = CliArgs::parse_from(["rankstore", "even-ids"]);
        assert!(matches!(args.command, Command::EvenIds { cursor: 1280 }));

        let args = CliArgs::parse_from(["rankstore", "top-emails"]);
        match args.command {
            Command::TopEmails { leaderboard, limit } => {
                assert_eq!(leaderboard, "2");
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
