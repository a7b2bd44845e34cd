//! The five queries over loaded data
//!
//! | Query | Access path |
//! |---|---|
//! | user attributes | one HGETALL |
//! | user coordinates | one HMGET |
//! | even-digit ids | partial SCAN from cursor 1280, HGET per kept key |
//! | women in China/Russia at latitude 40..=46 | full SCAN, HGETALL per key |
//! | top-10 emails of leaderboard 2 | ZREVRANGE, HGET per rank |
//!
//! Absence is a result, not an error: lookups return `None`, walks return
//! empty collections.

mod filters;
mod lookup;

pub use filters::{
    even_id_users, starts_with_even_digit, users_in_region, EvenIdFilter, EvenIdUsers,
    RegionFilter, UserProfile, USER_PATTERN,
};
pub use lookup::{top_emails, user_attributes, user_coordinates, Coordinates, RankedEmail};

/// Cursor the even-digit query starts from.
///
/// Starting here walks only part of the keyspace; which part depends on
/// the server's cursor encoding.
pub const EVEN_IDS_START_CURSOR: u64 = 1280;

/// Leaderboard read by the top-emails query
pub const DEFAULT_LEADERBOARD: &str = "2";

/// Ranks read by the top-emails query
pub const DEFAULT_TOP_N: usize = 10;
