//! Record parsers for the two input formats
//!
//! Both parsers are pure: they turn one line or one CSV row into a
//! canonical record, or explain why the input cannot become a write.

use crate::error::RecordError;
use crate::store::{FieldMap, WriteOp};

/// Key prefix of user hashes
pub const USER_KEY_PREFIX: &str = "user";

/// Key prefix of leaderboard sorted sets
pub const LEADERBOARD_KEY_PREFIX: &str = "leaderboard";

/// Header of the user id column in the scores file
pub const USER_ID_COLUMN: &str = "user:id";

/// Header of the leaderboard column in the scores file
pub const LEADERBOARD_COLUMN: &str = "leaderboard";

/// Header of the score column in the scores file
pub const SCORE_COLUMN: &str = "score";

/// Store key of a user hash
pub fn user_key(user_id: &str) -> String {
    format!("{}:{}", USER_KEY_PREFIX, user_id)
}

/// Store key of a leaderboard sorted set
pub fn leaderboard_key(leaderboard_id: &str) -> String {
    format!("{}:{}", LEADERBOARD_KEY_PREFIX, leaderboard_id)
}

/// Id part of an entity token: everything after the first colon, or the
/// whole token when it has none
pub fn entity_id(token: &str) -> &str {
    token.split_once(':').map_or(token, |(_, id)| id)
}

/// One parsed line of the users file
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Numeric user id, kept as text
    pub user_id: String,
    /// Every attribute on the line
    pub fields: FieldMap,
}

impl UserRecord {
    /// Parse `"user:<id>" "field" "value" ...`
    ///
    /// Tokens are separated by double quotes; blank fragments between them
    /// are discarded. A trailing field with no value is dropped, and when a
    /// field repeats the last value wins.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RecordError::Blank);
        }

        let mut tokens = line.split('"').map(str::trim).filter(|t| !t.is_empty());

        let key = tokens.next().ok_or(RecordError::Blank)?;
        let user_id = entity_id(key).to_string();

        let mut fields = FieldMap::new();
        while let (Some(field), Some(value)) = (tokens.next(), tokens.next()) {
            fields.insert(field.to_string(), value.to_string());
        }

        if fields.is_empty() {
            return Err(RecordError::NoFields {
                key: key.to_string(),
            });
        }

        Ok(Self { user_id, fields })
    }

    /// Store key of this user
    pub fn key(&self) -> String {
        user_key(&self.user_id)
    }

    /// The write that stores every field of this user at once
    pub fn into_write(self) -> WriteOp {
        let key = self.key();
        let mut fields: Vec<(String, String)> = self.fields.into_iter().collect();
        fields.sort();
        WriteOp::HashSet { key, fields }
    }
}

/// One parsed row of the scores file
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub user_id: String,
    pub leaderboard_id: String,
    pub score: f64,
}

impl ScoreRecord {
    /// Build a record from the three relevant cells of a row.
    ///
    /// A missing or empty score counts as 0. The row is rejected when the
    /// score does not parse or either id is empty.
    pub fn from_cells(
        user_cell: Option<&str>,
        leaderboard_cell: Option<&str>,
        score_cell: Option<&str>,
    ) -> Result<Self, RecordError> {
        let score = match score_cell.map(str::trim).filter(|s| !s.is_empty()) {
            None => 0.0,
            Some(text) => match text.parse::<f64>() {
                Ok(value) if !value.is_nan() => value,
                _ => {
                    return Err(RecordError::InvalidScore {
                        value: text.to_string(),
                    })
                }
            },
        };

        let user_id = entity_id(user_cell.unwrap_or("").trim());
        if user_id.is_empty() {
            return Err(RecordError::MissingId {
                column: USER_ID_COLUMN,
            });
        }

        let leaderboard_id = leaderboard_cell.unwrap_or("").trim();
        if leaderboard_id.is_empty() {
            return Err(RecordError::MissingId {
                column: LEADERBOARD_COLUMN,
            });
        }

        Ok(Self {
            user_id: user_id.to_string(),
            leaderboard_id: leaderboard_id.to_string(),
            score,
        })
    }

    /// Store key of the leaderboard this score belongs to
    pub fn key(&self) -> String {
        leaderboard_key(&self.leaderboard_id)
    }

    /// The write that places this user on the leaderboard
    pub fn into_write(self) -> WriteOp {
        WriteOp::SortedSetAdd {
            key: self.key(),
            member: self.user_id,
            score: self.score,
        }
    }
}
