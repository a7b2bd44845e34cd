//! Ingestion: turning the users and scores files into batched writes
//!
//! - `parser`: pure line/row parsers producing canonical records
//! - `batch`: bounded-group commit of staged writes
//! - `pipeline`: the streaming users and scores loads

mod batch;
mod parser;
mod pipeline;

pub use batch::{BatchProgress, BatchWriter};
pub use parser::{
    entity_id, leaderboard_key, user_key, ScoreRecord, UserRecord, LEADERBOARD_COLUMN,
    LEADERBOARD_KEY_PREFIX, SCORE_COLUMN, USER_ID_COLUMN, USER_KEY_PREFIX,
};
pub use pipeline::{Dataset, IngestPipeline, LoadProgress, LoadReport};
