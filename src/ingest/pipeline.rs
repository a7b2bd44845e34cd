//! Ingestion pipelines: parse, stage, flush
//!
//! Each pipeline reads its input in a single streaming pass. Parsed
//! records go straight into a [`BatchWriter`]; records the parser rejects
//! are logged and counted, never fatal. A failed flush aborts the run with
//! [`IngestError::CommitFailed`], which reports how far the load got.

use crate::error::{IngestError, IngestResult, RecordError};
use crate::ingest::batch::{BatchProgress, BatchWriter};
use crate::ingest::parser::{
    ScoreRecord, UserRecord, LEADERBOARD_COLUMN, SCORE_COLUMN, USER_ID_COLUMN,
};
use crate::store::{KeyValueStore, WriteOp};

use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Which dataset a load handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Users,
    Scores,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Users => "users",
            Dataset::Scores => "scores",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub dataset: Dataset,
    /// Records accepted by the parser and staged for writing
    pub staged: u64,
    /// Records in batches the store accepted
    pub committed: u64,
    /// Input lines or rows that were rejected
    pub skipped: u64,
    /// Batches committed
    pub batches: u64,
}

/// Snapshot handed to the progress callback after every flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub staged: u64,
    pub committed: u64,
    pub skipped: u64,
    pub batches: u64,
}

/// Drives the users and scores loads against one store
pub struct IngestPipeline<'a, S: KeyValueStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
}

struct Run<'a, 'p, S: KeyValueStore + ?Sized, F> {
    dataset: Dataset,
    writer: BatchWriter<'a, S>,
    skipped: u64,
    on_progress: &'p mut F,
}

impl<'a, 'p, S, F> Run<'a, 'p, S, F>
where
    S: KeyValueStore + ?Sized,
    F: FnMut(LoadProgress),
{
    fn snapshot(&self) -> LoadProgress {
        let BatchProgress {
            staged,
            committed,
            batches,
        } = self.writer.progress();
        LoadProgress {
            staged,
            committed,
            skipped: self.skipped,
            batches,
        }
    }

    fn abort(&self, source: crate::error::StoreError) -> IngestError {
        let progress = self.writer.progress();
        tracing::error!(
            "Aborting {} load after {} committed records: {}",
            self.dataset,
            progress.committed,
            source
        );
        IngestError::CommitFailed {
            dataset: self.dataset.as_str(),
            committed: progress.committed,
            staged: progress.staged,
            source,
        }
    }

    fn skip(&mut self, position: u64, err: &RecordError) {
        self.skipped += 1;
        match err {
            RecordError::Blank => {}
            _ => tracing::warn!("Skipping {} record {}: {}", self.dataset, position, err),
        }
    }

    async fn stage(&mut self, op: WriteOp) -> IngestResult<()> {
        match self.writer.stage(op).await {
            Ok(true) => {
                let snapshot = self.snapshot();
                (self.on_progress)(snapshot);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(self.abort(e)),
        }
    }

    async fn finish(mut self) -> IngestResult<LoadReport> {
        if let Err(e) = self.writer.flush().await {
            return Err(self.abort(e));
        }
        let snapshot = self.snapshot();
        (self.on_progress)(snapshot);

        let report = LoadReport {
            dataset: self.dataset,
            staged: snapshot.staged,
            committed: snapshot.committed,
            skipped: snapshot.skipped,
            batches: snapshot.batches,
        };
        tracing::info!(
            "Loaded {} {} ({} skipped, {} batches)",
            report.staged,
            report.dataset,
            report.skipped,
            report.batches
        );
        Ok(report)
    }
}

fn open(path: &Path) -> IngestResult<File> {
    File::open(path).map_err(|e| IngestError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl<'a, S: KeyValueStore + ?Sized> IngestPipeline<'a, S> {
    /// Create a pipeline committing every `batch_size` records
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    fn run<'p, F: FnMut(LoadProgress)>(
        &self,
        dataset: Dataset,
        on_progress: &'p mut F,
    ) -> Run<'a, 'p, S, F> {
        Run {
            dataset,
            writer: BatchWriter::new(self.store, self.batch_size),
            skipped: 0,
            on_progress,
        }
    }

    /// Load a users file
    pub async fn load_users_file<F>(&self, path: &Path, on_progress: F) -> IngestResult<LoadReport>
    where
        F: FnMut(LoadProgress) + Send,
    {
        tracing::info!("Loading users from {}", path.display());
        let file = open(path)?;
        self.load_users(BufReader::new(file), on_progress).await
    }

    /// Load users from any line source, one user per line
    pub async fn load_users<R, F>(&self, reader: R, mut on_progress: F) -> IngestResult<LoadReport>
    where
        R: BufRead + Send,
        F: FnMut(LoadProgress) + Send,
    {
        let mut run = self.run(Dataset::Users, &mut on_progress);

        for (index, line) in reader.lines().enumerate() {
            let position = index as u64 + 1;
            let line = match line {
                Ok(line) => line,
                // The bad line has been consumed, so reading can go on
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    run.skip(position, &RecordError::Unreadable(e.to_string()));
                    continue;
                }
                Err(e) => {
                    return Err(IngestError::Io {
                        path: "<users>".into(),
                        reason: format!("line {}: {}", position, e),
                    })
                }
            };

            match UserRecord::parse(&line) {
                Ok(record) => run.stage(record.into_write()).await?,
                Err(e) => run.skip(position, &e),
            }
        }

        run.finish().await
    }

    /// Load a scores CSV file
    pub async fn load_scores_file<F>(&self, path: &Path, on_progress: F) -> IngestResult<LoadReport>
    where
        F: FnMut(LoadProgress) + Send,
    {
        tracing::info!("Loading scores from {}", path.display());
        let file = open(path)?;
        self.load_scores(file, on_progress).await
    }

    /// Load scores from CSV text with a header row naming the columns
    pub async fn load_scores<R, F>(&self, reader: R, mut on_progress: F) -> IngestResult<LoadReport>
    where
        R: Read + Send,
        F: FnMut(LoadProgress) + Send,
    {
        let mut rows = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rows
            .headers()
            .map_err(|e| IngestError::Csv(e.to_string()))?
            .clone();
        let column = |name: &'static str| headers.iter().position(|h| h == name);

        let user_col = column(USER_ID_COLUMN).ok_or(IngestError::MissingColumn(USER_ID_COLUMN))?;
        let board_col =
            column(LEADERBOARD_COLUMN).ok_or(IngestError::MissingColumn(LEADERBOARD_COLUMN))?;
        // A missing score column means every score is 0
        let score_col = column(SCORE_COLUMN);

        let mut run = self.run(Dataset::Scores, &mut on_progress);
        let mut row = csv::StringRecord::new();
        let mut position = 1u64;

        loop {
            position += 1;
            match rows.read_record(&mut row) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_io_error() => {
                    return Err(IngestError::Io {
                        path: "<scores>".into(),
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    run.skip(position, &RecordError::Unreadable(e.to_string()));
                    continue;
                }
            }

            let parsed = ScoreRecord::from_cells(
                row.get(user_col),
                row.get(board_col),
                score_col.and_then(|i| row.get(i)),
            );

            match parsed {
                Ok(record) => run.stage(record.into_write()).await?,
                Err(e) => run.skip(position, &e),
            }
        }

        run.finish().await
    }
}
