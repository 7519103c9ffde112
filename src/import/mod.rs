//! Bulk Importer - concurrent ingestion of delimited-record streams
//!
//! One task is dispatched per record. Parsing happens on the task without
//! holding anything; the insert goes through the store and therefore waits on
//! its write gate. Per-record outcomes travel back over a channel and are
//! tallied into an [`ImportSummary`]. A bad record never aborts the batch and
//! nothing is rolled back: imports are best-effort, not atomic.

pub mod records;

use std::io::Read;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// Supplies one record (ordered field list) per call.
///
/// `Ok(None)` signals end of stream; `Err` is a read failure.
pub trait RecordSource {
    fn next_record(&mut self) -> Result<Option<Vec<String>>>;
}

impl<R: Read> RecordSource for csv::Reader<R> {
    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        let mut record = csv::StringRecord::new();
        if self.read_record(&mut record)? {
            Ok(Some(record.iter().map(str::to_string).collect()))
        } else {
            Ok(None)
        }
    }
}

impl RecordSource for std::vec::IntoIter<Vec<String>> {
    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.next())
    }
}

/// CSV reader configured for the datasets: no header handling, ragged rows allowed.
///
/// A header line is treated as a record and is rejected by the parsers.
pub fn csv_records<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

/// Outcome of one record, sent from a worker to the coordinator
#[derive(Debug)]
pub enum ImportMessage {
    Inserted { line: usize },
    /// Deliberately not imported (posts whose prediction was not correct)
    Filtered { line: usize },
    /// Failed to parse or validate
    Rejected { line: usize, reason: String },
    /// Parsed, but the store refused the insert
    Failed { line: usize, error: String },
}

/// What a per-record job did when it succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Filtered,
}

/// Aggregate tallies for one import call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub records: usize,
    pub inserted: usize,
    pub filtered: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Rows removed before a replace import
    pub replaced: usize,
}

impl ImportSummary {
    fn record(&mut self, message: &ImportMessage) {
        match message {
            ImportMessage::Inserted { .. } => self.inserted += 1,
            ImportMessage::Filtered { .. } => self.filtered += 1,
            ImportMessage::Rejected { .. } => self.rejected += 1,
            ImportMessage::Failed { .. } => self.failed += 1,
        }
    }
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records: {} inserted, {} filtered, {} rejected, {} failed",
            self.records, self.inserted, self.filtered, self.rejected, self.failed
        )
    }
}

/// Converts record streams into persisted rows.
#[derive(Clone)]
pub struct BulkImporter {
    store: SqliteStore,
}

impl BulkImporter {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Import posts from the classifier's prediction dataset.
    ///
    /// Only records flagged `correct == "True"` are imported; each carries its
    /// predicted label and probability as a report submitted at `imported_at`.
    pub async fn import_posts<S: RecordSource + Send + 'static>(
        &self,
        source: S,
        imported_at: DateTime<Utc>,
    ) -> Result<ImportSummary> {
        self.fan_out("posts", source, move |store, record| {
            match records::parse_post_record(&record, imported_at)? {
                Some(post) => {
                    store.insert_post(&post)?;
                    Ok(RecordOutcome::Inserted)
                }
                None => Ok(RecordOutcome::Filtered),
            }
        })
        .await
    }

    /// Replace every t-SNE embedding point with the stream's contents
    pub async fn import_tnse_embeddings<S: RecordSource + Send + 'static>(&self, source: S) -> Result<ImportSummary> {
        let replaced = self.on_store(|store| store.delete_all_tnse_embeddings()).await?;
        tracing::info!("import tnse_embeddings -> removed {} existing rows", replaced);

        let summary = self
            .fan_out("tnse_embeddings", source, |store, record| {
                let parsed = records::parse_tnse_record(&record)?;
                store.insert_tnse_embedding(&parsed)?;
                Ok(RecordOutcome::Inserted)
            })
            .await?;
        Ok(ImportSummary { replaced, ..summary })
    }

    /// Replace every topic activity row with the stream's contents
    pub async fn import_topic_activities<S: RecordSource + Send + 'static>(&self, source: S) -> Result<ImportSummary> {
        let replaced = self.on_store(|store| store.delete_all_topic_activities()).await?;
        tracing::info!("import topic_activities -> removed {} existing rows", replaced);

        let summary = self
            .fan_out("topic_activities", source, |store, record| {
                let parsed = records::parse_topic_activity_record(&record)?;
                store.insert_topic_activity(&parsed)?;
                Ok(RecordOutcome::Inserted)
            })
            .await?;
        Ok(ImportSummary { replaced, ..summary })
    }

    async fn on_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    /// Dispatch one task per record and wait for all of them.
    ///
    /// A stream read error stops dispatching; tasks already dispatched still
    /// run to completion before the error is returned.
    async fn fan_out<S, F>(&self, dataset: &'static str, mut source: S, job: F) -> Result<ImportSummary>
    where
        S: RecordSource + Send + 'static,
        F: Fn(&SqliteStore, Vec<String>) -> Result<RecordOutcome> + Send + Sync + 'static,
    {
        tracing::info!("import {} -> start", dataset);

        let job = Arc::new(job);
        let (tx, rx) = crossbeam::channel::unbounded::<ImportMessage>();
        let mut tasks = JoinSet::new();
        let mut summary = ImportSummary::default();

        // Reads block, so the source is drained on the blocking pool and
        // records are handed back here for dispatch
        let (records_tx, mut records_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<String>>();
        let reader = tokio::task::spawn_blocking(move || -> Result<()> {
            while let Some(record) = source.next_record()? {
                if records_tx.send(record).is_err() {
                    break;
                }
            }
            Ok(())
        });

        while let Some(record) = records_rx.recv().await {
            summary.records += 1;
            let line = summary.records;
            let job = Arc::clone(&job);
            let store = self.store.clone();
            let tx = tx.clone();

            tasks.spawn_blocking(move || {
                let message = run_record(dataset, line, || job(&store, record));
                // The receiver outlives every worker
                let _ = tx.send(message);
            });
        }
        let read_result = reader.await.map_err(Error::from).and_then(|read| read);
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("import {} -> worker died: {}", dataset, e);
                summary.failed += 1;
            }
        }

        for message in rx.iter() {
            summary.record(&message);
        }

        if let Err(e) = read_result {
            tracing::error!("import {} -> stream read failed after {} records: {}", dataset, summary.records, e);
            return Err(e);
        }

        tracing::info!("import {} -> done: {}", dataset, summary);
        Ok(summary)
    }
}

fn run_record(
    dataset: &str,
    line: usize,
    job: impl FnOnce() -> Result<RecordOutcome>,
) -> ImportMessage {
    match job() {
        Ok(RecordOutcome::Inserted) => ImportMessage::Inserted { line },
        Ok(RecordOutcome::Filtered) => {
            tracing::debug!("import {} -> skipping record {}: correct != \"True\"", dataset, line);
            ImportMessage::Filtered { line }
        }
        Err(Error::Validation(reason)) => {
            tracing::warn!("import {} -> skipping record {}: {}", dataset, line, reason);
            ImportMessage::Rejected { line, reason }
        }
        Err(e) => {
            tracing::error!("import {} -> error inserting record {}: {}", dataset, line, e);
            ImportMessage::Failed { line, error: e.to_string() }
        }
    }
}
