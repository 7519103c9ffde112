//! # Misinfo - post store with misinformation report reconciliation
//!
//! Misinfo provides:
//! - A SQLite-backed post store serialized behind a single write gate
//! - Concurrent bulk ingestion of historical CSV datasets
//! - A queue bridge that publishes new posts to an external classifier
//! - A reconciler that applies classification results back onto stored posts

pub mod post;
pub mod dataset;
pub mod storage;
pub mod import;
pub mod queue;
pub mod reconciler;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use post::{IdentifiedPost, MisinfoState, MisinformationReport, Post};
pub use dataset::{TnseEmbeddingRecord, TopicActivityRecord};
pub use storage::SqliteStore;
pub use import::{BulkImporter, ImportSummary};
pub use queue::{Broker, Delivery, DeliveryHandler, QueueBridge};
pub use reconciler::ReportReconciler;

/// Result type alias for Misinfo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Misinfo operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Write gate poisoned by a panicking holder")]
    GatePoisoned,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}
