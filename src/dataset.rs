//! Auxiliary datasets - bulk-loaded rows that are always replaced wholesale
//!
//! - `TnseEmbeddingRecord`: one point of the 2D t-SNE projection of the classifier's embeddings
//! - `TopicActivityRecord`: one dated text assigned to a topic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A t-SNE embedding point produced offline by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TnseEmbeddingRecord {
    #[serde(rename = "id")]
    pub record_id: i64,
    pub label: i64,
    pub pred_label: i64,
    pub correct: String,
    pub tnse_x: f64,
    pub tnse_y: f64,
}

/// A topic activity row. `record_id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicActivityRecord {
    #[serde(rename = "id")]
    pub record_id: i64,
    #[serde(rename = "date")]
    pub date_utc: DateTime<Utc>,
    #[serde(rename = "text")]
    pub contents: String,
    pub topic_id: i64,
    pub topic_name: String,
}
