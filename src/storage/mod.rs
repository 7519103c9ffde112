//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - misinfo_state(id, name)
//! - posts(id, message, username, date_submitted)
//! - misinfo_reports(post_id, misinfo_state_id, confidence, date_submitted)
//! - tnse_embeddings(record_id, label, pred_label, correct, tnse_x, tnse_y)
//! - topic_activities(record_id, date, contents, topic_id, topic_name)
//!
//! Every statement runs behind one write gate; see [`SqliteStore`].

pub mod diff;
pub mod schema;
pub mod sqlite;

pub use diff::PostDiff;
pub use sqlite::{DbStats, SqliteStore};
