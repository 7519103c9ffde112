//! Database schema definitions

use crate::post::MisinfoState;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// SQL to create the misinfo_state lookup table
pub const CREATE_MISINFO_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS misinfo_state (
    id INTEGER PRIMARY KEY,
    name VARCHAR(64) NOT NULL
)
"#;

/// SQL to create the posts table
pub const CREATE_POSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id VARCHAR(36) PRIMARY KEY,
    message TEXT NOT NULL,
    username TEXT NOT NULL,
    date_submitted TEXT NOT NULL
)
"#;

/// SQL to create the misinfo_reports table
/// At most one report per post; a report row is always complete
pub const CREATE_MISINFO_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS misinfo_reports (
    post_id VARCHAR(36) PRIMARY KEY REFERENCES posts(id) ON DELETE CASCADE,
    misinfo_state_id INTEGER NOT NULL REFERENCES misinfo_state(id),
    confidence REAL NOT NULL,
    date_submitted TEXT NOT NULL
)
"#;

/// SQL to create the tnse_embeddings table
pub const CREATE_TNSE_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tnse_embeddings (
    record_id INTEGER NOT NULL,
    label INTEGER NOT NULL,
    pred_label INTEGER NOT NULL,
    correct TEXT NOT NULL,
    tnse_x REAL NOT NULL,
    tnse_y REAL NOT NULL
)
"#;

/// SQL to create the topic_activities table
pub const CREATE_TOPIC_ACTIVITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS topic_activities (
    record_id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    contents TEXT NOT NULL,
    topic_id INTEGER NOT NULL,
    topic_name TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_posts_date_submitted ON posts(date_submitted)",
    "CREATE INDEX IF NOT EXISTS idx_topic_activities_topic ON topic_activities(topic_id)",
];

/// Seeds the lookup table; re-running it is a no-op
pub const SEED_MISINFO_STATE: &str =
    "INSERT OR IGNORE INTO misinfo_state (id, name) VALUES (?1, ?2)";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_MISINFO_STATE_TABLE,
        CREATE_POSTS_TABLE,
        CREATE_MISINFO_REPORTS_TABLE,
        CREATE_TNSE_EMBEDDINGS_TABLE,
        CREATE_TOPIC_ACTIVITIES_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Rows the misinfo_state table must contain
pub fn misinfo_state_seed() -> impl Iterator<Item = (i64, &'static str)> {
    MisinfoState::all().iter().map(|s| (s.id(), s.as_str()))
}

/// Format a timestamp the way every date column stores it.
///
/// Fixed-width microsecond RFC 3339 in UTC, so text order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop the sub-microsecond part that the stored form cannot hold
pub fn stored_precision(ts: &DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Parse a stored date column
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{}: {}", raw, e)))
}
