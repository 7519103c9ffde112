//! SQLite storage implementation

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;
use crate::{Result, Error};
use crate::dataset::{TnseEmbeddingRecord, TopicActivityRecord};
use crate::post::{IdentifiedPost, MisinfoState, MisinformationReport, Post};
use super::diff::PostDiff;
use super::schema::{self, format_timestamp};

const SELECT_POST: &str = r#"
    SELECT p.id, p.message, p.username, p.date_submitted,
           r.misinfo_state_id, r.confidence, r.date_submitted
    FROM posts p
    LEFT JOIN misinfo_reports r ON r.post_id = p.id
"#;

/// Inserts or replaces the report of a post that still exists.
const UPSERT_REPORT: &str = r#"
    INSERT INTO misinfo_reports (post_id, misinfo_state_id, confidence, date_submitted)
    SELECT ?1, ?2, ?3, ?4 WHERE EXISTS (SELECT 1 FROM posts WHERE id = ?1)
    ON CONFLICT(post_id) DO UPDATE SET
        misinfo_state_id = excluded.misinfo_state_id,
        confidence = excluded.confidence,
        date_submitted = excluded.date_submitted
"#;

/// Single-writer discipline over the one connection.
///
/// Every read and write enters the gate for its whole prepare/execute/scan
/// sequence, so no two store operations ever interleave at statement level.
struct WriteGate {
    conn: Mutex<Connection>,
}

impl WriteGate {
    fn enter(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::GatePoisoned)
    }
}

/// SQLite-backed storage for posts, reports and auxiliary datasets.
///
/// Cheap to clone; clones share the same connection and write gate.
#[derive(Clone)]
pub struct SqliteStore {
    gate: Arc<WriteGate>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            gate: Arc::new(WriteGate {
                conn: Mutex::new(conn),
            }),
        })
    }

    /// Initialize the database schema and seed the state lookup table
    fn initialize_schema(conn: &Connection) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        let mut seed = conn.prepare(schema::SEED_MISINFO_STATE)?;
        for (id, name) in schema::misinfo_state_seed() {
            if seed.execute(params![id, name])? == 0 {
                tracing::debug!("misinfo state {} ({}) already exists, skipping", id, name);
            }
        }
        Ok(())
    }

    // ========== Post Operations ==========

    /// Count all posts
    pub fn count_posts(&self) -> Result<u64> {
        let conn = self.gate.enter()?;
        count_rows(&conn, "posts")
    }

    /// Get one page of posts ordered by submission date.
    ///
    /// `page_number` is 1-indexed. A page past the end is empty, not an error.
    pub fn get_posts(&self, page_number: u64, page_size: u64) -> Result<Vec<IdentifiedPost>> {
        if page_number == 0 {
            return Err(Error::Validation("page number cannot be below 1".to_string()));
        }
        let offset = (page_number - 1)
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
            .ok_or_else(|| Error::Validation("page offset out of range".to_string()))?;
        let limit = i64::try_from(page_size)
            .map_err(|_| Error::Validation("page size out of range".to_string()))?;

        let conn = self.gate.enter()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY p.date_submitted, p.rowid LIMIT ?1 OFFSET ?2",
            SELECT_POST
        ))?;

        let posts = stmt
            .query_map(params![limit, offset], row_to_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(posts)
    }

    /// Find a post by id, with its report joined in. `None` when no row matches.
    pub fn find_post(&self, id: &Uuid) -> Result<Option<IdentifiedPost>> {
        let conn = self.gate.enter()?;
        conn.query_row(
            &format!("{} WHERE p.id = ?1", SELECT_POST),
            [id.to_string()],
            row_to_post,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Persist a post under a freshly generated id.
    ///
    /// The post row and its report (if any) are written in one transaction.
    /// Timestamps in the returned post are cut to stored precision, so it
    /// compares equal to what [`SqliteStore::find_post`] reads back.
    pub fn insert_post(&self, post: &Post) -> Result<IdentifiedPost> {
        let mut post = post.clone();
        post.submitted_date = schema::stored_precision(&post.submitted_date);
        if let Some(ref mut report) = post.misinfo_report {
            report.submitted_date = schema::stored_precision(&report.submitted_date);
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let mut conn = self.gate.enter()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (id, message, username, date_submitted) VALUES (?1, ?2, ?3, ?4)",
            params![
                id_str,
                post.message,
                post.username,
                format_timestamp(&post.submitted_date),
            ],
        )?;
        if let Some(ref report) = post.misinfo_report {
            upsert_report(&tx, &id_str, report)?;
        }
        tx.commit()?;

        Ok(post.with_id(id))
    }

    /// Update `old` so it matches `updated`, writing only the fields that differ.
    ///
    /// Keyed on `old.id`. Returns the number of rows affected across the posts
    /// and misinfo_reports tables; an empty diff issues no statement and
    /// returns 0.
    pub fn update_post(&self, old: &IdentifiedPost, updated: &Post) -> Result<usize> {
        let diff = PostDiff::between(&old.post, updated);
        if diff.is_empty() {
            tracing::debug!("update of post {} has no changed fields, skipping", old.id);
            return Ok(0);
        }
        let id = old.id.to_string();

        let mut conn = self.gate.enter()?;
        let tx = conn.transaction()?;
        let mut affected = 0;

        if let Some(sql) = diff.update_posts_sql() {
            let mut values: Vec<&str> = diff
                .post_assignments()
                .into_iter()
                .map(|(_, value)| value)
                .collect();
            values.push(id.as_str());
            affected += tx.execute(&sql, params_from_iter(values))?;
        }

        match diff.report {
            Some(Some(ref report)) => affected += upsert_report(&tx, &id, report)?,
            Some(None) => {
                affected += tx.execute("DELETE FROM misinfo_reports WHERE post_id = ?1", [&id])?
            }
            None => {}
        }

        tx.commit()?;
        Ok(affected)
    }

    // ========== t-SNE Embedding Operations ==========

    /// Delete every t-SNE embedding point
    pub fn delete_all_tnse_embeddings(&self) -> Result<usize> {
        let conn = self.gate.enter()?;
        Ok(conn.execute("DELETE FROM tnse_embeddings", [])?)
    }

    /// Insert a t-SNE embedding point
    pub fn insert_tnse_embedding(&self, record: &TnseEmbeddingRecord) -> Result<()> {
        let conn = self.gate.enter()?;
        conn.execute(
            r#"
            INSERT INTO tnse_embeddings (record_id, label, pred_label, correct, tnse_x, tnse_y)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.record_id,
                record.label,
                record.pred_label,
                record.correct,
                record.tnse_x,
                record.tnse_y,
            ],
        )?;
        Ok(())
    }

    /// Get all t-SNE embedding points
    pub fn get_all_tnse_embeddings(&self) -> Result<Vec<TnseEmbeddingRecord>> {
        let conn = self.gate.enter()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, label, pred_label, correct, tnse_x, tnse_y FROM tnse_embeddings ORDER BY rowid"
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(TnseEmbeddingRecord {
                    record_id: row.get(0)?,
                    label: row.get(1)?,
                    pred_label: row.get(2)?,
                    correct: row.get(3)?,
                    tnse_x: row.get(4)?,
                    tnse_y: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    // ========== Topic Activity Operations ==========

    /// Delete every topic activity row
    pub fn delete_all_topic_activities(&self) -> Result<usize> {
        let conn = self.gate.enter()?;
        Ok(conn.execute("DELETE FROM topic_activities", [])?)
    }

    /// Insert a topic activity row, returning the record id the store assigned.
    /// `record.record_id` is ignored.
    pub fn insert_topic_activity(&self, record: &TopicActivityRecord) -> Result<i64> {
        let conn = self.gate.enter()?;
        conn.execute(
            "INSERT INTO topic_activities (date, contents, topic_id, topic_name) VALUES (?1, ?2, ?3, ?4)",
            params![
                format_timestamp(&record.date_utc),
                record.contents,
                record.topic_id,
                record.topic_name,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get all topic activity rows
    pub fn get_all_topic_activities(&self) -> Result<Vec<TopicActivityRecord>> {
        let conn = self.gate.enter()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, date, contents, topic_id, topic_name FROM topic_activities ORDER BY record_id"
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(TopicActivityRecord {
                    record_id: row.get(0)?,
                    date_utc: column_timestamp(row, 1)?,
                    contents: row.get(2)?,
                    topic_id: row.get(3)?,
                    topic_name: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.gate.enter()?;
        Ok(DbStats {
            posts: count_rows(&conn, "posts")?,
            reports: count_rows(&conn, "misinfo_reports")?,
            tnse_embeddings: count_rows(&conn, "tnse_embeddings")?,
            topic_activities: count_rows(&conn, "topic_activities")?,
        })
    }
}

fn count_rows(conn: &Connection, table: &'static str) -> Result<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count as u64)
}

fn upsert_report(conn: &Connection, post_id: &str, report: &MisinformationReport) -> Result<usize> {
    Ok(conn.execute(
        UPSERT_REPORT,
        params![
            post_id,
            report.state.id(),
            report.confidence as f64,
            format_timestamp(&report.submitted_date),
        ],
    )?)
}

fn conversion_failure(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn column_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    schema::parse_timestamp(&raw).map_err(|e| conversion_failure(idx, e))
}

/// Helper to convert a `SELECT_POST` row to an IdentifiedPost
fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<IdentifiedPost> {
    let id_str: String = row.get(0)?;
    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_failure(0, e))?;

    let misinfo_report = match row.get::<_, Option<i64>>(4)? {
        Some(state_id) => {
            let state = MisinfoState::try_from(state_id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Integer, Box::new(e))
            })?;
            let confidence: f64 = row.get(5)?;
            Some(MisinformationReport {
                state,
                confidence: confidence as f32,
                submitted_date: column_timestamp(row, 6)?,
            })
        }
        None => None,
    };

    Ok(IdentifiedPost {
        id,
        post: Post {
            message: row.get(1)?,
            username: row.get(2)?,
            submitted_date: column_timestamp(row, 3)?,
            misinfo_report,
        },
    })
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub posts: u64,
    pub reports: u64,
    pub tnse_embeddings: u64,
    pub topic_activities: u64,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Posts: {}", self.posts)?;
        writeln!(f, "  Reports: {}", self.reports)?;
        writeln!(f, "  t-SNE points: {}", self.tnse_embeddings)?;
        writeln!(f, "  Topic activities: {}", self.topic_activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn sample_post(message: &str, day: u32) -> Post {
        Post::new(message, "alice", at(day, 12))
    }

    #[test]
    fn test_insert_then_find_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();

        let post = sample_post("hello world", 1);
        let inserted = store.insert_post(&post).unwrap();
        assert_ne!(inserted.id, Uuid::nil());

        let found = store.find_post(&inserted.id).unwrap().unwrap();
        assert_eq!(found.id, inserted.id);
        assert_eq!(found.post, post);
        assert!(found.report().is_none());
    }

    #[test]
    fn test_roundtrip_with_sub_microsecond_timestamps() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now() + Duration::nanoseconds(829);

        let post = Post::new("m", "u", now).with_report(MisinfoState::Fake, 0.9, now);
        let inserted = store.insert_post(&post).unwrap();
        let found = store.find_post(&inserted.id).unwrap().unwrap();

        assert_eq!(found, inserted);
        assert_eq!(found.post.message, post.message);
        assert_eq!(found.post.submitted_date, schema::stored_precision(&now));
        assert!(now - found.post.submitted_date < Duration::microseconds(1));

        // re-applying the original post is not a change
        assert_eq!(store.update_post(&inserted, &post).unwrap(), 0);
    }

    #[test]
    fn test_find_missing_post_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_post(&sample_post("present", 1)).unwrap();

        assert!(store.find_post(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_insert_with_report_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();

        let post = sample_post("imported", 2).with_report(MisinfoState::True, 0.75, at(20, 8));
        let inserted = store.insert_post(&post).unwrap();

        let found = store.find_post(&inserted.id).unwrap().unwrap();
        let report = found.report().unwrap();
        assert_eq!(report.state, MisinfoState::True);
        assert_eq!(report.confidence, 0.75);
        assert_eq!(report.submitted_date, at(20, 8));
        assert_eq!(store.stats().unwrap().reports, 1);
    }

    #[test]
    fn test_pagination() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..15 {
            store.insert_post(&sample_post(&format!("post {}", i), i + 1)).unwrap();
        }
        assert_eq!(store.count_posts().unwrap(), 15);

        assert_eq!(store.get_posts(1, 10).unwrap().len(), 10);
        assert_eq!(store.get_posts(2, 10).unwrap().len(), 5);
        assert!(store.get_posts(3, 10).unwrap().is_empty());
    }

    #[test]
    fn test_pages_are_ordered_by_submission_date() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_post(&sample_post("third", 3)).unwrap();
        store.insert_post(&sample_post("first", 1)).unwrap();
        store.insert_post(&sample_post("second", 2)).unwrap();

        let messages: Vec<String> = store
            .get_posts(1, 10)
            .unwrap()
            .into_iter()
            .map(|p| p.post.message)
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_page_zero_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.get_posts(0, 10), Err(Error::Validation(_))));
    }

    #[test]
    fn test_update_message_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = sample_post("before", 4).with_report(MisinfoState::Fake, 0.6, at(5, 0));
        let stored = store.insert_post(&post).unwrap();

        let mut updated = stored.post.clone();
        updated.message = "after".to_string();
        assert_eq!(store.update_post(&stored, &updated).unwrap(), 1);

        let found = store.find_post(&stored.id).unwrap().unwrap();
        assert_eq!(found.post.message, "after");
        assert_eq!(found.post.username, post.username);
        assert_eq!(found.post.submitted_date, post.submitted_date);
        assert_eq!(found.post.misinfo_report, post.misinfo_report);
    }

    #[test]
    fn test_update_attaches_and_replaces_report() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stored = store.insert_post(&sample_post("classify me", 6)).unwrap();

        let updated = stored.post.clone().with_report(MisinfoState::Fake, 0.9, at(7, 1));
        assert_eq!(store.update_post(&stored, &updated).unwrap(), 1);

        let found = store.find_post(&stored.id).unwrap().unwrap();
        assert_eq!(found.report().unwrap().state, MisinfoState::Fake);

        let replaced = found.post.clone().with_report(MisinfoState::True, 0.3, at(8, 1));
        assert_eq!(store.update_post(&found, &replaced).unwrap(), 1);

        let found = store.find_post(&stored.id).unwrap().unwrap();
        let report = found.report().unwrap();
        assert_eq!(report.state, MisinfoState::True);
        assert_eq!(report.confidence, 0.3);
        assert_eq!(store.stats().unwrap().reports, 1);
    }

    #[test]
    fn test_update_can_remove_report() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = sample_post("reported", 9).with_report(MisinfoState::Fake, 0.5, at(9, 2));
        let stored = store.insert_post(&post).unwrap();

        let mut updated = stored.post.clone();
        updated.misinfo_report = None;
        assert_eq!(store.update_post(&stored, &updated).unwrap(), 1);
        assert!(store.find_post(&stored.id).unwrap().unwrap().report().is_none());
    }

    #[test]
    fn test_update_with_empty_diff_is_noop() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stored = store.insert_post(&sample_post("unchanged", 10)).unwrap();

        assert_eq!(store.update_post(&stored, &stored.post).unwrap(), 0);
    }

    #[test]
    fn test_update_of_missing_post_affects_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ghost = sample_post("ghost", 11).with_id(Uuid::new_v4());

        let mut updated = ghost.post.clone().with_report(MisinfoState::Fake, 0.9, at(11, 3));
        updated.username = "bob".to_string();

        assert_eq!(store.update_post(&ghost, &updated).unwrap(), 0);
        let stats = store.stats().unwrap();
        assert_eq!(stats.posts, 0);
        assert_eq!(stats.reports, 0);
    }

    #[test]
    fn test_tnse_embedding_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = TnseEmbeddingRecord {
            record_id: 7,
            label: 1,
            pred_label: 0,
            correct: "False".to_string(),
            tnse_x: -3.5,
            tnse_y: 12.25,
        };
        store.insert_tnse_embedding(&record).unwrap();

        assert_eq!(store.get_all_tnse_embeddings().unwrap(), vec![record]);
        assert_eq!(store.delete_all_tnse_embeddings().unwrap(), 1);
        assert!(store.get_all_tnse_embeddings().unwrap().is_empty());
    }

    #[test]
    fn test_topic_activity_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = TopicActivityRecord {
            record_id: 0,
            date_utc: at(12, 0),
            contents: "rates are rising".to_string(),
            topic_id: 4,
            topic_name: "economy".to_string(),
        };
        let id = store.insert_topic_activity(&record).unwrap();

        let all = store.get_all_topic_activities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record_id, id);
        assert_eq!(all[0].date_utc, record.date_utc);
        assert_eq!(all[0].topic_name, "economy");

        assert_eq!(store.delete_all_topic_activities().unwrap(), 1);
        assert_eq!(store.stats().unwrap().topic_activities, 0);
    }

    #[test]
    fn test_file_database_persists_and_seeds_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misinfo.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_post(&sample_post("durable", 13)).unwrap().id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find_post(&id).unwrap().is_some());

        let conn = store.gate.enter().unwrap();
        let states: i64 = conn
            .query_row("SELECT COUNT(*) FROM misinfo_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(states, MisinfoState::all().len() as i64);
    }

    #[test]
    fn test_concurrent_inserts_are_serialized() {
        let store = SqliteStore::open_in_memory().unwrap();
        let base = at(14, 0);

        std::thread::scope(|s| {
            for worker in 0..8 {
                let store = store.clone();
                s.spawn(move || {
                    for i in 0..25 {
                        let post = Post::new(format!("w{} p{}", worker, i), "load", base + Duration::minutes(i));
                        store.insert_post(&post).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.count_posts().unwrap(), 200);
    }
}
