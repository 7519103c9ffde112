//! Field-level diff between a stored post and its updated form

use super::schema::format_timestamp;
use crate::post::{MisinformationReport, Post};

/// Columns of `posts` that changed, plus the report change if any.
///
/// `report` is `None` when the report is untouched, `Some(None)` when it was
/// removed and `Some(Some(_))` when it was attached or replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDiff {
    pub message: Option<String>,
    pub username: Option<String>,
    pub date_submitted: Option<String>,
    pub report: Option<Option<MisinformationReport>>,
}

impl PostDiff {
    /// Compare `old` to `updated`. Timestamps compare in their stored form.
    pub fn between(old: &Post, updated: &Post) -> Self {
        let mut diff = PostDiff::default();

        if updated.message != old.message {
            diff.message = Some(updated.message.clone());
        }
        if updated.username != old.username {
            diff.username = Some(updated.username.clone());
        }
        let updated_date = format_timestamp(&updated.submitted_date);
        if updated_date != format_timestamp(&old.submitted_date) {
            diff.date_submitted = Some(updated_date);
        }
        if report_changed(old.misinfo_report.as_ref(), updated.misinfo_report.as_ref()) {
            diff.report = Some(updated.misinfo_report.clone());
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.post_assignments().is_empty() && self.report.is_none()
    }

    /// `(column, value)` pairs for the posts table, in column order
    pub fn post_assignments(&self) -> Vec<(&'static str, &str)> {
        let mut cols = Vec::new();
        if let Some(ref message) = self.message {
            cols.push(("message", message.as_str()));
        }
        if let Some(ref username) = self.username {
            cols.push(("username", username.as_str()));
        }
        if let Some(ref date) = self.date_submitted {
            cols.push(("date_submitted", date.as_str()));
        }
        cols
    }

    /// UPDATE statement over the changed posts columns, keyed on the last parameter.
    /// `None` when no posts column changed.
    pub fn update_posts_sql(&self) -> Option<String> {
        let cols = self.post_assignments();
        if cols.is_empty() {
            return None;
        }
        let set_clause = cols
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{} = ?{}", col, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "UPDATE posts SET {} WHERE id = ?{}",
            set_clause,
            cols.len() + 1
        ))
    }
}

fn report_changed(old: Option<&MisinformationReport>, updated: Option<&MisinformationReport>) -> bool {
    match (old, updated) {
        (None, None) => false,
        (Some(a), Some(b)) => {
            a.state != b.state
                || a.confidence != b.confidence
                || format_timestamp(&a.submitted_date) != format_timestamp(&b.submitted_date)
        }
        _ => true,
    }
}
