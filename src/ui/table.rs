use crate::dataset::{TnseEmbeddingRecord, TopicActivityRecord};
use crate::post::IdentifiedPost;
use crate::storage::DbStats;
use tabled::{settings::Style, Table, Tabled};

/// Longest message excerpt shown in a listing
const EXCERPT_CHARS: usize = 48;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Posts", &stats.posts.to_string());
    builder.add_row("Reports", &stats.reports.to_string());
    builder.add_row("t-SNE points", &stats.tnse_embeddings.to_string());
    builder.add_row("Topic activities", &stats.topic_activities.to_string());
    builder.build()
}

#[derive(Tabled)]
pub struct PostRow {
    #[tabled(rename = "Id")]
    pub id: String,
    #[tabled(rename = "Submitted")]
    pub submitted: String,
    #[tabled(rename = "User")]
    pub username: String,
    #[tabled(rename = "Message")]
    pub message: String,
    #[tabled(rename = "Report")]
    pub report: String,
}

impl From<&IdentifiedPost> for PostRow {
    fn from(post: &IdentifiedPost) -> Self {
        Self {
            id: post.id.to_string(),
            submitted: post.post.submitted_date.format("%Y-%m-%d %H:%M").to_string(),
            username: post.post.username.clone(),
            message: excerpt(&post.post.message),
            report: match post.report() {
                Some(r) => format!("{} ({:.2})", r.state, r.confidence),
                None => "-".to_string(),
            },
        }
    }
}

pub fn posts_table(posts: &[IdentifiedPost]) -> String {
    let rows: Vec<PostRow> = posts.iter().map(PostRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct EmbeddingRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Label")]
    label: i64,
    #[tabled(rename = "Predicted")]
    pred_label: i64,
    #[tabled(rename = "Correct")]
    correct: String,
    #[tabled(rename = "x")]
    x: String,
    #[tabled(rename = "y")]
    y: String,
}

pub fn embeddings_table(records: &[TnseEmbeddingRecord]) -> String {
    let rows = records.iter().map(|r| EmbeddingRow {
        id: r.record_id,
        label: r.label,
        pred_label: r.pred_label,
        correct: r.correct.clone(),
        x: format!("{:.3}", r.tnse_x),
        y: format!("{:.3}", r.tnse_y),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct TopicRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Topic")]
    topic: String,
    #[tabled(rename = "Contents")]
    contents: String,
}

pub fn topics_table(records: &[TopicActivityRecord]) -> String {
    let rows = records.iter().map(|r| TopicRow {
        id: r.record_id,
        date: r.date_utc.format("%Y-%m-%d").to_string(),
        topic: format!("{} {}", r.topic_id, r.topic_name),
        contents: excerpt(&r.contents),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS - 1).collect();
    format!("{}…", cut)
}
