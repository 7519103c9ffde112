use crate::import::ImportSummary;
use crate::post::{IdentifiedPost, MisinfoState, MisinformationReport};
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn timing(elapsed: &str) {
    println!("{} {}", Icons::CLOCK.style(theme().dim.clone()), elapsed);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

pub fn state_icon(state: Option<MisinfoState>) -> &'static str {
    match state {
        Some(MisinfoState::Fake) => Icons::FAKE,
        Some(MisinfoState::True) => Icons::VERIFIED,
        Some(MisinfoState::NotChecked) | None => Icons::UNCHECKED,
    }
}

/// `Fake (0.93)`, or `pending` when no report is attached
pub fn report_label(report: Option<&MisinformationReport>) -> String {
    let state = report.map(|r| r.state);
    let text = match report {
        Some(r) => format!("{} ({:.2})", r.state, r.confidence),
        None => "pending".to_string(),
    };
    text.style(theme().for_state(state)).to_string()
}

pub fn post_detail(post: &IdentifiedPost) {
    let report = post.report();
    section(&format!(" post {} ", post.id));
    status(Icons::POST, "Message", &post.post.message);
    status(Icons::PERSON, "Username", &post.post.username);
    status(Icons::CALENDAR, "Submitted", &post.post.submitted_date.to_rfc3339());
    status(
        state_icon(report.map(|r| r.state)),
        "Report",
        &report_label(report),
    );
    if let Some(r) = report {
        summary_row("reported at", &r.submitted_date.to_rfc3339());
    }
}

pub fn import_summary(dataset: &str, summary: &ImportSummary) {
    success(&format!("Imported {}", dataset));
    summary_row("records", &summary.records.to_string());
    summary_row("inserted", &summary.inserted.to_string());
    if summary.filtered > 0 {
        summary_row("filtered", &summary.filtered.to_string());
    }
    if summary.rejected > 0 {
        summary_row("rejected", &muted(&summary.rejected.to_string()));
    }
    if summary.failed > 0 {
        summary_row("failed", &summary.failed.to_string().style(theme().error.clone()).to_string());
    }
    if summary.replaced > 0 {
        summary_row("replaced", &summary.replaced.to_string());
    }
}
