//! Record parsers for the CSV datasets
//!
//! Each parser takes one record (ordered field list) and either produces the
//! row to insert or a `Validation` error naming the offending field.

use crate::dataset::{TnseEmbeddingRecord, TopicActivityRecord};
use crate::post::{MisinfoState, Post, random_username};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Calendar-date layout used by every dataset
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Only post records whose `correct` column holds exactly this are imported
pub const CORRECT_FLAG: &str = "True";

/// Field positions of a posts dataset record:
/// `id, text, date, pred_label, pred_prob, label, correct`
mod post_fields {
    pub const TEXT: usize = 1;
    pub const DATE: usize = 2;
    pub const PRED_LABEL: usize = 3;
    pub const PRED_PROB: usize = 4;
    pub const CORRECT: usize = 6;
    pub const COUNT: usize = 7;
}

fn require_fields(record: &[String], count: usize) -> Result<()> {
    if record.len() < count {
        return Err(Error::Validation(format!(
            "expected {} fields, found {}",
            count,
            record.len()
        )));
    }
    Ok(())
}

fn parse_int(raw: &str, field: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|e| Error::Validation(format!("unable to parse {}: {}", field, e)))
}

fn parse_float(raw: &str, field: &str) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|e| Error::Validation(format!("unable to parse {}: {}", field, e)))
}

fn parse_date(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| Error::Validation(format!("bad {}: {}", field, e)))
}

/// Parse a posts dataset record into a post carrying its pre-computed report.
///
/// Returns `Ok(None)` when the record's `correct` flag is not `"True"`.
/// Every report in a batch shares `imported_at` as its submission date.
pub fn parse_post_record(record: &[String], imported_at: DateTime<Utc>) -> Result<Option<Post>> {
    require_fields(record, post_fields::COUNT)?;

    if record[post_fields::CORRECT] != CORRECT_FLAG {
        return Ok(None);
    }

    let state = MisinfoState::from_label(&record[post_fields::PRED_LABEL])?;
    let confidence = parse_float(&record[post_fields::PRED_PROB], "pred_prob")? as f32;
    let submitted = parse_date(&record[post_fields::DATE], "date")?;

    let post = Post::new(&record[post_fields::TEXT], random_username(), submitted)
        .with_report(state, confidence, imported_at);
    post.validate()?;

    Ok(Some(post))
}

/// Parse `record_id, label, pred_label, correct, tnse_x, tnse_y`
pub fn parse_tnse_record(record: &[String]) -> Result<TnseEmbeddingRecord> {
    require_fields(record, 6)?;

    Ok(TnseEmbeddingRecord {
        record_id: parse_int(&record[0], "id")?,
        label: parse_int(&record[1], "label")?,
        pred_label: parse_int(&record[2], "prediction label")?,
        correct: record[3].clone(),
        tnse_x: parse_float(&record[4], "tnse_x")?,
        tnse_y: parse_float(&record[5], "tnse_y")?,
    })
}

/// Parse `date, contents, topic_id, topic_name`
pub fn parse_topic_activity_record(record: &[String]) -> Result<TopicActivityRecord> {
    require_fields(record, 4)?;

    Ok(TopicActivityRecord {
        record_id: 0,
        date_utc: parse_date(&record[0], "record date")?,
        contents: record[1].clone(),
        topic_id: parse_int(&record[2], "topic id")?,
        topic_name: record[3].clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn imported_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_parse_post_record() {
        let record = fields(&["17", "  Water is wet ", "2020-03-14", "1", "0.87", "1", "True"]);
        let post = parse_post_record(&record, imported_at()).unwrap().unwrap();

        assert_eq!(post.message, "Water is wet");
        assert!(!post.username.is_empty());
        assert_eq!(post.submitted_date, Utc.with_ymd_and_hms(2020, 3, 14, 0, 0, 0).unwrap());

        let report = post.misinfo_report.unwrap();
        assert_eq!(report.state, MisinfoState::True);
        assert!((report.confidence - 0.87).abs() < 1e-6);
        assert_eq!(report.submitted_date, imported_at());
    }

    #[test]
    fn test_incorrect_prediction_is_filtered() {
        for flag in ["False", "true", "", "TRUE"] {
            let record = fields(&["1", "text", "2020-03-14", "0", "0.5", "1", flag]);
            assert!(parse_post_record(&record, imported_at()).unwrap().is_none());
        }
    }

    #[test]
    fn test_post_record_rejections() {
        let bad = [
            fields(&["1", "text", "14/03/2020", "0", "0.5", "0", "True"]),
            fields(&["1", "text", "2020-03-14", "7", "0.5", "0", "True"]),
            fields(&["1", "text", "2020-03-14", "0", "likely", "0", "True"]),
            fields(&["1", "   ", "2020-03-14", "0", "0.5", "0", "True"]),
            fields(&["1", "text", "2020-03-14"]),
        ];
        for record in bad {
            assert!(
                matches!(parse_post_record(&record, imported_at()), Err(Error::Validation(_))),
                "expected rejection for {:?}",
                record
            );
        }
    }

    #[test]
    fn test_parse_tnse_record() {
        let record = parse_tnse_record(&fields(&["3", "1", "0", "False", "-1.5", "2.25"])).unwrap();
        assert_eq!(record.record_id, 3);
        assert_eq!(record.correct, "False");
        assert_eq!(record.tnse_x, -1.5);
        assert_eq!(record.tnse_y, 2.25);

        assert!(parse_tnse_record(&fields(&["id", "label", "pred_label", "correct", "x", "y"])).is_err());
    }

    #[test]
    fn test_parse_topic_activity_record() {
        let record =
            parse_topic_activity_record(&fields(&["2021-07-04", "fireworks tonight", "12", "holidays"])).unwrap();
        assert_eq!(record.date_utc, Utc.with_ymd_and_hms(2021, 7, 4, 0, 0, 0).unwrap());
        assert_eq!(record.topic_id, 12);
        assert_eq!(record.topic_name, "holidays");

        assert!(parse_topic_activity_record(&fields(&["2021-07-04", "x", "twelve", "t"])).is_err());
    }
}
