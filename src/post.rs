//! Post types - stored text submissions and their misinformation reports
//!
//! A `Post` has no identity until the store persists it; the store hands back
//! an `IdentifiedPost`, which is the only form ever read back.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use fake::Fake;
use fake::faker::internet::en::Username;
use fake::faker::lorem::en::Sentence;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Messages must be shorter than this many characters.
pub const MAX_MESSAGE_LEN: usize = 256;

/// Usernames must be shorter than this many characters.
pub const MAX_USERNAME_LEN: usize = 64;

/// Classification outcome of a post.
///
/// Serialized as its integer id, which is also the `misinfo_state` row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MisinfoState {
    /// The classifier believes the post is misinformation
    Fake,
    /// The classifier believes the post is truthful
    True,
    /// Historical placeholder for posts that were never classified
    NotChecked,
}

impl MisinfoState {
    /// Get the row id used in the `misinfo_state` lookup table
    pub fn id(&self) -> i64 {
        match self {
            MisinfoState::Fake => 0,
            MisinfoState::True => 1,
            MisinfoState::NotChecked => 2,
        }
    }

    /// Get the display name stored in the lookup table
    pub fn as_str(&self) -> &'static str {
        match self {
            MisinfoState::Fake => "Fake",
            MisinfoState::True => "True",
            MisinfoState::NotChecked => "Not Checked",
        }
    }

    /// Get all misinfo states
    pub fn all() -> &'static [MisinfoState] {
        &[MisinfoState::Fake, MisinfoState::True, MisinfoState::NotChecked]
    }

    /// Map a dataset prediction label (`0` = fake, `1` = true)
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim() {
            "0" => Ok(MisinfoState::Fake),
            "1" => Ok(MisinfoState::True),
            other => Err(Error::Validation(format!(
                "unknown/unsupported misinformation label: {}",
                other
            ))),
        }
    }
}

impl TryFrom<i64> for MisinfoState {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        match id {
            0 => Ok(MisinfoState::Fake),
            1 => Ok(MisinfoState::True),
            2 => Ok(MisinfoState::NotChecked),
            _ => Err(Error::Validation(format!("Unknown misinfo state id: {}", id))),
        }
    }
}

impl From<MisinfoState> for i64 {
    fn from(state: MisinfoState) -> Self {
        state.id()
    }
}

impl std::fmt::Display for MisinfoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification attached to a post. Always fully populated; a post either
/// carries one of these or none at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisinformationReport {
    pub state: MisinfoState,
    pub confidence: f32,
    pub submitted_date: DateTime<Utc>,
}

/// A post that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub message: String,
    pub username: String,
    #[serde(rename = "date")]
    pub submitted_date: DateTime<Utc>,
    pub misinfo_report: Option<MisinformationReport>,
}

impl Post {
    /// Create a new post, trimming surrounding whitespace from message and username
    pub fn new(
        message: impl AsRef<str>,
        username: impl AsRef<str>,
        submitted_date: DateTime<Utc>,
    ) -> Self {
        Self {
            message: message.as_ref().trim().to_string(),
            username: username.as_ref().trim().to_string(),
            submitted_date,
            misinfo_report: None,
        }
    }

    /// Attach a report, replacing any existing one wholesale
    pub fn attach_report(&mut self, state: MisinfoState, confidence: f32, submitted_date: DateTime<Utc>) {
        self.misinfo_report = Some(MisinformationReport {
            state,
            confidence,
            submitted_date,
        });
    }

    /// Builder form of [`Post::attach_report`]
    pub fn with_report(mut self, state: MisinfoState, confidence: f32, submitted_date: DateTime<Utc>) -> Self {
        self.attach_report(state, confidence, submitted_date);
        self
    }

    /// Pair this post with the identity the store assigned to it
    pub fn with_id(self, id: Uuid) -> IdentifiedPost {
        IdentifiedPost { id, post: self }
    }

    /// Per-field validation problems, keyed by field name. Empty when valid.
    pub fn field_errors(&self) -> BTreeMap<&'static str, &'static str> {
        let mut errs = BTreeMap::new();

        let message_len = self.message.chars().count();
        if message_len == 0 {
            errs.insert("message", "Message cannot be empty");
        } else if message_len >= MAX_MESSAGE_LEN {
            errs.insert("message", "Message cannot contain more than 256 characters");
        }

        let username_len = self.username.chars().count();
        if username_len == 0 {
            errs.insert("username", "Username cannot be empty");
        } else if username_len >= MAX_USERNAME_LEN {
            errs.insert("username", "Username cannot be more than 64 characters");
        }

        errs
    }

    /// Validate the post, folding every field problem into one error
    pub fn validate(&self) -> Result<()> {
        let errs = self.field_errors();
        if errs.is_empty() {
            return Ok(());
        }
        let joined = errs
            .iter()
            .map(|(field, problem)| format!("{}: {}", field, problem))
            .collect::<Vec<_>>()
            .join("; ");
        Err(Error::Validation(joined))
    }

    /// Generate a plausible post submitted some time in the last 60 days
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let sentence: String = Sentence(4..14).fake_with_rng(&mut rng);

        let days_ago = rng.gen_range(0..60);
        Self::new(
            clamp_chars(&sentence, MAX_MESSAGE_LEN - 1),
            clamp_chars(&random_username(), MAX_USERNAME_LEN - 1),
            Utc::now() - Duration::days(days_ago),
        )
    }
}

/// A persisted post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedPost {
    pub id: Uuid,
    #[serde(flatten)]
    pub post: Post,
}

impl IdentifiedPost {
    pub fn report(&self) -> Option<&MisinformationReport> {
        self.post.misinfo_report.as_ref()
    }
}

/// Random username for posts that arrive without an author
pub fn random_username() -> String {
    Username().fake()
}

fn clamp_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_new_post_trims_whitespace() {
        let post = Post::new("  hello world \n", "\t alice ", now());
        assert_eq!(post.message, "hello world");
        assert_eq!(post.username, "alice");
        assert!(post.misinfo_report.is_none());
    }

    #[test]
    fn test_empty_message_is_invalid() {
        for input in ["", " ", "   "] {
            let post = Post::new(input, "username", now());
            let errs = post.field_errors();
            assert!(errs.contains_key("message"), "expected message error for {:?}", input);
        }
    }

    #[test]
    fn test_message_length_bounds() {
        assert!(Post::new("a", "username", now()).validate().is_ok());
        assert!(Post::new("a".repeat(255), "username", now()).validate().is_ok());

        let errs = Post::new("a".repeat(256), "username", now()).field_errors();
        assert!(errs.contains_key("message"));
    }

    #[test]
    fn test_username_length_bounds() {
        assert!(Post::new("message", "a", now()).validate().is_ok());
        assert!(Post::new("message", "a".repeat(63), now()).validate().is_ok());

        let errs = Post::new("message", "a".repeat(64), now()).field_errors();
        assert!(errs.contains_key("username"));

        let errs = Post::new("message", "  ", now()).field_errors();
        assert!(errs.contains_key("username"));
    }

    #[test]
    fn test_validate_reports_every_field() {
        let err = Post::new("", "", now()).validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("message"));
        assert!(text.contains("username"));
    }

    #[test]
    fn test_attach_report_replaces_wholesale() {
        let t = now();
        let mut post = Post::new("m", "u", t).with_report(MisinfoState::True, 0.4, t);
        post.attach_report(MisinfoState::Fake, 0.9, t);

        let report = post.misinfo_report.unwrap();
        assert_eq!(report.state, MisinfoState::Fake);
        assert_eq!(report.confidence, 0.9);
    }

    #[test]
    fn test_state_serializes_as_id() {
        for state in MisinfoState::all() {
            let json = serde_json::to_string(state).unwrap();
            assert_eq!(json, state.id().to_string());
            let parsed: MisinfoState = serde_json::from_str(&json).unwrap();
            assert_eq!(*state, parsed);
        }
        assert!(serde_json::from_str::<MisinfoState>("7").is_err());
    }

    #[test]
    fn test_state_from_label() {
        assert_eq!(MisinfoState::from_label("0").unwrap(), MisinfoState::Fake);
        assert_eq!(MisinfoState::from_label("1").unwrap(), MisinfoState::True);
        assert!(MisinfoState::from_label("2").is_err());
        assert!(MisinfoState::from_label("fake").is_err());
    }

    #[test]
    fn test_identified_post_json_shape() {
        let id = Uuid::new_v4();
        let post = Post::new("hello", "bob", now()).with_id(id);
        let value = serde_json::to_value(&post).unwrap();

        assert_eq!(value["id"], id.to_string());
        assert_eq!(value["message"], "hello");
        assert_eq!(value["username"], "bob");
        assert!(value["date"].is_string());
        assert!(value["misinfo_report"].is_null());
    }

    #[test]
    fn test_random_username_fits_bounds() {
        for _ in 0..50 {
            let username = random_username();
            assert!(!username.trim().is_empty());
            assert!(username.chars().count() < MAX_USERNAME_LEN);
        }
    }

    #[test]
    fn test_random_post_is_valid() {
        for _ in 0..50 {
            let post = Post::random();
            assert!(post.validate().is_ok(), "invalid random post: {:?}", post);
            assert!(post.submitted_date <= Utc::now());
        }
    }
}
