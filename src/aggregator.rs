//! Derived statistics for documents and verifications
//!
//! Word count, reading time, keystroke count and verification status are
//! never taken from the client. Owner repositories call into this module on
//! every write, inside the write's transaction, so cached values always
//! match the current content and event log.

use std::sync::OnceLock;

use diesel::sqlite::SqliteConnection;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::db::context::OwnerRef;
use crate::db::keystroke_events;
use crate::db::models::verification_statuses;
use crate::error::StorageError;

/// Average adult reading speed used for reading time
pub const WORDS_PER_MINUTE: u64 = 200;

static TAG_RE: OnceLock<Regex> = OnceLock::new();
static ENTITY_RE: OnceLock<Regex> = OnceLock::new();

fn tag_regex() -> &'static Regex {
    // Comments, then tags that open with a name (`<p`, `</p`, `<!DOCTYPE`, `<?xml`).
    // A bare `<` followed by a space or digit is text.
    TAG_RE.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<[!?/]?[A-Za-z][^<>]*>").expect("tag pattern compiles")
    })
}

fn entity_regex() -> &'static Regex {
    ENTITY_RE.get_or_init(|| {
        Regex::new(r"&(?:[a-zA-Z][a-zA-Z0-9]*|#[0-9]+|#[xX][0-9a-fA-F]+);")
            .expect("entity pattern compiles")
    })
}

/// Count whitespace-delimited words after stripping markup
///
/// Tags become whitespace so `<p>a</p><p>b</p>` counts two words.
/// Non-breaking space entities separate words; other entities are part of
/// the word they appear in.
pub fn compute_word_count(text: &str) -> u64 {
    if text.trim().is_empty() {
        return 0;
    }

    let without_tags = tag_regex().replace_all(text, " ");
    let plain = entity_regex().replace_all(&without_tags, |caps: &regex::Captures| {
        match &caps[0] {
            "&nbsp;" | "&#160;" | "&#xA0;" | "&#xa0;" => " ".to_string(),
            _ => "_".to_string(),
        }
    });

    plain.split_whitespace().count() as u64
}

/// `ceil(word_count / 200)`
pub fn compute_reading_minutes(word_count: u64) -> u64 {
    word_count.div_ceil(WORDS_PER_MINUTE)
}

/// Fresh count of an owner's stored events, sized for the cached column
pub fn compute_keystroke_count(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
) -> Result<i32, StorageError> {
    let count = keystroke_events::count_events(conn, owner).map_err(|e| {
        error!(owner = %owner, error = %e, "Keystroke count failed");
        StorageError::AggregationInconsistency(format!("keystroke count for {}: {}", owner, e))
    })?;

    i32::try_from(count).map_err(|_| {
        error!(owner = %owner, count, "Keystroke count overflows cached column");
        StorageError::AggregationInconsistency(format!(
            "keystroke count {} for {} does not fit the cached column",
            count, owner
        ))
    })
}

/// Statistics cached on a document row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub keystroke_count: i32,
}

/// Recompute every document statistic from its body and event log
pub fn compute_document_stats(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
    body: &str,
) -> Result<DocumentStats, StorageError> {
    let words = compute_word_count(body);
    let minutes = compute_reading_minutes(words);

    Ok(DocumentStats {
        word_count: to_column(words, "word_count", owner)?,
        reading_time_minutes: to_column(minutes, "reading_time_minutes", owner)?,
        keystroke_count: compute_keystroke_count(conn, owner)?,
    })
}

/// Narrow a derived value to an INTEGER column
pub fn to_column(value: u64, field: &str, owner: &OwnerRef) -> Result<i32, StorageError> {
    i32::try_from(value).map_err(|_| {
        error!(owner = %owner, field, value, "Derived value overflows cached column");
        StorageError::AggregationInconsistency(format!("{} = {} for {}", field, value, owner))
    })
}

// ============================================================================
// Paste metadata and verification status
// ============================================================================

/// Paste detection summary reported by the capturing client
///
/// `occurred` accepts a boolean or the strings "true"/"false"; `count`
/// accepts a non-negative number or a numeric string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteMetadata {
    #[serde(
        default,
        alias = "pasteDetected",
        alias = "paste_detected",
        deserialize_with = "deserialize_flag"
    )]
    pub occurred: bool,
    #[serde(
        default,
        alias = "pasteCount",
        alias = "paste_count",
        deserialize_with = "deserialize_count"
    )]
    pub count: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Text(String),
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match FlagRepr::deserialize(deserializer)? {
        FlagRepr::Bool(b) => Ok(b),
        FlagRepr::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid paste flag: {:?}", other))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Number(u64),
    Text(String),
}

fn deserialize_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = match CountRepr::deserialize(deserializer)? {
        CountRepr::Number(n) => n,
        CountRepr::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| de::Error::custom(format!("invalid paste count: {:?}", s)))?,
    };
    u32::try_from(value).map_err(|_| de::Error::custom("paste count out of range"))
}

/// Outcome of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    HumanWritten,
    Mixed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::HumanWritten => verification_statuses::HUMAN_WRITTEN,
            VerificationStatus::Mixed => verification_statuses::MIXED,
        }
    }
}

/// Mixed when a paste occurred at least once, human-written otherwise
pub fn derive_verification_status(paste: &PasteMetadata) -> VerificationStatus {
    if paste.occurred && paste.count > 0 {
        VerificationStatus::Mixed
    } else {
        VerificationStatus::HumanWritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_empty() {
        assert_eq!(compute_word_count(""), 0);
        assert_eq!(compute_word_count("   \n\t "), 0);
        assert_eq!(compute_word_count("<p></p>"), 0);
    }

    #[test]
    fn test_word_count_strips_markup() {
        assert_eq!(compute_word_count("<p>hello world</p>"), 2);
        assert_eq!(compute_word_count("<p>one</p><p>two</p>"), 2);
        assert_eq!(compute_word_count("<a href=\"x y z\">link</a>   text"), 2);
        assert_eq!(compute_word_count("hello&nbsp;world"), 2);
        assert_eq!(compute_word_count("rock&amp;roll"), 1);
        assert_eq!(compute_word_count("<!-- draft note -->kept<br/>words"), 2);
    }

    #[test]
    fn test_word_count_keeps_plain_angle_brackets() {
        assert_eq!(compute_word_count("if 3 < 5 and 7 > 2 then fine"), 10);
        assert_eq!(compute_word_count("<p>x<5 or y>2</p>"), 3);
        assert_eq!(compute_word_count("a -> b <- c"), 5);
    }

    #[test]
    fn test_word_count_collapses_whitespace() {
        assert_eq!(compute_word_count("  a \n\n b\t\tc  "), 3);
    }

    #[test]
    fn test_reading_minutes() {
        assert_eq!(compute_reading_minutes(0), 0);
        assert_eq!(compute_reading_minutes(1), 1);
        assert_eq!(compute_reading_minutes(200), 1);
        assert_eq!(compute_reading_minutes(201), 2);
    }

    #[test]
    fn test_status_from_paste_metadata() {
        let pasted = PasteMetadata { occurred: true, count: 1 };
        assert_eq!(derive_verification_status(&pasted), VerificationStatus::Mixed);

        let clean = PasteMetadata { occurred: false, count: 0 };
        assert_eq!(derive_verification_status(&clean), VerificationStatus::HumanWritten);

        let flag_without_count = PasteMetadata { occurred: true, count: 0 };
        assert_eq!(
            derive_verification_status(&flag_without_count),
            VerificationStatus::HumanWritten
        );
    }

    #[test]
    fn test_paste_metadata_accepts_string_flags() {
        let parsed: PasteMetadata =
            serde_json::from_str(r#"{"occurred": "true", "count": "3"}"#).unwrap();
        assert_eq!(parsed, PasteMetadata { occurred: true, count: 3 });
        assert_eq!(derive_verification_status(&parsed).as_str(), "mixed");

        let aliased: PasteMetadata =
            serde_json::from_str(r#"{"pasteDetected": true, "pasteCount": 2}"#).unwrap();
        assert_eq!(aliased, PasteMetadata { occurred: true, count: 2 });
    }

    #[test]
    fn test_paste_metadata_defaults_and_rejects() {
        let empty: PasteMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, PasteMetadata::default());

        assert!(serde_json::from_str::<PasteMetadata>(r#"{"occurred": "maybe"}"#).is_err());
        assert!(serde_json::from_str::<PasteMetadata>(r#"{"count": -1}"#).is_err());
    }
}
