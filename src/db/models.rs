//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Field order of every Queryable struct matches the column order in
//! `diesel_schema.rs`.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// User Models
// ============================================================================

/// Author row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: String,
    pub display_name: String,
    #[serde(skip)]
    pub token_hash: String,
    pub created_at: String,
}

/// New user for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub token_hash: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Document Models
// ============================================================================

/// Document row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Document {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub body: String,
    pub slug: String,
    pub public_slug: Option<String>,
    pub status: String,
    pub is_public: i32,
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub keystroke_count: i32,
    pub created_at: String,
    pub updated_at: String,
    pub published_at: Option<String>,
}

impl Document {
    pub fn is_published(&self) -> bool {
        self.status == document_statuses::PUBLISHED
    }

    /// Published and listed: the only state the public may see
    pub fn is_publicly_visible(&self) -> bool {
        self.is_published() && self.is_public == 1 && self.public_slug.is_some()
    }
}

/// New document for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub author_id: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub slug: &'a str,
    pub status: &'a str,
    pub is_public: i32,
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub keystroke_count: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Verification Models
// ============================================================================

/// Verification row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = verifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Verification {
    pub id: String,
    pub public_id: String,
    pub user_id: Option<String>,
    pub platform: String,
    pub content_hash: String,
    pub status: String,
    pub paste_metadata_json: String,
    pub word_count: i32,
    pub keystroke_count: i32,
    pub finalized_at: Option<String>,
    pub created_at: String,
}

impl Verification {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// New verification for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = verifications)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewVerification<'a> {
    pub id: &'a str,
    pub public_id: &'a str,
    pub user_id: Option<&'a str>,
    pub platform: &'a str,
    pub content_hash: &'a str,
    pub status: &'a str,
    pub paste_metadata_json: &'a str,
    pub word_count: i32,
    pub keystroke_count: i32,
    pub created_at: &'a str,
}

// ============================================================================
// Keystroke Event Models
// ============================================================================

/// Stored keystroke event from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = keystroke_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KeystrokeEvent {
    pub id: i64,
    pub document_id: Option<String>,
    pub verification_id: Option<String>,
    pub event_type: String,
    pub key_code: String,
    pub key_char: Option<String>,
    pub timestamp_ms: f64,
    pub cursor_position: i64,
    pub sequence_number: i64,
    pub created_at: String,
}

/// New keystroke event for INSERT
///
/// `None` owner columns must be written as NULL (not omitted) so rows of a
/// batch insert share one column list.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = keystroke_events)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewKeystrokeEvent<'a> {
    pub document_id: Option<&'a str>,
    pub verification_id: Option<&'a str>,
    pub event_type: &'a str,
    pub key_code: &'a str,
    pub key_char: Option<&'a str>,
    pub timestamp_ms: f64,
    pub cursor_position: i64,
    pub sequence_number: i64,
    pub created_at: &'a str,
}

// ============================================================================
// Keystroke Event Type Constants
// ============================================================================

/// Keystroke event kinds captured by the editor
pub mod event_types {
    pub const KEYDOWN: &str = "keydown";
    pub const KEYUP: &str = "keyup";

    /// All event kinds
    pub const ALL: [&str; 2] = [KEYDOWN, KEYUP];

    /// Canonical constant for a valid kind
    pub fn canonical(kind: &str) -> Option<&'static str> {
        ALL.iter().copied().find(|k| *k == kind)
    }
}

// ============================================================================
// Document Status Constants
// ============================================================================

/// Document lifecycle states
pub mod document_statuses {
    pub const DRAFT: &str = "draft";
    pub const READY_TO_PUBLISH: &str = "ready_to_publish";
    pub const PUBLISHED: &str = "published";

    /// All statuses in lifecycle order
    pub const ALL: [&str; 3] = [DRAFT, READY_TO_PUBLISH, PUBLISHED];

    /// Check if a status is valid
    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }

    /// Canonical constant for a valid status
    pub fn canonical(status: &str) -> Option<&'static str> {
        ALL.iter().copied().find(|s| *s == status)
    }

    /// Published is terminal; the two pre-publish states are interchangeable.
    pub fn can_transition(from: &str, to: &str) -> bool {
        match (from, to) {
            (PUBLISHED, PUBLISHED) => true,
            (PUBLISHED, _) => false,
            (_, to) => is_valid(to),
        }
    }
}

// ============================================================================
// Verification Status Constants
// ============================================================================

/// Verification outcomes
pub mod verification_statuses {
    pub const HUMAN_WRITTEN: &str = "human_written";
    pub const MIXED: &str = "mixed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        assert_eq!(event_types::canonical("keydown"), Some(event_types::KEYDOWN));
        assert_eq!(event_types::canonical("keypress"), None);
        assert_eq!(event_types::canonical("keyup"), Some(event_types::KEYUP));
    }

    #[test]
    fn test_status_transitions() {
        use document_statuses::*;
        assert!(can_transition(DRAFT, READY_TO_PUBLISH));
        assert!(can_transition(READY_TO_PUBLISH, DRAFT));
        assert!(can_transition(READY_TO_PUBLISH, PUBLISHED));
        assert!(!can_transition(PUBLISHED, DRAFT));
        assert!(!can_transition(PUBLISHED, READY_TO_PUBLISH));
        assert!(!can_transition(DRAFT, "archived"));
    }
}
