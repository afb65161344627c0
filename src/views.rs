//! View types for the HTTP API boundary
//!
//! These types use camelCase serialization for TypeScript clients. Row
//! types in `db::models` keep snake_case column names.
//!
//! Pattern:
//! - Services return row types (Document, Verification, KeystrokeEvent)
//! - The HTTP layer converts them to views before serializing
//! - ts-rs generates the TypeScript definitions from the views
//!
//! Views are also the whitelist of what leaves the process: internal row
//! ids, owner columns and token hashes have no field here. SQLite integer
//! booleans become real booleans.

use serde::Serialize;
use tracing::warn;
use ts_rs::TS;

use crate::aggregator::PasteMetadata;
use crate::db::documents::{PostPage, PostRow};
use crate::db::{Document, KeystrokeEvent, Verification};
use crate::services::{IngestResult, ReplayPage};

// ============================================================================
// Replay Views
// ============================================================================

/// One keystroke as shown in a public timeline
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReplayEventView {
    pub event_type: String,
    pub key_code: String,
    pub character: Option<String>,
    pub cursor_position: i64,
    pub sequence_number: i64,
    pub timestamp_ms: f64,
}

impl From<KeystrokeEvent> for ReplayEventView {
    fn from(e: KeystrokeEvent) -> Self {
        Self {
            event_type: e.event_type,
            key_code: e.key_code,
            character: e.key_char,
            cursor_position: e.cursor_position,
            sequence_number: e.sequence_number,
            timestamp_ms: e.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaginationView {
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReplayPageView {
    pub events: Vec<ReplayEventView>,
    pub pagination: PaginationView,
}

impl From<ReplayPage> for ReplayPageView {
    fn from(page: ReplayPage) -> Self {
        Self {
            events: page.events.into_iter().map(ReplayEventView::from).collect(),
            pagination: PaginationView {
                page: page.page,
                page_size: page.page_size,
                has_more: page.has_more,
                total: page.total,
            },
        }
    }
}

// ============================================================================
// Document Views
// ============================================================================

/// A document as its author sees it
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DocumentView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub slug: String,
    pub public_slug: Option<String>,
    pub status: String,
    pub is_public: bool,
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub keystroke_count: i32,
    pub created_at: String,
    pub updated_at: String,
    pub published_at: Option<String>,
}

impl From<Document> for DocumentView {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            title: d.title,
            body: d.body,
            slug: d.slug,
            public_slug: d.public_slug,
            status: d.status,
            is_public: d.is_public != 0,
            word_count: d.word_count,
            reading_time_minutes: d.reading_time_minutes,
            keystroke_count: d.keystroke_count,
            created_at: d.created_at,
            updated_at: d.updated_at,
            published_at: d.published_at,
        }
    }
}

/// A published post as the public sees it
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostView {
    pub public_slug: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub author_name: String,
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub keystroke_count: i32,
    pub published_at: Option<String>,
}

impl From<PostRow> for PostView {
    fn from(row: PostRow) -> Self {
        let d = row.document;
        Self {
            public_slug: d.public_slug.unwrap_or_default(),
            slug: d.slug,
            title: d.title,
            body: d.body,
            author_name: row.author_name,
            word_count: d.word_count,
            reading_time_minutes: d.reading_time_minutes,
            keystroke_count: d.keystroke_count,
            published_at: d.published_at,
        }
    }
}

/// Listing entry, without the body
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostSummaryView {
    pub public_slug: String,
    pub title: String,
    pub author_name: String,
    pub word_count: i32,
    pub reading_time_minutes: i32,
    pub keystroke_count: i32,
    pub published_at: Option<String>,
}

impl From<PostRow> for PostSummaryView {
    fn from(row: PostRow) -> Self {
        let d = row.document;
        Self {
            public_slug: d.public_slug.unwrap_or_default(),
            title: d.title,
            author_name: row.author_name,
            word_count: d.word_count,
            reading_time_minutes: d.reading_time_minutes,
            keystroke_count: d.keystroke_count,
            published_at: d.published_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostPageView {
    pub posts: Vec<PostSummaryView>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl From<PostPage> for PostPageView {
    fn from(page: PostPage) -> Self {
        Self {
            posts: page.posts.into_iter().map(PostSummaryView::from).collect(),
            page: page.page,
            page_size: page.page_size,
            has_more: page.has_more,
        }
    }
}

// ============================================================================
// Verification Views
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PasteMetadataView {
    pub occurred: bool,
    pub count: u32,
}

impl From<PasteMetadata> for PasteMetadataView {
    fn from(p: PasteMetadata) -> Self {
        Self {
            occurred: p.occurred,
            count: p.count,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VerificationView {
    pub public_id: String,
    pub platform: String,
    pub content_hash: String,
    pub status: String,
    pub paste_metadata: PasteMetadataView,
    pub word_count: i32,
    pub keystroke_count: i32,
    pub finalized: bool,
    pub finalized_at: Option<String>,
    pub created_at: String,
}

impl From<Verification> for VerificationView {
    fn from(v: Verification) -> Self {
        // Malformed metadata fails every write; a read still renders the row
        let paste: PasteMetadata = match serde_json::from_str(&v.paste_metadata_json) {
            Ok(paste) => paste,
            Err(e) => {
                warn!(
                    public_id = %v.public_id,
                    status = %v.status,
                    error = %e,
                    "Stored paste metadata is malformed, showing defaults"
                );
                PasteMetadata::default()
            }
        };
        Self {
            finalized: v.is_finalized(),
            public_id: v.public_id,
            platform: v.platform,
            content_hash: v.content_hash,
            status: v.status,
            paste_metadata: paste.into(),
            word_count: v.word_count,
            keystroke_count: v.keystroke_count,
            finalized_at: v.finalized_at,
            created_at: v.created_at,
        }
    }
}

// ============================================================================
// Ingestion View
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct IngestResultView {
    pub accepted: usize,
    pub keystroke_count: i32,
}

impl From<IngestResult> for IngestResultView {
    fn from(r: IngestResult) -> Self {
        Self {
            accepted: r.accepted,
            keystroke_count: r.keystroke_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_event() -> KeystrokeEvent {
        KeystrokeEvent {
            id: 42,
            document_id: Some("doc-internal".into()),
            verification_id: None,
            event_type: "keydown".into(),
            key_code: "KeyA".into(),
            key_char: Some("a".into()),
            timestamp_ms: 12.5,
            cursor_position: 3,
            sequence_number: 7,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_replay_event_exposes_only_whitelisted_fields() {
        let json = serde_json::to_value(ReplayEventView::from(stored_event())).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "character",
                "cursorPosition",
                "eventType",
                "keyCode",
                "sequenceNumber",
                "timestampMs"
            ]
        );
        assert_eq!(json["timestampMs"], 12.5);
    }

    #[test]
    fn test_total_only_when_present() {
        let page = ReplayPage {
            events: vec![stored_event()],
            page: 1,
            page_size: 1000,
            has_more: false,
            total: None,
        };
        let json = serde_json::to_value(ReplayPageView::from(page.clone())).unwrap();
        assert!(json["pagination"].get("total").is_none());
        assert_eq!(json["pagination"]["pageSize"], 1000);
        assert_eq!(json["pagination"]["hasMore"], false);

        let with_total = ReplayPage {
            total: Some(1),
            ..page
        };
        let json = serde_json::to_value(ReplayPageView::from(with_total)).unwrap();
        assert_eq!(json["pagination"]["total"], 1);
    }

    #[test]
    fn test_ingest_result_is_camel_case() {
        let json = serde_json::to_value(IngestResultView::from(IngestResult {
            accepted: 2,
            keystroke_count: 9,
        }))
        .unwrap();
        assert_eq!(json, serde_json::json!({"accepted": 2, "keystrokeCount": 9}));
    }

    fn stored_verification(paste_metadata_json: &str) -> Verification {
        Verification {
            id: "ver-internal".into(),
            public_id: "pub1".into(),
            user_id: None,
            platform: "google-docs".into(),
            content_hash: "sha256-00".into(),
            status: "mixed".into(),
            paste_metadata_json: paste_metadata_json.into(),
            word_count: 2,
            keystroke_count: 5,
            finalized_at: None,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_verification_view_reads_paste_metadata() {
        let view = VerificationView::from(stored_verification(r#"{"occurred":true,"count":3}"#));
        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["pasteMetadata"]["occurred"], true);
        assert_eq!(json["pasteMetadata"]["count"], 3);
        assert_eq!(json["finalized"], false);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_verification_view_survives_malformed_metadata() {
        let view = VerificationView::from(stored_verification("not json"));
        assert_eq!(view.status, "mixed");
        assert_eq!(view.paste_metadata.count, 0);
        assert!(!view.paste_metadata.occurred);
    }
}
