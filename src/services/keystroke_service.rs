//! Keystroke ingestion
//!
//! Validate, resolve and authorize the owner, append, refresh the owner's
//! statistics. Everything after validation runs in one `BEGIN IMMEDIATE`
//! transaction, so a failed batch leaves no trace and the cached keystroke
//! count always matches the log.

use std::sync::Arc;

use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use tracing::info;

use crate::db::{documents, keystroke_events, verifications, KeystrokeDb, OwnerRef, RequestContext};
use crate::db::keystroke_events::CreateKeystrokeInput;
use crate::error::StorageError;
use crate::sequencer::{self, KeystrokeBatchInput, OwnerTarget};

use super::events::{EventBus, ProvenanceEvent};
use super::ServiceLimits;

/// Outcome of an accepted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub accepted: usize,
    pub keystroke_count: i32,
}

/// Keystroke ingestion service
pub struct KeystrokeService {
    db: Arc<KeystrokeDb>,
    events: Arc<EventBus>,
    limits: ServiceLimits,
}

impl KeystrokeService {
    pub fn new(db: Arc<KeystrokeDb>, events: Arc<EventBus>, limits: ServiceLimits) -> Self {
        Self { db, events, limits }
    }

    /// Ingest one batch for a document or verification
    pub fn ingest(
        &self,
        ctx: &RequestContext,
        input: KeystrokeBatchInput,
    ) -> Result<IngestResult, StorageError> {
        let batch = sequencer::validate_batch(input, self.limits.max_batch_size)?;

        let (owner, result) = self.db.with_write_txn(|conn| {
            let owner = resolve_writable_owner(conn, ctx, &batch.target)?;
            let result = append_and_refresh(conn, &owner, &batch.events)?;
            Ok((owner, result))
        })?;

        info!(
            request = %ctx.request_id,
            owner = %owner,
            accepted = result.accepted,
            keystroke_count = result.keystroke_count,
            "Appended keystrokes"
        );
        self.events.emit(ProvenanceEvent::KeystrokesAppended {
            owner,
            accepted: result.accepted,
            keystroke_count: result.keystroke_count,
        });

        Ok(result)
    }
}

/// Look up the owner a batch targets and check the caller may append to it
///
/// Documents require their author. Verifications created by an author
/// require that author; anonymous ones are addressed by their public id
/// alone.
fn resolve_writable_owner(
    conn: &mut SqliteConnection,
    ctx: &RequestContext,
    target: &OwnerTarget,
) -> Result<OwnerRef, StorageError> {
    match target {
        OwnerTarget::Document(id) => {
            let author = ctx.require_user()?;
            let doc = documents::get_document_for_author(conn, id, author)?;
            if doc.is_published() {
                return Err(StorageError::Conflict(
                    "published documents accept no further keystrokes".into(),
                ));
            }
            Ok(OwnerRef::Document(doc.id))
        }
        OwnerTarget::Verification(public_id) => {
            let verification = verifications::get_by_public_id(conn, public_id)?
                .ok_or(StorageError::OwnerNotFound)?;
            if let Some(creator) = verification.user_id.as_deref() {
                if ctx.user_id() != Some(creator) {
                    return Err(StorageError::OwnerNotFound);
                }
            }
            if verification.is_finalized() {
                return Err(StorageError::Conflict(
                    "finalized verifications accept no further keystrokes".into(),
                ));
            }
            Ok(OwnerRef::Verification(verification.id))
        }
    }
}

/// Append validated events and recompute the owner's statistics
pub(crate) fn append_and_refresh(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
    events: &[CreateKeystrokeInput],
) -> Result<IngestResult, StorageError> {
    let accepted = keystroke_events::append_events(conn, owner, events)?;
    let keystroke_count = match owner {
        OwnerRef::Document(id) => documents::refresh_document_stats(conn, id)?.keystroke_count,
        OwnerRef::Verification(id) => {
            verifications::refresh_verification_stats(conn, id)?.keystroke_count
        }
    };
    Ok(IngestResult {
        accepted,
        keystroke_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::PasteMetadata;
    use crate::db::users;
    use crate::sequencer::KeystrokeEventInput;
    use serde_json::json;

    struct Fixture {
        db: Arc<KeystrokeDb>,
        service: KeystrokeService,
        author: RequestContext,
        doc_id: String,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(KeystrokeDb::open_in_memory().unwrap());
        let (user, doc) = db
            .with_conn(|conn| {
                let (user, _) = users::create_user(conn, "Author")?;
                let doc = documents::create_document(
                    conn,
                    &user.id,
                    documents::CreateDocumentInput {
                        title: "Draft".into(),
                        body: "<p>two words</p>".into(),
                        is_public: true,
                    },
                )?;
                Ok((user, doc))
            })
            .unwrap();
        let service = KeystrokeService::new(db.clone(), Arc::new(EventBus::new()), ServiceLimits::default());
        Fixture {
            db,
            service,
            author: RequestContext::authenticated(user.id),
            doc_id: doc.id,
        }
    }

    fn event(seq: i64) -> KeystrokeEventInput {
        KeystrokeEventInput {
            event_type: Some(json!("keydown")),
            key_code: Some(json!("KeyQ")),
            character: Some(json!("q")),
            timestamp: Some(json!(seq as f64 * 10.0)),
            cursor_position: Some(json!(seq)),
            sequence_number: Some(json!(seq)),
        }
    }

    fn doc_batch(doc_id: &str, seqs: &[i64]) -> KeystrokeBatchInput {
        KeystrokeBatchInput {
            document_id: Some(doc_id.to_string()),
            verification_id: None,
            events: seqs.iter().copied().map(event).collect(),
        }
    }

    #[test]
    fn test_ingest_updates_cached_count() {
        let f = fixture();
        let first = f.service.ingest(&f.author, doc_batch(&f.doc_id, &[0, 1, 2])).unwrap();
        assert_eq!(first, IngestResult { accepted: 3, keystroke_count: 3 });

        let second = f.service.ingest(&f.author, doc_batch(&f.doc_id, &[3])).unwrap();
        assert_eq!(second.keystroke_count, 4);

        let doc = f
            .db
            .with_conn(|conn| documents::get_document(conn, &f.doc_id))
            .unwrap()
            .unwrap();
        assert_eq!(doc.keystroke_count, 4);
        assert_eq!(doc.word_count, 2);
    }

    #[test]
    fn test_resubmitted_batch_conflicts() {
        let f = fixture();
        f.service.ingest(&f.author, doc_batch(&f.doc_id, &[1])).unwrap();

        let result = f.service.ingest(&f.author, doc_batch(&f.doc_id, &[1, 2]));
        assert!(matches!(result, Err(StorageError::DuplicateSequence { .. })));

        let doc = f
            .db
            .with_conn(|conn| documents::get_document(conn, &f.doc_id))
            .unwrap()
            .unwrap();
        assert_eq!(doc.keystroke_count, 1);
    }

    #[test]
    fn test_anonymous_and_foreign_callers_rejected() {
        let f = fixture();
        let anonymous = f
            .service
            .ingest(&RequestContext::anonymous(), doc_batch(&f.doc_id, &[0]));
        assert!(matches!(anonymous, Err(StorageError::Unauthorized(_))));

        let stranger = RequestContext::authenticated("someone-else");
        let foreign = f.service.ingest(&stranger, doc_batch(&f.doc_id, &[0]));
        assert!(matches!(foreign, Err(StorageError::OwnerNotFound)));
    }

    #[test]
    fn test_published_document_rejects_keystrokes() {
        let f = fixture();
        let author_id = f.author.user_id().unwrap().to_string();
        f.db.with_conn(|conn| documents::publish_document(conn, &f.doc_id, &author_id))
            .unwrap();

        let result = f.service.ingest(&f.author, doc_batch(&f.doc_id, &[0]));
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn test_verification_ingest_and_finalized_rejection() {
        let f = fixture();
        let verification = f
            .db
            .with_conn(|conn| {
                verifications::create_verification(
                    conn,
                    None,
                    verifications::CreateVerificationInput {
                        platform: "word".into(),
                        content: "text".into(),
                        paste_metadata: PasteMetadata::default(),
                    },
                )
            })
            .unwrap();

        let batch = KeystrokeBatchInput {
            document_id: None,
            verification_id: Some(verification.public_id.clone()),
            events: vec![event(0), event(1)],
        };
        let result = f.service.ingest(&RequestContext::anonymous(), batch.clone()).unwrap();
        assert_eq!(result.keystroke_count, 2);

        f.db.with_conn(|conn| verifications::finalize_verification(conn, &verification.id, None))
            .unwrap();

        let mut late = batch;
        late.events = vec![event(5)];
        let rejected = f.service.ingest(&RequestContext::anonymous(), late);
        assert!(matches!(rejected, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn test_invalid_batch_writes_nothing() {
        let f = fixture();
        let mut batch = doc_batch(&f.doc_id, &[0, 1]);
        batch.events[1].key_code = None;

        let result = f.service.ingest(&f.author, batch);
        assert!(matches!(result, Err(StorageError::Validation(_))));

        let count = f
            .db
            .with_conn(|conn| {
                keystroke_events::count_events(conn, &OwnerRef::Document(f.doc_id.clone()))
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
