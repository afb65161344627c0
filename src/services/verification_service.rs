//! Verification service - create, finalize and look up verifications
//!
//! Verifications are addressed by their public id everywhere outside the
//! database.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::aggregator::PasteMetadata;
use crate::db::verifications::{self, CreateVerificationInput};
use crate::db::{KeystrokeDb, OwnerRef, RequestContext, Verification};
use crate::error::StorageError;
use crate::sequencer::{self, KeystrokeEventInput};

use super::events::{EventBus, ProvenanceEvent};
use super::keystroke_service::append_and_refresh;
use super::ServiceLimits;

/// Body of `POST /api/verifications`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVerificationRequest {
    pub platform: String,
    pub content: String,
    #[serde(default)]
    pub paste_metadata: PasteMetadata,
    /// Optional first batch of events, stored with the verification
    #[serde(default)]
    pub events: Vec<KeystrokeEventInput>,
}

/// Body of `POST /api/verifications/{publicId}/finalize`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeVerificationRequest {
    #[serde(default)]
    pub paste_metadata: Option<PasteMetadata>,
}

/// Verification service for business logic
pub struct VerificationService {
    db: Arc<KeystrokeDb>,
    events: Arc<EventBus>,
    limits: ServiceLimits,
}

impl VerificationService {
    pub fn new(db: Arc<KeystrokeDb>, events: Arc<EventBus>, limits: ServiceLimits) -> Self {
        Self { db, events, limits }
    }

    /// Create a verification, optionally with its first keystrokes
    ///
    /// The creator is recorded when the caller is authenticated.
    pub fn create(
        &self,
        ctx: &RequestContext,
        request: CreateVerificationRequest,
    ) -> Result<Verification, StorageError> {
        let events = if request.events.is_empty() {
            Vec::new()
        } else {
            sequencer::validate_events(&request.events, self.limits.max_batch_size)?
        };

        let input = CreateVerificationInput {
            platform: request.platform,
            content: request.content,
            paste_metadata: request.paste_metadata,
        };

        let verification = self.db.with_write_txn(|conn| {
            let created = verifications::create_verification(conn, ctx.user_id(), input)?;
            if events.is_empty() {
                return Ok(created);
            }
            append_and_refresh(conn, &OwnerRef::Verification(created.id.clone()), &events)?;
            verifications::get_verification(conn, &created.id)?
                .ok_or_else(|| StorageError::Internal("Verification vanished during create".into()))
        })?;

        info!(
            request = %ctx.request_id,
            public_id = %verification.public_id,
            keystrokes = verification.keystroke_count,
            "Created verification"
        );
        self.events.emit(ProvenanceEvent::VerificationCreated {
            id: verification.id.clone(),
            public_id: verification.public_id.clone(),
            status: verification.status.clone(),
        });
        Ok(verification)
    }

    /// Close a verification to further keystrokes
    ///
    /// Only the creator may finalize an owned verification; anonymous ones
    /// are finalized by whoever holds the public id.
    pub fn finalize(
        &self,
        ctx: &RequestContext,
        public_id: &str,
        request: FinalizeVerificationRequest,
    ) -> Result<Verification, StorageError> {
        let verification = self.db.with_write_txn(|conn| {
            let current = verifications::get_by_public_id(conn, public_id)?
                .ok_or(StorageError::OwnerNotFound)?;
            if let Some(creator) = current.user_id.as_deref() {
                if ctx.user_id() != Some(creator) {
                    return Err(StorageError::OwnerNotFound);
                }
            }
            verifications::finalize_verification(conn, &current.id, request.paste_metadata)
        })?;

        self.events.emit(ProvenanceEvent::VerificationFinalized {
            id: verification.id.clone(),
            status: verification.status.clone(),
            keystroke_count: verification.keystroke_count,
        });
        Ok(verification)
    }

    /// Public summary of a verification
    pub fn get(&self, public_id: &str) -> Result<Verification, StorageError> {
        self.db
            .with_conn(|conn| verifications::get_by_public_id(conn, public_id))?
            .ok_or(StorageError::OwnerNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::verification_statuses;
    use crate::db::users;
    use serde_json::json;

    fn service() -> (VerificationService, Arc<KeystrokeDb>) {
        let db = Arc::new(KeystrokeDb::open_in_memory().unwrap());
        let service = VerificationService::new(db.clone(), Arc::new(EventBus::new()), ServiceLimits::default());
        (service, db)
    }

    fn event(seq: i64) -> KeystrokeEventInput {
        KeystrokeEventInput {
            event_type: Some(json!("keydown")),
            key_code: Some(json!("KeyH")),
            character: Some(json!("h")),
            timestamp: Some(json!(seq as f64)),
            cursor_position: Some(json!(seq)),
            sequence_number: Some(json!(seq)),
        }
    }

    fn request(events: Vec<KeystrokeEventInput>) -> CreateVerificationRequest {
        CreateVerificationRequest {
            platform: "google-docs".into(),
            content: "hello world".into(),
            paste_metadata: PasteMetadata::default(),
            events,
        }
    }

    #[test]
    fn test_create_with_initial_events() {
        let (service, _) = service();
        let v = service
            .create(&RequestContext::anonymous(), request(vec![event(0), event(1)]))
            .unwrap();
        assert_eq!(v.keystroke_count, 2);
        assert_eq!(v.word_count, 2);
        assert_eq!(service.get(&v.public_id).unwrap().id, v.id);
    }

    #[test]
    fn test_invalid_initial_events_create_nothing() {
        let (service, db) = service();
        let mut bad = event(0);
        bad.event_type = Some(json!("click"));

        let result = service.create(&RequestContext::anonymous(), request(vec![bad]));
        assert!(matches!(result, Err(StorageError::Validation(_))));
        assert_eq!(db.stats().unwrap().verifications, 0);
    }

    #[test]
    fn test_finalize_derives_status_from_paste_metadata() {
        let (service, _) = service();
        let v = service.create(&RequestContext::anonymous(), request(vec![])).unwrap();
        assert_eq!(v.status, verification_statuses::HUMAN_WRITTEN);

        let finalized = service
            .finalize(
                &RequestContext::anonymous(),
                &v.public_id,
                FinalizeVerificationRequest {
                    paste_metadata: Some(PasteMetadata { occurred: true, count: 4 }),
                },
            )
            .unwrap();
        assert_eq!(finalized.status, verification_statuses::MIXED);
        assert!(finalized.is_finalized());
    }

    #[test]
    fn test_only_creator_finalizes_owned_verification() {
        let (service, db) = service();
        let (user, _) = db.with_conn(|conn| users::create_user(conn, "Owner")).unwrap();
        let owner = RequestContext::authenticated(user.id);

        let v = service.create(&owner, request(vec![])).unwrap();
        let stranger = service.finalize(
            &RequestContext::anonymous(),
            &v.public_id,
            FinalizeVerificationRequest::default(),
        );
        assert!(matches!(stranger, Err(StorageError::OwnerNotFound)));

        assert!(service
            .finalize(&owner, &v.public_id, FinalizeVerificationRequest::default())
            .is_ok());
    }

    #[test]
    fn test_unknown_public_id() {
        let (service, _) = service();
        assert!(matches!(service.get("missing"), Err(StorageError::OwnerNotFound)));
    }
}
