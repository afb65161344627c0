//! Verification records
//!
//! A verification vouches for text written on another platform. The text
//! itself is never stored, only its hash and word count. Paste metadata is
//! kept as JSON and the status is always re-derived from it.

use diesel::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use super::context::OwnerRef;
use super::diesel_schema::verifications;
use super::models::{current_timestamp, NewVerification, Verification};
use crate::aggregator::{self, PasteMetadata};
use crate::error::StorageError;

/// Longest accepted platform tag
pub const MAX_PLATFORM_CHARS: usize = 64;

/// Input for creating a verification
#[derive(Debug, Clone)]
pub struct CreateVerificationInput {
    pub platform: String,
    pub content: String,
    pub paste_metadata: PasteMetadata,
}

/// `sha256-<hex>` digest of verified text
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("sha256-{}", hex::encode(digest))
}

/// Decode the stored paste metadata of a verification
pub fn paste_metadata(verification: &Verification) -> Result<PasteMetadata, StorageError> {
    serde_json::from_str(&verification.paste_metadata_json).map_err(|e| {
        error!(id = %verification.id, error = %e, "Stored paste metadata is malformed");
        StorageError::AggregationInconsistency(format!(
            "paste metadata of verification {}: {}",
            verification.id, e
        ))
    })
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get verification by internal ID
pub fn get_verification(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Verification>, StorageError> {
    verifications::table
        .filter(verifications::id.eq(id))
        .select(Verification::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Get verification by the public identifier used on the wire
pub fn get_by_public_id(
    conn: &mut SqliteConnection,
    public_id: &str,
) -> Result<Option<Verification>, StorageError> {
    verifications::table
        .filter(verifications::public_id.eq(public_id))
        .select(Verification::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a verification, hashing the content and deriving its status
pub fn create_verification(
    conn: &mut SqliteConnection,
    user_id: Option<&str>,
    input: CreateVerificationInput,
) -> Result<Verification, StorageError> {
    let platform = input.platform.trim();
    if platform.is_empty() {
        return Err(StorageError::InvalidInput("platform must not be empty".into()));
    }
    if platform.chars().count() > MAX_PLATFORM_CHARS {
        return Err(StorageError::InvalidInput(format!(
            "platform exceeds {} characters",
            MAX_PLATFORM_CHARS
        )));
    }

    let id = Uuid::new_v4().to_string();
    let public_id = Uuid::new_v4().simple().to_string();
    let hash = content_hash(&input.content);
    let status = aggregator::derive_verification_status(&input.paste_metadata);
    let paste_json = serde_json::to_string(&input.paste_metadata)?;
    let owner = OwnerRef::Verification(id.clone());
    let word_count = aggregator::to_column(
        aggregator::compute_word_count(&input.content),
        "word_count",
        &owner,
    )?;
    let now = current_timestamp();

    diesel::insert_into(verifications::table)
        .values(&NewVerification {
            id: &id,
            public_id: &public_id,
            user_id,
            platform,
            content_hash: &hash,
            status: status.as_str(),
            paste_metadata_json: &paste_json,
            word_count,
            keystroke_count: 0,
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Insert failed: {}", e)))?;

    info!(id = %id, public_id = %public_id, status = status.as_str(), "Created verification");
    get_verification(conn, &id)?
        .ok_or_else(|| StorageError::Internal("Failed to retrieve created verification".into()))
}

/// Recompute keystroke count and status from stored events and metadata
pub fn refresh_verification_stats(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Verification, StorageError> {
    let current = get_verification(conn, id)?.ok_or(StorageError::OwnerNotFound)?;
    let paste = paste_metadata(&current)?;
    let status = aggregator::derive_verification_status(&paste);
    let keystroke_count =
        aggregator::compute_keystroke_count(conn, &OwnerRef::Verification(current.id.clone()))?;

    diesel::update(verifications::table.filter(verifications::id.eq(&current.id)))
        .set((
            verifications::status.eq(status.as_str()),
            verifications::keystroke_count.eq(keystroke_count),
        ))
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Update failed: {}", e)))?;

    get_verification(conn, &current.id)?
        .ok_or_else(|| StorageError::Internal("Verification vanished during refresh".into()))
}

/// Close a verification to further events
///
/// New paste metadata may be supplied up to the first finalization.
/// Finalizing again recomputes the statistics and keeps the original
/// timestamp; differing paste metadata is then a conflict.
pub fn finalize_verification(
    conn: &mut SqliteConnection,
    id: &str,
    paste: Option<PasteMetadata>,
) -> Result<Verification, StorageError> {
    conn.transaction(|conn| {
        let current = get_verification(conn, id)?.ok_or(StorageError::OwnerNotFound)?;

        if current.is_finalized() {
            if let Some(requested) = paste {
                if requested != paste_metadata(&current)? {
                    return Err(StorageError::Conflict(
                        "verification is already finalized".into(),
                    ));
                }
            }
            return refresh_verification_stats(conn, &current.id);
        }

        let now = current_timestamp();
        let updated = match paste {
            Some(requested) => {
                let json = serde_json::to_string(&requested)?;
                diesel::update(verifications::table.filter(verifications::id.eq(&current.id)))
                    .set((
                        verifications::paste_metadata_json.eq(json),
                        verifications::finalized_at.eq(Some(now.as_str())),
                    ))
                    .execute(conn)
            }
            None => diesel::update(verifications::table.filter(verifications::id.eq(&current.id)))
                .set(verifications::finalized_at.eq(Some(now.as_str())))
                .execute(conn),
        };
        updated.map_err(|e| StorageError::Internal(format!("Update failed: {}", e)))?;

        let finalized = refresh_verification_stats(conn, &current.id)?;
        info!(
            id = %finalized.id,
            status = %finalized.status,
            keystrokes = finalized.keystroke_count,
            "Finalized verification"
        );
        Ok(finalized)
    })
}
