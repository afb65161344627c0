//! Keystroke event store
//!
//! Append-only log of keystroke events. Every row belongs to exactly one
//! owner (a document or a verification) and carries a sequence number that
//! is unique within that owner. Reads are always ordered by the explicit
//! composite key `(sequence_number, timestamp_ms)`.
//!
//! Appending never touches the owner's cached statistics; recomputing them
//! is the aggregator's job.

use std::collections::BTreeSet;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::Sqlite;
use serde::Serialize;
use tracing::{debug, warn};

use super::context::OwnerRef;
use super::diesel_schema::keystroke_events;
use super::models::{current_timestamp, KeystrokeEvent, NewKeystrokeEvent};
use crate::error::StorageError;

/// Rows per INSERT statement, well under SQLite's bound-parameter limit
const INSERT_CHUNK_SIZE: usize = 500;

/// Sequence numbers per `IN (...)` probe
const PROBE_CHUNK_SIZE: usize = 900;

// ============================================================================
// Query Types
// ============================================================================

/// A validated keystroke ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct CreateKeystrokeInput {
    pub event_type: &'static str,
    pub key_code: String,
    pub character: Option<String>,
    pub timestamp_ms: f64,
    pub cursor_position: i64,
    pub sequence_number: i64,
}

/// One page of an owner's events in replay order
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub events: Vec<KeystrokeEvent>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

type BoxedEventQuery<'a> = keystroke_events::BoxedQuery<'a, Sqlite>;

/// Events of one owner, unordered
fn owner_events(owner: &OwnerRef) -> BoxedEventQuery<'_> {
    match owner {
        OwnerRef::Document(id) => keystroke_events::table
            .filter(keystroke_events::document_id.eq(id.as_str()))
            .into_boxed(),
        OwnerRef::Verification(id) => keystroke_events::table
            .filter(keystroke_events::verification_id.eq(id.as_str()))
            .into_boxed(),
    }
}

// ============================================================================
// Read Operations
// ============================================================================

/// List one page of an owner's events, ordered by (sequence number, timestamp)
///
/// Pages are 1-based. One probe row past the page decides `has_more`, so
/// at most `page_size + 1` rows are loaded regardless of the owner's size.
pub fn list_ordered(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
    page: u32,
    page_size: u32,
) -> Result<EventPage, StorageError> {
    if page == 0 {
        return Err(StorageError::InvalidInput("page numbers start at 1".into()));
    }
    if page_size == 0 {
        return Err(StorageError::InvalidInput("page size must be positive".into()));
    }

    let offset = (i64::from(page) - 1) * i64::from(page_size);
    let mut events: Vec<KeystrokeEvent> = owner_events(owner)
        .order((
            keystroke_events::sequence_number.asc(),
            keystroke_events::timestamp_ms.asc(),
        ))
        .limit(i64::from(page_size) + 1)
        .offset(offset)
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?;

    let has_more = events.len() > page_size as usize;
    events.truncate(page_size as usize);

    Ok(EventPage {
        events,
        page,
        page_size,
        has_more,
    })
}

/// Live count of an owner's stored events
pub fn count_events(conn: &mut SqliteConnection, owner: &OwnerRef) -> Result<i64, StorageError> {
    let count = match owner {
        OwnerRef::Document(id) => keystroke_events::table
            .filter(keystroke_events::document_id.eq(id.as_str()))
            .count()
            .get_result::<i64>(conn),
        OwnerRef::Verification(id) => keystroke_events::table
            .filter(keystroke_events::verification_id.eq(id.as_str()))
            .count()
            .get_result::<i64>(conn),
    };
    count.map_err(|e| StorageError::Internal(format!("Count query failed: {}", e)))
}

/// Which of `candidates` are already stored for `owner`, ascending
pub fn existing_sequence_numbers(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
    candidates: &[i64],
) -> Result<Vec<i64>, StorageError> {
    let mut found = BTreeSet::new();

    for chunk in candidates.chunks(PROBE_CHUNK_SIZE) {
        let existing: Vec<i64> = owner_events(owner)
            .filter(keystroke_events::sequence_number.eq_any(chunk.to_vec()))
            .select(keystroke_events::sequence_number)
            .load(conn)
            .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?;
        found.extend(existing);
    }

    Ok(found.into_iter().collect())
}

// ============================================================================
// Write Operations
// ============================================================================

/// Append a batch of events to one owner, all or nothing
///
/// Fails with `DuplicateSequence` if any sequence number is repeated in
/// the batch or already stored for the owner; no row is written then.
pub fn append_events(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
    events: &[CreateKeystrokeInput],
) -> Result<usize, StorageError> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut seen = BTreeSet::new();
    let repeated: BTreeSet<i64> = events
        .iter()
        .map(|e| e.sequence_number)
        .filter(|seq| !seen.insert(*seq))
        .collect();
    if !repeated.is_empty() {
        return Err(StorageError::DuplicateSequence {
            sequence_numbers: repeated.into_iter().collect(),
        });
    }

    let sequence_numbers: Vec<i64> = seen.into_iter().collect();

    let appended = conn.transaction(|conn| -> Result<usize, AppendFailure> {
        let existing = existing_sequence_numbers(conn, owner, &sequence_numbers)?;
        if !existing.is_empty() {
            return Err(StorageError::DuplicateSequence {
                sequence_numbers: existing,
            }
            .into());
        }

        let now = current_timestamp();
        let rows: Vec<NewKeystrokeEvent> = events
            .iter()
            .map(|e| NewKeystrokeEvent {
                document_id: owner.document_id(),
                verification_id: owner.verification_id(),
                event_type: e.event_type,
                key_code: &e.key_code,
                key_char: e.character.as_deref(),
                timestamp_ms: e.timestamp_ms,
                cursor_position: e.cursor_position,
                sequence_number: e.sequence_number,
                created_at: &now,
            })
            .collect();

        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            diesel::insert_into(keystroke_events::table)
                .values(chunk)
                .execute(conn)?;
        }

        debug!(owner = %owner, count = rows.len(), "Appended keystroke events");
        Ok(rows.len())
    });

    match appended {
        Ok(count) => Ok(count),
        // The batch's own rows are rolled back by now, so the probe only
        // sees what the other writer stored.
        Err(AppendFailure::Raced) => Err(raced_collision(conn, owner, &sequence_numbers)),
        Err(AppendFailure::Storage(e)) => Err(e),
    }
}

/// Failure inside the append transaction
enum AppendFailure {
    /// UNIQUE violation: another writer stored one of the numbers after the probe
    Raced,
    Storage(StorageError),
}

impl From<StorageError> for AppendFailure {
    fn from(error: StorageError) -> Self {
        AppendFailure::Storage(error)
    }
}

impl From<DieselError> for AppendFailure {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppendFailure::Raced
            }
            e => AppendFailure::Storage(StorageError::Internal(format!("Insert failed: {}", e))),
        }
    }
}

/// `DuplicateSequence` listing the numbers a racing writer actually took
///
/// Falls back to the whole batch when the re-probe finds nothing or fails.
fn raced_collision(
    conn: &mut SqliteConnection,
    owner: &OwnerRef,
    sequence_numbers: &[i64],
) -> StorageError {
    let colliding = match existing_sequence_numbers(conn, owner, sequence_numbers) {
        Ok(found) if !found.is_empty() => found,
        Ok(_) => sequence_numbers.to_vec(),
        Err(e) => {
            warn!(owner = %owner, error = %e, "Re-probe after unique violation failed");
            sequence_numbers.to_vec()
        }
    };
    warn!(owner = %owner, colliding = ?colliding, "Concurrent append collided");
    StorageError::DuplicateSequence {
        sequence_numbers: colliding,
    }
}
