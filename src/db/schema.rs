//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::info;

use super::diesel_schema::schema_version;
use crate::error::StorageError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, StorageError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| StorageError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version = schema_version::table
        .select(schema_version::version)
        .first::<i32>(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Failed to read schema_version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), StorageError> {
    diesel::delete(schema_version::table)
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    diesel::insert_into(schema_version::table)
        .values(schema_version::version.eq(version))
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    conn.batch_execute(OWNERS_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create owner tables: {}", e)))?;

    conn.batch_execute(KEYSTROKES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create keystroke tables: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), StorageError> {
    info!(from = from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Authors, documents and verifications
const OWNERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL,
    -- sha256 of the API token; the token itself is never stored
    token_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY NOT NULL,
    author_id TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    slug TEXT NOT NULL UNIQUE,
    public_slug TEXT UNIQUE,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'ready_to_publish', 'published')),
    is_public INTEGER NOT NULL DEFAULT 1,

    -- Derived statistics, recomputed on every write
    word_count INTEGER NOT NULL DEFAULT 0,
    reading_time_minutes INTEGER NOT NULL DEFAULT 0,
    keystroke_count INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    published_at TEXT,
    FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS verifications (
    id TEXT PRIMARY KEY NOT NULL,
    public_id TEXT NOT NULL UNIQUE,
    user_id TEXT,
    platform TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('human_written', 'mixed')),
    paste_metadata_json TEXT NOT NULL DEFAULT '{}',
    word_count INTEGER NOT NULL DEFAULT 0,
    keystroke_count INTEGER NOT NULL DEFAULT 0,
    finalized_at TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
);
"#;

/// Keystroke event log
const KEYSTROKES_SCHEMA: &str = r#"
-- Each event belongs to exactly one owner: a document or a verification
CREATE TABLE IF NOT EXISTS keystroke_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT,
    verification_id TEXT,
    event_type TEXT NOT NULL CHECK (event_type IN ('keydown', 'keyup')),
    key_code TEXT NOT NULL,
    key_char TEXT,
    timestamp_ms REAL NOT NULL CHECK (timestamp_ms >= 0),
    cursor_position INTEGER NOT NULL CHECK (cursor_position >= 0),
    sequence_number INTEGER NOT NULL CHECK (sequence_number >= 0),
    created_at TEXT NOT NULL,
    CHECK ((document_id IS NULL) <> (verification_id IS NULL)),
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
    FOREIGN KEY (verification_id) REFERENCES verifications(id) ON DELETE CASCADE
);
"#;

/// Index definitions
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_documents_author ON documents(author_id);
CREATE INDEX IF NOT EXISTS idx_documents_listing ON documents(status, is_public, published_at);
CREATE INDEX IF NOT EXISTS idx_verifications_user ON verifications(user_id);

-- Sequence numbers are unique per owner
CREATE UNIQUE INDEX IF NOT EXISTS idx_keystrokes_document_seq
    ON keystroke_events(document_id, sequence_number) WHERE document_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_keystrokes_verification_seq
    ON keystroke_events(verification_id, sequence_number) WHERE verification_id IS NOT NULL;

-- Secondary ordering by capture time
CREATE INDEX IF NOT EXISTS idx_keystrokes_document_time
    ON keystroke_events(document_id, timestamp_ms) WHERE document_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_keystrokes_verification_time
    ON keystroke_events(verification_id, timestamp_ms) WHERE verification_id IS NOT NULL;
"#;
