//! SQLite database module for keystroke provenance
//!
//! ## Tables
//!
//! - `users` - Authors, identified by a hashed API token
//! - `documents` - Documents with cached derived statistics
//! - `verifications` - One-off verifications of text written elsewhere
//! - `keystroke_events` - Append-only event log, one owner per row
//!
//! Connections come from an r2d2 pool. Each connection is set up with
//! foreign keys enabled (needed for cascading deletes), a busy timeout and
//! WAL journaling so replay reads never wait on an in-flight append.

pub mod context;
pub mod diesel_schema;
pub mod documents;
pub mod keystroke_events;
pub mod models;
pub mod schema;
pub mod users;
pub mod verifications;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use tracing::{debug, info};

use crate::error::StorageError;
use diesel_schema::{documents as documents_table, keystroke_events as events_table};
use diesel_schema::{users as users_table, verifications as verifications_table};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied when the pool opens a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    enable_wal: bool,
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        );
        if self.enable_wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite database for keystroke events and their owners
pub struct KeystrokeDb {
    pool: DbPool,
}

impl KeystrokeDb {
    /// Open or create the database at `path`
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, StorageError> {
        info!("Opening SQLite database at {:?}", path);

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(ConnectionOptions {
                enable_wal: true,
                busy_timeout: Duration::from_secs(5),
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every `:memory:` connection is its own database, so the pool holds
    /// exactly one connection that is never recycled.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(ConnectionOptions {
                enable_wal: false,
                busy_timeout: Duration::from_secs(5),
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StorageError> {
        self.with_conn(schema::init_schema)
    }

    /// Run `f` with a pooled connection
    ///
    /// Never call `with_conn` again from inside `f`: the in-memory pool has a
    /// single connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.pool.get()?;
        f(&mut *conn)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction
    ///
    /// Takes the write lock up front, so check-then-insert sequences of two
    /// writers cannot interleave.
    pub fn with_write_txn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        self.with_conn(|conn| conn.immediate_transaction(f))
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        self.with_conn(|conn| {
            let users: i64 = users_table::table.count().get_result(conn)?;
            let documents: i64 = documents_table::table.count().get_result(conn)?;
            let published_documents: i64 = documents_table::table
                .filter(documents_table::status.eq(models::document_statuses::PUBLISHED))
                .count()
                .get_result(conn)?;
            let verifications: i64 = verifications_table::table.count().get_result(conn)?;
            let keystroke_events: i64 = events_table::table.count().get_result(conn)?;

            Ok(DbStats {
                users: users as u64,
                documents: documents as u64,
                published_documents: published_documents as u64,
                verifications: verifications as u64,
                keystroke_events: keystroke_events as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub users: u64,
    pub documents: u64,
    pub published_documents: u64,
    pub verifications: u64,
    pub keystroke_events: u64,
}

// Re-exports
pub use context::{OwnerRef, RequestContext};
pub use keystroke_events::{CreateKeystrokeInput, EventPage};
pub use models::{Document, KeystrokeEvent, User, Verification};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_has_empty_stats() {
        let db = KeystrokeDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.keystroke_events, 0);
    }

    #[test]
    fn test_open_file_database_twice() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keystrokes.db");

        {
            let db = KeystrokeDb::open(&path, 2).unwrap();
            db.with_conn(|conn| users::create_user(conn, "Ada").map(|_| ())).unwrap();
        }

        let db = KeystrokeDb::open(&path, 2).unwrap();
        assert_eq!(db.stats().unwrap().users, 1);
    }
}
