//! Replay reader - ordered, paginated keystroke timelines
//!
//! Public callers reach a document only through the public slug of a
//! published, listed post, and a verification through its public id.
//! Authors may replay their own drafts by document id.

use std::sync::Arc;

use diesel::sqlite::SqliteConnection;
use tracing::debug;

use crate::db::{documents, keystroke_events, verifications};
use crate::db::{KeystrokeDb, KeystrokeEvent, OwnerRef, RequestContext};
use crate::error::StorageError;

use super::ServiceLimits;

/// One replay page
#[derive(Debug, Clone)]
pub struct ReplayPage {
    pub events: Vec<KeystrokeEvent>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    /// Total stored events, only when requested
    pub total: Option<i64>,
}

/// Replay service
pub struct ReplayService {
    db: Arc<KeystrokeDb>,
    limits: ServiceLimits,
}

impl ReplayService {
    pub fn new(db: Arc<KeystrokeDb>, limits: ServiceLimits) -> Self {
        Self { db, limits }
    }

    /// Replay a published post
    pub fn replay_post(
        &self,
        public_slug: &str,
        page: Option<u32>,
        include_total: bool,
    ) -> Result<ReplayPage, StorageError> {
        self.db.with_conn(|conn| {
            let doc = documents::get_published_by_public_slug(conn, public_slug)?;
            self.read_page(conn, &OwnerRef::Document(doc.id), page, include_total)
        })
    }

    /// Replay a verification by public id
    pub fn replay_verification(
        &self,
        public_id: &str,
        page: Option<u32>,
        include_total: bool,
    ) -> Result<ReplayPage, StorageError> {
        self.db.with_conn(|conn| {
            let verification = verifications::get_by_public_id(conn, public_id)?
                .ok_or(StorageError::OwnerNotFound)?;
            self.read_page(
                conn,
                &OwnerRef::Verification(verification.id),
                page,
                include_total,
            )
        })
    }

    /// Replay one of the caller's own documents, drafts included
    pub fn replay_own_document(
        &self,
        ctx: &RequestContext,
        id: &str,
        page: Option<u32>,
        include_total: bool,
    ) -> Result<ReplayPage, StorageError> {
        let author = ctx.require_user()?;
        self.db.with_conn(|conn| {
            let doc = documents::get_document_for_author(conn, id, author)?;
            self.read_page(conn, &OwnerRef::Document(doc.id), page, include_total)
        })
    }

    fn read_page(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerRef,
        page: Option<u32>,
        include_total: bool,
    ) -> Result<ReplayPage, StorageError> {
        let page = page.unwrap_or(1);
        let result =
            keystroke_events::list_ordered(conn, owner, page, self.limits.replay_page_size)?;
        let total = if include_total {
            Some(keystroke_events::count_events(conn, owner)?)
        } else {
            None
        };

        debug!(owner = %owner, page, returned = result.events.len(), "Served replay page");
        Ok(ReplayPage {
            events: result.events,
            page: result.page,
            page_size: result.page_size,
            has_more: result.has_more,
            total,
        })
    }
}
