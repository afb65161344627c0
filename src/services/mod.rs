//! Service layer for signify-keystrokes
//!
//! Services encapsulate business logic between HTTP handlers and
//! repositories. Each service wraps database operations with:
//! - Authorization against the per-request `RequestContext`
//! - Validation and transaction boundaries
//! - Event emission for audit logging
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```
//!
//! Services are synchronous; the HTTP layer runs them on blocking threads.

pub mod response;
pub mod events;
pub mod auth_service;
pub mod keystroke_service;
pub mod document_service;
pub mod verification_service;
pub mod replay_service;

// Re-exports
pub use response::*;
pub use events::{EventBus, EventListener, ProvenanceEvent};
pub use auth_service::AuthService;
pub use keystroke_service::{IngestResult, KeystrokeService};
pub use document_service::DocumentService;
pub use verification_service::{CreateVerificationRequest, VerificationService};
pub use replay_service::{ReplayPage, ReplayService};

use std::sync::Arc;

use crate::config::Config;
use crate::db::KeystrokeDb;

/// Size limits shared by the services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub replay_page_size: u32,
    pub max_batch_size: usize,
    pub listing_page_size: u32,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServiceLimits {
    fn from(config: &Config) -> Self {
        Self {
            replay_page_size: config.replay_page_size,
            max_batch_size: config.max_batch_size,
            listing_page_size: config.listing_page_size,
        }
    }
}

/// Service container for dependency injection
///
/// Holds all services with a shared database. Pass this to HttpServer for
/// handler access.
pub struct Services {
    pub db: Arc<KeystrokeDb>,
    pub auth: Arc<AuthService>,
    pub keystrokes: Arc<KeystrokeService>,
    pub documents: Arc<DocumentService>,
    pub verifications: Arc<VerificationService>,
    pub replay: Arc<ReplayService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<KeystrokeDb>, limits: ServiceLimits) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            auth: Arc::new(AuthService::new(db.clone(), events.clone())),
            keystrokes: Arc::new(KeystrokeService::new(db.clone(), events.clone(), limits)),
            documents: Arc::new(DocumentService::new(db.clone(), events.clone(), limits)),
            verifications: Arc::new(VerificationService::new(db.clone(), events.clone(), limits)),
            replay: Arc::new(ReplayService::new(db.clone(), limits)),
            db,
            events,
        }
    }
}
