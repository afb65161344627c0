//! Author accounts and bearer-token authentication

use std::sync::Arc;

use tracing::{debug, info};

use crate::db::{users, KeystrokeDb, RequestContext, User};
use crate::error::StorageError;

use super::events::{EventBus, ProvenanceEvent};

/// Resolves API tokens to request contexts
pub struct AuthService {
    db: Arc<KeystrokeDb>,
    events: Arc<EventBus>,
}

impl AuthService {
    pub fn new(db: Arc<KeystrokeDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Build the context for a request
    ///
    /// No token yields an anonymous context; an unknown token is rejected.
    pub fn authenticate(&self, token: Option<&str>) -> Result<RequestContext, StorageError> {
        let Some(token) = token else {
            return Ok(RequestContext::anonymous());
        };

        let user = self
            .db
            .with_conn(|conn| users::find_by_token(conn, token))?
            .ok_or_else(|| StorageError::Unauthorized("Invalid API token".into()))?;

        let ctx = RequestContext::authenticated(user.id);
        debug!(ctx = %ctx, "Authenticated request");
        Ok(ctx)
    }

    /// Create an author; the plaintext token is returned only here
    pub fn create_user(&self, display_name: &str) -> Result<(User, String), StorageError> {
        let (user, token) = self.db.with_conn(|conn| users::create_user(conn, display_name))?;
        info!(id = %user.id, "Created user");
        self.events.emit(ProvenanceEvent::UserCreated { id: user.id.clone() });
        Ok((user, token))
    }
}
