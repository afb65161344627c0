//! Request context and owner references passed to every operation
//!
//! Nothing about the caller lives in global state: the HTTP layer builds a
//! `RequestContext` per request and hands it down explicitly.

use uuid::Uuid;

use crate::error::StorageError;

/// Per-request caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Authenticated author, `None` for public callers
    pub user_id: Option<String>,
    /// Correlation id for log lines of this request
    pub request_id: String,
}

impl RequestContext {
    /// Context for an unauthenticated caller
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Context for an authenticated author
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The caller's user id, or `Unauthorized` for anonymous callers
    pub fn require_user(&self) -> Result<&str, StorageError> {
        self.user_id()
            .ok_or_else(|| StorageError::Unauthorized("Authentication required".into()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user_id {
            Some(user) => write!(f, "RequestContext({}, user={})", self.request_id, user),
            None => write!(f, "RequestContext({}, anonymous)", self.request_id),
        }
    }
}

/// The aggregate a keystroke event belongs to, by internal row id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerRef {
    Document(String),
    Verification(String),
}

impl OwnerRef {
    pub fn kind(&self) -> &'static str {
        match self {
            OwnerRef::Document(_) => "document",
            OwnerRef::Verification(_) => "verification",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            OwnerRef::Document(id) | OwnerRef::Verification(id) => id,
        }
    }

    /// Value for the `document_id` column
    pub fn document_id(&self) -> Option<&str> {
        match self {
            OwnerRef::Document(id) => Some(id),
            OwnerRef::Verification(_) => None,
        }
    }

    /// Value for the `verification_id` column
    pub fn verification_id(&self) -> Option<&str> {
        match self {
            OwnerRef::Document(_) => None,
            OwnerRef::Verification(id) => Some(id),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
