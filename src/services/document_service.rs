//! Document service - authoring, publishing and the public post listing

use std::sync::Arc;

use tracing::info;

use crate::db::documents::{self, CreateDocumentInput, PostPage, PostRow, UpdateDocumentInput};
use crate::db::{users, Document, KeystrokeDb, RequestContext};
use crate::error::StorageError;

use super::events::{EventBus, ProvenanceEvent};
use super::ServiceLimits;

/// Document service for business logic
pub struct DocumentService {
    db: Arc<KeystrokeDb>,
    events: Arc<EventBus>,
    limits: ServiceLimits,
}

impl DocumentService {
    pub fn new(db: Arc<KeystrokeDb>, events: Arc<EventBus>, limits: ServiceLimits) -> Self {
        Self { db, events, limits }
    }

    // =========================================================================
    // Author Operations
    // =========================================================================

    /// The caller's documents
    pub fn list(&self, ctx: &RequestContext) -> Result<Vec<Document>, StorageError> {
        let author = ctx.require_user()?;
        self.db
            .with_conn(|conn| documents::list_documents_for_author(conn, author))
    }

    /// One of the caller's documents
    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<Document, StorageError> {
        let author = ctx.require_user()?;
        self.db
            .with_conn(|conn| documents::get_document_for_author(conn, id, author))
    }

    pub fn create(
        &self,
        ctx: &RequestContext,
        input: CreateDocumentInput,
    ) -> Result<Document, StorageError> {
        let author = ctx.require_user()?;
        let doc = self
            .db
            .with_write_txn(|conn| documents::create_document(conn, author, input))?;

        info!(request = %ctx.request_id, id = %doc.id, slug = %doc.slug, "Created document");
        self.events.emit(ProvenanceEvent::DocumentCreated {
            id: doc.id.clone(),
            author_id: doc.author_id.clone(),
        });
        Ok(doc)
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: UpdateDocumentInput,
    ) -> Result<Document, StorageError> {
        let author = ctx.require_user()?;
        let was_published = self.get(ctx, id)?.is_published();
        let doc = self
            .db
            .with_write_txn(|conn| documents::update_document(conn, id, author, input))?;

        self.emit_after_write(&doc, was_published);
        Ok(doc)
    }

    pub fn publish(&self, ctx: &RequestContext, id: &str) -> Result<Document, StorageError> {
        let author = ctx.require_user()?;
        let was_published = self.get(ctx, id)?.is_published();
        let doc = self
            .db
            .with_write_txn(|conn| documents::publish_document(conn, id, author))?;

        self.emit_after_write(&doc, was_published);
        Ok(doc)
    }

    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<bool, StorageError> {
        let author = ctx.require_user()?;
        let deleted = self
            .db
            .with_write_txn(|conn| documents::delete_document(conn, id, author))?;

        if deleted {
            info!(request = %ctx.request_id, id = %id, "Deleted document");
            self.events.emit(ProvenanceEvent::DocumentDeleted { id: id.to_string() });
        }
        Ok(deleted)
    }

    fn emit_after_write(&self, doc: &Document, was_published: bool) {
        match (&doc.public_slug, was_published) {
            (Some(public_slug), false) if doc.is_published() => {
                self.events.emit(ProvenanceEvent::DocumentPublished {
                    id: doc.id.clone(),
                    public_slug: public_slug.clone(),
                });
            }
            _ => self.events.emit(ProvenanceEvent::DocumentUpdated { id: doc.id.clone() }),
        }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// A page of published posts; page defaults to 1
    pub fn list_posts(&self, page: Option<u32>) -> Result<PostPage, StorageError> {
        let page = page.unwrap_or(1);
        self.db.with_conn(|conn| {
            documents::list_public_posts(conn, page, self.limits.listing_page_size)
        })
    }

    /// A published post by its public slug
    pub fn get_post(&self, public_slug: &str) -> Result<PostRow, StorageError> {
        self.db.with_conn(|conn| {
            let document = documents::get_published_by_public_slug(conn, public_slug)?;
            let author_name = users::get_user(conn, &document.author_id)?
                .map(|u| u.display_name)
                .ok_or(StorageError::OwnerNotFound)?;
            Ok(PostRow {
                document,
                author_name,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (DocumentService, RequestContext, Arc<EventBus>) {
        let db = Arc::new(KeystrokeDb::open_in_memory().unwrap());
        let (user, _) = db.with_conn(|conn| users::create_user(conn, "Author")).unwrap();
        let events = Arc::new(EventBus::new());
        let service = DocumentService::new(db, events.clone(), ServiceLimits::default());
        (service, RequestContext::authenticated(user.id), events)
    }

    fn input(title: &str) -> CreateDocumentInput {
        CreateDocumentInput {
            title: title.into(),
            body: "<p>Hello there</p>".into(),
            is_public: true,
        }
    }

    #[test]
    fn test_requires_authentication() {
        let (service, _, _) = setup();
        let result = service.create(&RequestContext::anonymous(), input("x"));
        assert!(matches!(result, Err(StorageError::Unauthorized(_))));
    }

    #[test]
    fn test_draft_is_not_a_public_post() {
        let (service, ctx, _) = setup();
        let doc = service.create(&ctx, input("Draft")).unwrap();
        assert!(service.list_posts(None).unwrap().posts.is_empty());

        let published = service.publish(&ctx, &doc.id).unwrap();
        let slug = published.public_slug.unwrap();
        let post = service.get_post(&slug).unwrap();
        assert_eq!(post.author_name, "Author");
        assert_eq!(post.document.word_count, 2);
        assert_eq!(service.list_posts(Some(1)).unwrap().posts.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_emits_event() {
        let (service, ctx, events) = setup();
        let mut receiver = events.subscribe();
        let doc = service.create(&ctx, input("Evented")).unwrap();
        service.publish(&ctx, &doc.id).unwrap();

        let created = receiver.recv().await.unwrap();
        assert!(matches!(created, ProvenanceEvent::DocumentCreated { .. }));
        let published = receiver.recv().await.unwrap();
        assert!(matches!(published, ProvenanceEvent::DocumentPublished { .. }));
    }

    #[test]
    fn test_delete_own_document() {
        let (service, ctx, _) = setup();
        let doc = service.create(&ctx, input("Temp")).unwrap();
        assert!(service.delete(&ctx, &doc.id).unwrap());
        assert!(matches!(service.get(&ctx, &doc.id), Err(StorageError::OwnerNotFound)));
        assert!(!service.delete(&ctx, &doc.id).unwrap());
    }
}
