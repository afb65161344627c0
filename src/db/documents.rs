//! Document CRUD, publishing and public listing
//!
//! Every write recomputes the cached statistics through the aggregator
//! before the row is saved, whether or not the body changed.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::context::OwnerRef;
use super::diesel_schema::{documents, users};
use super::models::{current_timestamp, document_statuses, Document, NewDocument};
use crate::aggregator::{self, DocumentStats};
use crate::error::StorageError;

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Longest generated slug before a collision suffix
const MAX_SLUG_CHARS: usize = 80;

// ============================================================================
// Input Types
// ============================================================================

/// Input for creating a document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentInput {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_is_public")]
    pub is_public: bool,
}

fn default_is_public() -> bool {
    true
}

/// Partial update of a document; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl UpdateDocumentInput {
    fn touches_content(&self) -> bool {
        self.title.is_some() || self.body.is_some()
    }
}

/// A published document with its author's display name
#[derive(Debug, Clone, Serialize)]
pub struct PostRow {
    pub document: Document,
    pub author_name: String,
}

/// One page of the public post listing
#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostRow>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

// ============================================================================
// Slugs
// ============================================================================

/// URL-safe slug from a title: lowercase ASCII alphanumerics joined by dashes
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_CHARS {
            break;
        }
    }

    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// First free slug among `base`, `base-2`, `base-3`, ...
fn unique_slug(conn: &mut SqliteConnection, base: &str) -> Result<String, StorageError> {
    let taken: Vec<String> = documents::table
        .filter(
            documents::slug
                .eq(base)
                .or(documents::slug.like(format!("{}-%", base))),
        )
        .select(documents::slug)
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?;

    if !taken.iter().any(|s| s == base) {
        return Ok(base.to_string());
    }

    let mut suffix = 2u32;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

fn validate_title(title: &str) -> Result<&str, StorageError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StorageError::InvalidInput("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(StorageError::InvalidInput(format!(
            "title exceeds {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title)
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get document by ID
pub fn get_document(conn: &mut SqliteConnection, id: &str) -> Result<Option<Document>, StorageError> {
    documents::table
        .filter(documents::id.eq(id))
        .select(Document::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Get a document owned by `author_id`
///
/// A document owned by somebody else is reported exactly like a missing one.
pub fn get_document_for_author(
    conn: &mut SqliteConnection,
    id: &str,
    author_id: &str,
) -> Result<Document, StorageError> {
    match get_document(conn, id)? {
        Some(doc) if doc.author_id == author_id => Ok(doc),
        _ => Err(StorageError::OwnerNotFound),
    }
}

/// Get document by public slug, regardless of visibility
pub fn get_by_public_slug(
    conn: &mut SqliteConnection,
    public_slug: &str,
) -> Result<Option<Document>, StorageError> {
    documents::table
        .filter(documents::public_slug.eq(public_slug))
        .select(Document::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Get a document the public may see
pub fn get_published_by_public_slug(
    conn: &mut SqliteConnection,
    public_slug: &str,
) -> Result<Document, StorageError> {
    let doc = get_by_public_slug(conn, public_slug)?.ok_or(StorageError::OwnerNotFound)?;
    if !doc.is_publicly_visible() {
        return Err(StorageError::OwnerNotPublic);
    }
    Ok(doc)
}

/// An author's documents, most recently updated first
pub fn list_documents_for_author(
    conn: &mut SqliteConnection,
    author_id: &str,
) -> Result<Vec<Document>, StorageError> {
    documents::table
        .filter(documents::author_id.eq(author_id))
        .order((documents::updated_at.desc(), documents::id.asc()))
        .select(Document::as_select())
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Published, public documents, newest first
pub fn list_public_posts(
    conn: &mut SqliteConnection,
    page: u32,
    page_size: u32,
) -> Result<PostPage, StorageError> {
    if page == 0 {
        return Err(StorageError::InvalidInput("page numbers start at 1".into()));
    }
    if page_size == 0 {
        return Err(StorageError::InvalidInput("page size must be positive".into()));
    }

    let offset = (i64::from(page) - 1) * i64::from(page_size);
    let mut rows: Vec<(Document, String)> = documents::table
        .inner_join(users::table)
        .filter(documents::status.eq(document_statuses::PUBLISHED))
        .filter(documents::is_public.eq(1))
        .filter(documents::public_slug.is_not_null())
        .order((documents::published_at.desc(), documents::id.asc()))
        .select((Document::as_select(), users::display_name))
        .limit(i64::from(page_size) + 1)
        .offset(offset)
        .load(conn)
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))?;

    let has_more = rows.len() > page_size as usize;
    rows.truncate(page_size as usize);

    Ok(PostPage {
        posts: rows
            .into_iter()
            .map(|(document, author_name)| PostRow { document, author_name })
            .collect(),
        page,
        page_size,
        has_more,
    })
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a draft document
pub fn create_document(
    conn: &mut SqliteConnection,
    author_id: &str,
    input: CreateDocumentInput,
) -> Result<Document, StorageError> {
    let title = validate_title(&input.title)?;
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    conn.transaction(|conn| {
        let slug = unique_slug(conn, &slugify(title))?;
        let stats = aggregator::compute_document_stats(
            conn,
            &OwnerRef::Document(id.clone()),
            &input.body,
        )?;

        diesel::insert_into(documents::table)
            .values(&NewDocument {
                id: &id,
                author_id,
                title,
                body: &input.body,
                slug: &slug,
                status: document_statuses::DRAFT,
                is_public: i32::from(input.is_public),
                word_count: stats.word_count,
                reading_time_minutes: stats.reading_time_minutes,
                keystroke_count: stats.keystroke_count,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Insert failed: {}", e)))?;

        debug!(id = %id, slug = %slug, "Created document");
        get_document(conn, &id)?
            .ok_or_else(|| StorageError::Internal("Failed to retrieve created document".into()))
    })
}

/// Update a document owned by `author_id`
///
/// Title and body of a published document are frozen; visibility may still
/// change. Moving to `published` goes through [`publish_document`].
pub fn update_document(
    conn: &mut SqliteConnection,
    id: &str,
    author_id: &str,
    input: UpdateDocumentInput,
) -> Result<Document, StorageError> {
    conn.transaction(|conn| {
        let current = get_document_for_author(conn, id, author_id)?;

        if current.is_published() && input.touches_content() {
            return Err(StorageError::Conflict(
                "published documents cannot be edited".into(),
            ));
        }

        let status = match input.status.as_deref() {
            None => document_statuses::canonical(&current.status)
                .ok_or_else(|| StorageError::Internal(format!("bad stored status {}", current.status)))?,
            Some(requested) => {
                let requested = document_statuses::canonical(requested).ok_or_else(|| {
                    StorageError::InvalidInput(format!("unknown status: {}", requested))
                })?;
                if !document_statuses::can_transition(&current.status, requested) {
                    return Err(StorageError::Conflict(format!(
                        "cannot move a {} document to {}",
                        current.status, requested
                    )));
                }
                requested
            }
        };

        let title = match input.title.as_deref() {
            Some(t) => validate_title(t)?.to_string(),
            None => current.title.clone(),
        };
        let body = input.body.unwrap_or_else(|| current.body.clone());
        let is_public = input.is_public.map(i32::from).unwrap_or(current.is_public);

        let stats = aggregator::compute_document_stats(
            conn,
            &OwnerRef::Document(current.id.clone()),
            &body,
        )?;

        // Status is written as a pre-publish state here; publishing needs
        // the public slug assignment below.
        let stored_status = if status == document_statuses::PUBLISHED && !current.is_published() {
            current.status.as_str()
        } else {
            status
        };

        diesel::update(documents::table.filter(documents::id.eq(&current.id)))
            .set((
                documents::title.eq(&title),
                documents::body.eq(&body),
                documents::status.eq(stored_status),
                documents::is_public.eq(is_public),
                documents::word_count.eq(stats.word_count),
                documents::reading_time_minutes.eq(stats.reading_time_minutes),
                documents::keystroke_count.eq(stats.keystroke_count),
                documents::updated_at.eq(current_timestamp()),
            ))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Update failed: {}", e)))?;

        if status == document_statuses::PUBLISHED && !current.is_published() {
            return publish_document(conn, &current.id, author_id);
        }

        get_document(conn, &current.id)?
            .ok_or_else(|| StorageError::Internal("Document vanished during update".into()))
    })
}

/// Publish a document, assigning its public slug
///
/// Publishing an already published document only refreshes its statistics.
pub fn publish_document(
    conn: &mut SqliteConnection,
    id: &str,
    author_id: &str,
) -> Result<Document, StorageError> {
    conn.transaction(|conn| {
        let current = get_document_for_author(conn, id, author_id)?;
        if current.is_published() {
            return refresh_document_stats(conn, &current.id);
        }

        let stats = aggregator::compute_document_stats(
            conn,
            &OwnerRef::Document(current.id.clone()),
            &current.body,
        )?;
        let public_slug = Uuid::new_v4().simple().to_string();
        let now = current_timestamp();

        diesel::update(documents::table.filter(documents::id.eq(&current.id)))
            .set((
                documents::status.eq(document_statuses::PUBLISHED),
                documents::public_slug.eq(Some(public_slug.as_str())),
                documents::published_at.eq(Some(now.as_str())),
                documents::word_count.eq(stats.word_count),
                documents::reading_time_minutes.eq(stats.reading_time_minutes),
                documents::keystroke_count.eq(stats.keystroke_count),
                documents::updated_at.eq(&now),
            ))
            .execute(conn)
            .map_err(|e| StorageError::Internal(format!("Update failed: {}", e)))?;

        info!(id = %current.id, public_slug = %public_slug, "Published document");
        get_document(conn, &current.id)?
            .ok_or_else(|| StorageError::Internal("Document vanished during publish".into()))
    })
}

/// Recompute and store a document's statistics from its body and events
pub fn refresh_document_stats(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Document, StorageError> {
    let current = get_document(conn, id)?.ok_or(StorageError::OwnerNotFound)?;
    let stats: DocumentStats = aggregator::compute_document_stats(
        conn,
        &OwnerRef::Document(current.id.clone()),
        &current.body,
    )?;

    diesel::update(documents::table.filter(documents::id.eq(&current.id)))
        .set((
            documents::word_count.eq(stats.word_count),
            documents::reading_time_minutes.eq(stats.reading_time_minutes),
            documents::keystroke_count.eq(stats.keystroke_count),
            documents::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Update failed: {}", e)))?;

    get_document(conn, &current.id)?
        .ok_or_else(|| StorageError::Internal("Document vanished during refresh".into()))
}

/// Delete a document owned by `author_id`; its events cascade
pub fn delete_document(
    conn: &mut SqliteConnection,
    id: &str,
    author_id: &str,
) -> Result<bool, StorageError> {
    let deleted = diesel::delete(
        documents::table
            .filter(documents::id.eq(id))
            .filter(documents::author_id.eq(author_id)),
    )
    .execute(conn)
    .map_err(|e| StorageError::Internal(format!("Delete failed: {}", e)))?;

    Ok(deleted > 0)
}
