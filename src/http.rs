//! HTTP API for keystroke provenance
//!
//! ## Public
//! - `GET /health` - Liveness and row counts
//! - `GET /api/posts?page=` - Published posts
//! - `GET /api/posts/{publicSlug}` - One published post
//! - `GET /api/posts/{publicSlug}/keystrokes?page=&includeTotal=` - Replay
//! - `GET /api/verifications/{publicId}` - Verification summary
//! - `GET /api/verifications/{publicId}/keystrokes?page=&includeTotal=` - Replay
//!
//! ## Authenticated (`Authorization: Bearer <token>`)
//! - `POST /api/keystrokes` - Ingest a batch
//! - `GET|POST /api/documents` - List / create own documents
//! - `GET|PUT|DELETE /api/documents/{id}` - Own document
//! - `POST /api/documents/{id}/publish` - Publish
//! - `GET /api/documents/{id}/keystrokes?page=&includeTotal=` - Replay, drafts included
//! - `POST /api/verifications` - Create (token optional)
//! - `POST /api/verifications/{publicId}/finalize` - Finalize
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "Authorization: Bearer $TOKEN" \
//!      -d '{"documentId": "...", "events": [{"eventType": "keydown", "keyCode": "KeyA",
//!           "character": "a", "timestamp": 12.5, "cursorPosition": 0, "sequenceNumber": 0}]}' \
//!      http://localhost:8095/api/keystrokes
//!
//! curl http://localhost:8095/api/posts/$PUBLIC_SLUG/keystrokes?page=2&includeTotal=true
//! ```
//!
//! Diesel calls are synchronous, so every service call runs on the blocking
//! thread pool.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::{documents, RequestContext};
use crate::error::StorageError;
use crate::sequencer::KeystrokeBatchInput;
use crate::services::response::{self, HandlerResult};
use crate::services::verification_service::FinalizeVerificationRequest;
use crate::services::{CreateVerificationRequest, Services};
use crate::views::{
    DocumentView, IngestResultView, PostPageView, PostView, ReplayPageView, VerificationView,
};

/// Request bodies larger than this are rejected
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// `?page=&includeTotal=`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    include_total: bool,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    max_body_bytes: usize,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route a request and turn any error into a JSON error response
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(method = %method, path = %path, "Incoming request");

        let result = self.route(req, &method, &path).await;
        Ok(match result {
            Ok(response) => response,
            Err(e) => response::error_response(e),
        })
    }

    async fn route<B>(&self, req: Request<B>, method: &Method, path: &str) -> HandlerResult
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (&Method::GET, ["health"]) => self.handle_health().await,

            // Ingestion
            (&Method::POST, ["api", "keystrokes"]) => self.handle_ingest(req).await,

            // Public posts
            (&Method::GET, ["api", "posts"]) => {
                let query = parse_query(&req)?;
                self.handle_list_posts(query).await
            }
            (&Method::GET, ["api", "posts", slug]) => self.handle_get_post(slug).await,
            (&Method::GET, ["api", "posts", slug, "keystrokes"]) => {
                let query = parse_query(&req)?;
                self.handle_replay_post(slug, query).await
            }

            // Author documents
            (&Method::GET, ["api", "documents"]) => self.handle_list_documents(req).await,
            (&Method::POST, ["api", "documents"]) => self.handle_create_document(req).await,
            (&Method::GET, ["api", "documents", id]) => self.handle_get_document(req, id).await,
            (&Method::PUT, ["api", "documents", id]) => self.handle_update_document(req, id).await,
            (&Method::DELETE, ["api", "documents", id]) => {
                self.handle_delete_document(req, id).await
            }
            (&Method::POST, ["api", "documents", id, "publish"]) => {
                self.handle_publish_document(req, id).await
            }
            (&Method::GET, ["api", "documents", id, "keystrokes"]) => {
                self.handle_replay_document(req, id).await
            }

            // Verifications
            (&Method::POST, ["api", "verifications"]) => {
                self.handle_create_verification(req).await
            }
            (&Method::GET, ["api", "verifications", public_id]) => {
                self.handle_get_verification(public_id).await
            }
            (&Method::POST, ["api", "verifications", public_id, "finalize"]) => {
                self.handle_finalize_verification(req, public_id).await
            }
            (&Method::GET, ["api", "verifications", public_id, "keystrokes"]) => {
                let query = parse_query(&req)?;
                self.handle_replay_verification(public_id, query).await
            }

            (_, segs) if is_known_route(segs) => Ok(response::method_not_allowed()),
            _ => Ok(response::not_found(response::NOT_FOUND_MESSAGE)),
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Run a synchronous service call on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Services) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let services = self.services.clone();
        tokio::task::spawn_blocking(move || f(&services))
            .await
            .map_err(|e| StorageError::Internal(format!("Blocking task failed: {}", e)))?
    }

    /// Resolve a bearer token into a request context
    async fn context(&self, token: Option<String>) -> Result<RequestContext, StorageError> {
        self.blocking(move |s| s.auth.authenticate(token.as_deref())).await
    }

    /// Read and decode a JSON body, bounded by `max_body_bytes`
    async fn read_json<T, B>(&self, req: Request<B>) -> Result<T, StorageError>
    where
        T: DeserializeOwned,
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let bytes = self.read_body(req).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn read_body<B>(&self, req: Request<B>) -> Result<Bytes, StorageError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = Limited::new(req.into_body(), self.max_body_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    StorageError::InvalidInput(format!(
                        "request body exceeds {} bytes",
                        self.max_body_bytes
                    ))
                } else {
                    StorageError::InvalidInput(format!("Failed to read body: {}", e))
                }
            })?;
        Ok(collected.to_bytes())
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// GET /health
    async fn handle_health(&self) -> HandlerResult {
        let stats = self.blocking(|s| s.db.stats()).await?;
        Ok(response::ok(&json!({
            "status": "ok",
            "users": stats.users,
            "documents": stats.documents,
            "publishedDocuments": stats.published_documents,
            "verifications": stats.verifications,
            "keystrokeEvents": stats.keystroke_events,
        })))
    }

    /// POST /api/keystrokes
    async fn handle_ingest<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let ctx = self.context(bearer_token(&req)?).await?;
        let batch: KeystrokeBatchInput = self.read_json(req).await?;
        let result = self.blocking(move |s| s.keystrokes.ingest(&ctx, batch)).await?;
        Ok(response::created(&IngestResultView::from(result)))
    }

    /// GET /api/posts
    async fn handle_list_posts(&self, query: PageQuery) -> HandlerResult {
        let page = self.blocking(move |s| s.documents.list_posts(query.page)).await?;
        Ok(response::ok(&PostPageView::from(page)))
    }

    /// GET /api/posts/{publicSlug}
    async fn handle_get_post(&self, public_slug: &str) -> HandlerResult {
        let slug = public_slug.to_string();
        let post = self.blocking(move |s| s.documents.get_post(&slug)).await?;
        Ok(response::ok(&PostView::from(post)))
    }

    /// GET /api/posts/{publicSlug}/keystrokes
    async fn handle_replay_post(&self, public_slug: &str, query: PageQuery) -> HandlerResult {
        let slug = public_slug.to_string();
        let page = self
            .blocking(move |s| s.replay.replay_post(&slug, query.page, query.include_total))
            .await?;
        Ok(response::ok(&ReplayPageView::from(page)))
    }

    /// GET /api/documents
    async fn handle_list_documents<B>(&self, req: Request<B>) -> HandlerResult {
        let ctx = self.context(bearer_token(&req)?).await?;
        let docs = self.blocking(move |s| s.documents.list(&ctx)).await?;
        let views: Vec<DocumentView> = docs.into_iter().map(DocumentView::from).collect();
        Ok(response::ok(&views))
    }

    /// POST /api/documents
    async fn handle_create_document<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let ctx = self.context(bearer_token(&req)?).await?;
        let input: documents::CreateDocumentInput = self.read_json(req).await?;
        let doc = self.blocking(move |s| s.documents.create(&ctx, input)).await?;
        Ok(response::created(&DocumentView::from(doc)))
    }

    /// GET /api/documents/{id}
    async fn handle_get_document<B>(&self, req: Request<B>, id: &str) -> HandlerResult {
        let ctx = self.context(bearer_token(&req)?).await?;
        let id = id.to_string();
        let doc = self.blocking(move |s| s.documents.get(&ctx, &id)).await?;
        Ok(response::ok(&DocumentView::from(doc)))
    }

    /// PUT /api/documents/{id}
    async fn handle_update_document<B>(&self, req: Request<B>, id: &str) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let ctx = self.context(bearer_token(&req)?).await?;
        let input: documents::UpdateDocumentInput = self.read_json(req).await?;
        let id = id.to_string();
        let doc = self
            .blocking(move |s| s.documents.update(&ctx, &id, input))
            .await?;
        Ok(response::ok(&DocumentView::from(doc)))
    }

    /// DELETE /api/documents/{id}
    async fn handle_delete_document<B>(&self, req: Request<B>, id: &str) -> HandlerResult {
        let ctx = self.context(bearer_token(&req)?).await?;
        let id = id.to_string();
        let result = self.blocking(move |s| s.documents.delete(&ctx, &id)).await;
        Ok(response::from_delete_bool_result(result, response::NOT_FOUND_MESSAGE))
    }

    /// POST /api/documents/{id}/publish
    async fn handle_publish_document<B>(&self, req: Request<B>, id: &str) -> HandlerResult {
        let ctx = self.context(bearer_token(&req)?).await?;
        let id = id.to_string();
        let doc = self.blocking(move |s| s.documents.publish(&ctx, &id)).await?;
        Ok(response::ok(&DocumentView::from(doc)))
    }

    /// GET /api/documents/{id}/keystrokes
    async fn handle_replay_document<B>(&self, req: Request<B>, id: &str) -> HandlerResult {
        let query = parse_query(&req)?;
        let ctx = self.context(bearer_token(&req)?).await?;
        let id = id.to_string();
        let page = self
            .blocking(move |s| {
                s.replay
                    .replay_own_document(&ctx, &id, query.page, query.include_total)
            })
            .await?;
        Ok(response::ok(&ReplayPageView::from(page)))
    }

    /// POST /api/verifications
    async fn handle_create_verification<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let ctx = self.context(bearer_token(&req)?).await?;
        let request: CreateVerificationRequest = self.read_json(req).await?;
        let verification = self
            .blocking(move |s| s.verifications.create(&ctx, request))
            .await?;
        Ok(response::created(&VerificationView::from(verification)))
    }

    /// GET /api/verifications/{publicId}
    async fn handle_get_verification(&self, public_id: &str) -> HandlerResult {
        let public_id = public_id.to_string();
        let verification = self
            .blocking(move |s| s.verifications.get(&public_id))
            .await?;
        Ok(response::ok(&VerificationView::from(verification)))
    }

    /// POST /api/verifications/{publicId}/finalize
    async fn handle_finalize_verification<B>(&self, req: Request<B>, public_id: &str) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let ctx = self.context(bearer_token(&req)?).await?;
        let body = self.read_body(req).await?;
        let request: FinalizeVerificationRequest = if body.is_empty() {
            FinalizeVerificationRequest::default()
        } else {
            serde_json::from_slice(&body)?
        };
        let public_id = public_id.to_string();
        let verification = self
            .blocking(move |s| s.verifications.finalize(&ctx, &public_id, request))
            .await?;
        Ok(response::ok(&VerificationView::from(verification)))
    }

    /// GET /api/verifications/{publicId}/keystrokes
    async fn handle_replay_verification(&self, public_id: &str, query: PageQuery) -> HandlerResult {
        let public_id = public_id.to_string();
        let page = self
            .blocking(move |s| {
                s.replay
                    .replay_verification(&public_id, query.page, query.include_total)
            })
            .await?;
        Ok(response::ok(&ReplayPageView::from(page)))
    }
}

/// Paths served by some method, for 405 answers
fn is_known_route(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["health"]
            | ["api", "keystrokes"]
            | ["api", "posts"]
            | ["api", "posts", _]
            | ["api", "posts", _, "keystrokes"]
            | ["api", "documents"]
            | ["api", "documents", _]
            | ["api", "documents", _, "publish" | "keystrokes"]
            | ["api", "verifications"]
            | ["api", "verifications", _]
            | ["api", "verifications", _, "finalize" | "keystrokes"]
    )
}

fn parse_query<B>(req: &Request<B>) -> Result<PageQuery, StorageError> {
    let raw = req.uri().query().unwrap_or("");
    serde_urlencoded::from_str(raw)
        .map_err(|e| StorageError::InvalidInput(format!("Invalid query string: {}", e)))
}

/// `Authorization: Bearer <token>`; absent header is anonymous
fn bearer_token<B>(req: &Request<B>) -> Result<Option<String>, StorageError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| StorageError::Unauthorized("Malformed Authorization header".into()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim().to_string()))
        }
        _ => Err(StorageError::Unauthorized(
            "Authorization header must be 'Bearer <token>'".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeystrokeDb;
    use crate::services::ServiceLimits;
    use hyper::StatusCode;
    use serde_json::Value;

    struct TestApi {
        server: HttpServer,
        token: String,
    }

    fn api() -> TestApi {
        let db = Arc::new(KeystrokeDb::open_in_memory().unwrap());
        let services = Arc::new(Services::new(db, ServiceLimits::default()));
        let (_, token) = services.auth.create_user("Ada").unwrap();
        TestApi {
            server: HttpServer::new(services, "127.0.0.1:0".parse().unwrap()),
            token,
        }
    }

    impl TestApi {
        async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = body.map(|b| b.to_string()).unwrap_or_default();
            let req = builder.body(Full::new(Bytes::from(body))).unwrap();

            let resp = self.server.handle_request(req).await.unwrap();
            let status = resp.status();
            let bytes = resp.into_body().collect().await.unwrap().to_bytes();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn authed(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let token = self.token.clone();
            self.call(method, uri, Some(&token), body).await
        }
    }

    fn events(seqs: &[i64]) -> Value {
        Value::Array(
            seqs.iter()
                .map(|seq| {
                    json!({
                        "eventType": "keydown",
                        "keyCode": "KeyA",
                        "character": "a",
                        "timestamp": 1000.0 + *seq as f64,
                        "cursorPosition": seq,
                        "sequenceNumber": seq,
                    })
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_health() {
        let api = api();
        let (status, body) = api.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["users"], 1);
    }

    #[tokio::test]
    async fn test_document_ingest_publish_replay() {
        let api = api();
        let (status, doc) = api
            .authed(
                Method::POST,
                "/api/documents",
                Some(json!({"title": "First post", "body": "<p>Hello brave new world</p>"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(doc["status"], "draft");
        assert_eq!(doc["wordCount"], 4);
        let id = doc["id"].as_str().unwrap().to_string();

        let (status, ingest) = api
            .authed(
                Method::POST,
                "/api/keystrokes",
                Some(json!({"documentId": id, "events": events(&[1, 0, 2])})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ingest, json!({"accepted": 3, "keystrokeCount": 3}));

        let (status, dup) = api
            .authed(
                Method::POST,
                "/api/keystrokes",
                Some(json!({"documentId": id, "events": events(&[2, 3])})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(dup["sequenceNumbers"], json!([2]));

        let (status, published) = api
            .authed(Method::POST, &format!("/api/documents/{}/publish", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let slug = published["publicSlug"].as_str().unwrap().to_string();

        let (status, replay) = api
            .call(
                Method::GET,
                &format!("/api/posts/{}/keystrokes?includeTotal=true", slug),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let seqs: Vec<i64> = replay["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["sequenceNumber"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(replay["pagination"]["total"], 3);
        assert_eq!(replay["pagination"]["hasMore"], false);

        let (status, listing) = api.call(Method::GET, "/api/posts", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["posts"][0]["authorName"], "Ada");
    }

    #[tokio::test]
    async fn test_draft_replay_is_private() {
        let api = api();
        let (_, doc) = api
            .authed(Method::POST, "/api/documents", Some(json!({"title": "Secret"})))
            .await;
        let id = doc["id"].as_str().unwrap().to_string();

        let (status, _) = api
            .call(Method::GET, &format!("/api/documents/{}/keystrokes", id), None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = api
            .authed(Method::GET, &format!("/api/documents/{}/keystrokes", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["pagination"].get("total").is_none());
    }

    #[tokio::test]
    async fn test_validation_errors_are_422() {
        let api = api();
        let (_, doc) = api
            .authed(Method::POST, "/api/documents", Some(json!({"title": "Bad input"})))
            .await;
        let mut batch = events(&[0]);
        batch[0]["eventType"] = json!("keypress");

        let (status, body) = api
            .authed(
                Method::POST,
                "/api/keystrokes",
                Some(json!({"documentId": doc["id"], "events": batch})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "eventType");
        assert_eq!(body["fields"][0]["index"], 0);

        let mut batch = events(&[0, 1]);
        batch[0]["cursorPosition"] = json!("abc");
        batch[1]["sequenceNumber"] = json!(1.5);
        let (status, body) = api
            .authed(
                Method::POST,
                "/api/keystrokes",
                Some(json!({"documentId": doc["id"], "events": batch})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["index"], 0);
        assert_eq!(body["fields"][0]["field"], "cursorPosition");
        assert_eq!(body["fields"][1]["index"], 1);
        assert_eq!(body["fields"][1]["field"], "sequenceNumber");
    }

    #[tokio::test]
    async fn test_verification_flow() {
        let api = api();
        let (status, created) = api
            .call(
                Method::POST,
                "/api/verifications",
                None,
                Some(json!({
                    "platform": "google-docs",
                    "content": "typed by hand",
                    "pasteMetadata": {"occurred": "true", "count": "1"},
                    "events": events(&[0, 1]),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "mixed");
        assert_eq!(created["keystrokeCount"], 2);
        let public_id = created["publicId"].as_str().unwrap().to_string();

        let (status, finalized) = api
            .call(
                Method::POST,
                &format!("/api/verifications/{}/finalize", public_id),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(finalized["finalized"], true);

        let (status, _) = api
            .call(
                Method::POST,
                "/api/keystrokes",
                None,
                Some(json!({"verificationId": public_id, "events": events(&[2])})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, replay) = api
            .call(
                Method::GET,
                &format!("/api/verifications/{}/keystrokes", public_id),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(replay["events"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_routes_and_tokens() {
        let api = api();
        let (status, _) = api.call(Method::GET, "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = api.call(Method::DELETE, "/api/posts", None, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = api.call(Method::GET, "/api/documents", Some("sk_forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, missing) = api.call(Method::GET, "/api/posts/unknown", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["error"], response::NOT_FOUND_MESSAGE);

        let (status, _) = api.call(Method::GET, "/api/posts?page=0", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
