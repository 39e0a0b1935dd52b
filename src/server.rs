//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/chat/{tenant}` | Answer a visitor message (rate-limited per client IP) |
//! | `POST`   | `/api/tenants/{tenant}/search` | Rank training chunks for a query |
//! | `GET`    | `/api/tenants/{tenant}/sources` | List training sources, newest first |
//! | `POST`   | `/api/tenants/{tenant}/sources/text` | Train on `{ title?, text }` |
//! | `POST`   | `/api/tenants/{tenant}/sources/qa` | Train on a Q&A file `{ title?, content }` |
//! | `POST`   | `/api/tenants/{tenant}/sources/url` | Crawl and train on `{ url }` |
//! | `POST`   | `/api/tenants/{tenant}/sources/file` | Train on the raw request body (`x-filename` header) |
//! | `DELETE` | `/api/tenants/{tenant}/sources/{id}` | Delete one source |
//! | `DELETE` | `/api/tenants/{tenant}` | Delete all tenant data |
//! | `POST`   | `/api/tags` | Classify `{ text }` into `{ tags }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message is empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `rate_limited` (429, with a
//! `Retry-After` header), `upstream_error` (502), `internal` (500).
//!
//! Chat is rate-limited per peer IP. Behind a reverse proxy every visitor
//! shares the proxy's address; set `[server].trust_forwarded_for = true` to
//! key on the first `X-Forwarded-For` entry instead. Only do that when the
//! proxy overwrites the header, since clients can otherwise pick their own key.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use ragbot_core::tags::classify_tags;
use ragbot_core::ApiError;

use crate::chat::{self, ChatRequest};
use crate::config::ServerConfig;
use crate::ingest::{self, FileUpload};
use crate::services::Services;

type AppState = Arc<Services>;

/// Build the router with CORS, request tracing, and the body size limit.
pub fn router(svc: AppState) -> Router {
    let cors = cors_layer(&svc.config.server);
    let body_limit = DefaultBodyLimit::max(svc.config.server.max_body_bytes);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/chat/{tenant}", post(handle_chat))
        .route("/api/tenants/{tenant}", delete(handle_purge_tenant))
        .route("/api/tenants/{tenant}/search", post(handle_search))
        .route("/api/tenants/{tenant}/sources", get(handle_list_sources))
        .route("/api/tenants/{tenant}/sources/text", post(handle_train_text))
        .route("/api/tenants/{tenant}/sources/qa", post(handle_train_qa))
        .route("/api/tenants/{tenant}/sources/url", post(handle_train_url))
        .route("/api/tenants/{tenant}/sources/file", post(handle_train_file))
        .route("/api/tenants/{tenant}/sources/{id}", delete(handle_delete_source))
        .route("/api/tags", post(handle_tags))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(svc)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

/// Serve on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, svc: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "ragbot listening on http://{}", addr);
    axum::serve(
        listener,
        router(svc).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("server stopped");
    Ok(())
}

/// Bind `[server].bind` and serve.
pub async fn run_server(svc: AppState) -> anyhow::Result<()> {
    let bind = svc.config.server.bind.clone();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    serve(listener, svc).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// [`ApiError`] as an HTTP response.
struct AppError(ApiError);

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(ApiError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            ApiError::Internal(e) => {
                error!(error = %format!("{:#}", e), "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self.0 {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

type HandlerResult<T> = Result<T, AppError>;

// ============ Handlers ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_chat(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> HandlerResult<Json<chat::ChatAnswer>> {
    let Json(request) = payload?;
    let client_key = client_key(&headers, addr, svc.config.server.trust_forwarded_for);
    Ok(Json(chat::answer(&svc, &tenant, &client_key, &request).await?))
}

/// Rate-limit key for a chat request: the peer IP, or the first
/// `X-Forwarded-For` address when the server runs behind a trusted proxy.
fn client_key(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default)]
    top_n: Option<usize>,
}

async fn handle_search(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
    payload: Result<Json<SearchBody>, JsonRejection>,
) -> HandlerResult<Json<serde_json::Value>> {
    let Json(body) = payload?;
    let results = chat::search(&svc, &tenant, &body.query, body.top_n).await?;
    Ok(Json(json!({ "results": results })))
}

async fn handle_list_sources(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
) -> HandlerResult<Json<serde_json::Value>> {
    let sources = ingest::list_sources(&svc, &tenant).await?;
    Ok(Json(json!({ "sources": sources })))
}

#[derive(Deserialize)]
struct TextBody {
    #[serde(default)]
    title: Option<String>,
    text: String,
}

async fn handle_train_text(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
    payload: Result<Json<TextBody>, JsonRejection>,
) -> HandlerResult<impl IntoResponse> {
    let Json(body) = payload?;
    let source = ingest::train_text(&svc, &tenant, body.title.as_deref(), &body.text).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

#[derive(Deserialize)]
struct QaBody {
    #[serde(default)]
    title: Option<String>,
    content: String,
}

async fn handle_train_qa(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
    payload: Result<Json<QaBody>, JsonRejection>,
) -> HandlerResult<impl IntoResponse> {
    let Json(body) = payload?;
    let source = ingest::train_qa(&svc, &tenant, body.title.as_deref(), &body.content).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

#[derive(Deserialize)]
struct UrlBody {
    url: String,
}

async fn handle_train_url(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
    payload: Result<Json<UrlBody>, JsonRejection>,
) -> HandlerResult<impl IntoResponse> {
    let Json(body) = payload?;
    let source = ingest::train_url(&svc, &tenant, &body.url).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

async fn handle_train_file(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult<impl IntoResponse> {
    let filename = headers
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation("missing x-filename header".to_string()))?
        .to_string();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let upload = FileUpload {
        filename,
        bytes: body.to_vec(),
        content_type,
    };
    let source = ingest::train_file(&svc, &tenant, &upload).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

async fn handle_delete_source(
    State(svc): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
) -> HandlerResult<Json<serde_json::Value>> {
    ingest::delete_source(&svc, &tenant, &id).await?;
    Ok(Json(json!({ "deleted": id })))
}

async fn handle_purge_tenant(
    State(svc): State<AppState>,
    Path(tenant): Path<String>,
) -> HandlerResult<Json<serde_json::Value>> {
    let removed = ingest::purge_tenant(&svc, &tenant).await?;
    Ok(Json(json!({ "deleted_sources": removed })))
}

#[derive(Deserialize)]
struct TagsBody {
    text: String,
}

async fn handle_tags(
    State(svc): State<AppState>,
    payload: Result<Json<TagsBody>, JsonRejection>,
) -> HandlerResult<Json<serde_json::Value>> {
    let Json(body) = payload?;
    if body.text.trim().is_empty() {
        return Err(ApiError::Validation("text is empty".to_string()).into());
    }
    let tags = classify_tags(&*svc.completer, &body.text).await;
    Ok(Json(json!({ "tags": tags })))
}
