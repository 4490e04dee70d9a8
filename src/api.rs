//! HTTP surface. Every handler is a thin adapter: validate, call into the
//! download manager or the file layer, and translate errors into JSON.

use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{
        HeaderValue, Method, StatusCode, Uri,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    downloads::DownloadManager,
    extractor::{DownloadOptions, ExtractorError, VideoInfo},
    files::{DownloadFiles, FileError, GalleryEntry},
    progress::DownloadProgress,
    validate::{DownloadRequest, ValidationError},
};

pub const SERVICE_NAME: &str = "vidgrab";

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub downloads: DownloadManager,
    pub files: DownloadFiles,
    pub delete_delay: Duration,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::bad_request(err.body_text())
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::InvalidName(_) => Self::bad_request("Invalid filename"),
            FileError::NotFound(_) => Self::not_found("File not found"),
            FileError::Io(err) => Self::internal(err.to_string()),
        }
    }
}

/// A lookup the extractor could not complete is reported as a bad request,
/// the same as a URL it does not understand.
impl From<ExtractorError> for ApiError {
    fn from(err: ExtractorError) -> Self {
        match err {
            ExtractorError::Spawn { .. }
            | ExtractorError::Io(_)
            | ExtractorError::MetadataExit(_)
            | ExtractorError::Timeout(_)
            | ExtractorError::InvalidJson(_) => Self::bad_request(err.to_string()),
            ExtractorError::DownloadExit(_)
            | ExtractorError::NoOutput
            | ExtractorError::Cancelled => Self::internal(err.to_string()),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Envelope used by the download start and the mutation endpoints.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<String>,
}

impl DownloadResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok",
            message: message.into(),
            download_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub download_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub filename: Option<String>,
    #[serde(default, rename = "deleteAfter")]
    pub delete_after: bool,
}

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub files: Vec<GalleryEntry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos/info", post(video_info))
        .route("/api/download", post(start_download).get(serve_file))
        .route("/api/download/status", get(download_status))
        .route("/api/download/cleanup", post(cleanup_download))
        .route("/api/download/{filename}", delete(delete_file))
        .route("/api/gallery", get(gallery))
        .route("/api/health", get(health))
        .fallback(api_fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Allows the configured browser origins; unparseable entries are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();
    info!("CORS allow-list: {origins:?}");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([CONTENT_DISPOSITION])
}

async fn api_fallback(uri: Uri) -> ApiError {
    ApiError::not_found(format!("endpoint not found: {}", uri.path()))
}

async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Json<VideoInfo>> {
    let Json(request) = payload?;
    let url = request.validated_url()?;
    info!("fetching video info for {url}");
    let info = state.downloads.extractor().fetch_info(&url).await?;
    Ok(Json(info))
}

async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(err) => return download_rejected(err.body_text()),
    };
    let url = match request.validated_url() {
        Ok(url) => url,
        Err(err) => return download_rejected(err.to_string()),
    };

    let id = state.downloads.start(DownloadOptions {
        url,
        format: request.format,
        quality: request.quality().to_string(),
    });
    Json(DownloadResponse {
        status: "started",
        message: "Download started".to_string(),
        download_id: Some(id),
    })
    .into_response()
}

fn download_rejected(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(DownloadResponse {
            status: "error",
            message,
            download_id: None,
        }),
    )
        .into_response()
}

async fn download_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<DownloadProgress>> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("id is required"))?;
    state
        .downloads
        .status(id.trim())
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Download not found"))
}

async fn cleanup_download(
    State(state): State<AppState>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> ApiResult<Json<DownloadResponse>> {
    let Json(request) = payload?;
    let id = request.download_id.trim();
    if id.is_empty() {
        return Err(ApiError::bad_request("download_id is required"));
    }
    if !state.downloads.cleanup(id).await {
        return Err(ApiError::not_found("Download not found"));
    }
    Ok(Json(DownloadResponse::ok("Download cleaned up")))
}

async fn serve_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Response> {
    let name = query
        .filename
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("filename is required"))?;
    let (file, length) = state.files.open(&name).await?;
    let disposition = HeaderValue::from_str(&content_disposition(&name))
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, length)
        .header(CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|err| ApiError::internal(err.to_string()))?;

    info!("serving {name} ({length} bytes)");
    if query.delete_after {
        state.files.schedule_delete(&name, state.delete_delay);
    }
    Ok(response)
}

/// `attachment; filename="..."`, plus an RFC 5987 `filename*` when the name
/// is not plain ASCII.
fn content_disposition(name: &str) -> String {
    let plain = name
        .chars()
        .all(|ch| ch.is_ascii() && !ch.is_ascii_control() && ch != '"' && ch != '\\');
    if plain {
        return format!("attachment; filename=\"{name}\"");
    }

    let fallback: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii() && !ch.is_ascii_control() && ch != '"' && ch != '\\' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}

async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<DownloadResponse>> {
    state.files.delete(&filename).await?;
    Ok(Json(DownloadResponse::ok("File deleted successfully")))
}

async fn gallery(State(state): State<AppState>) -> ApiResult<Json<GalleryResponse>> {
    let files = state.files.list().await?;
    Ok(Json(GalleryResponse { files }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "UP",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
