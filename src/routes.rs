use std::{collections::HashSet, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, Method,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use tokio::{sync::Semaphore, time::timeout};
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::{Config, non_empty},
    error::{ApiError, FetchError},
    extractor::Extractor,
    ladder::DownloadLadder,
    models::{DownloadParams, InfoParams, InfoResponse, MediaFormat},
    sanitize::{attachment_filename, build_content_disposition},
};

const SERVICE_NAME: &str = "Media Fetch Server";
const URL_REQUIRED: &str = "URL parameter is required";

#[derive(Clone)]
pub struct AppState {
    extractor: Arc<dyn Extractor>,
    ladder: DownloadLadder,
    download_semaphore: Arc<Semaphore>,
    request_timeout: Duration,
    title_max_chars: usize,
}

impl AppState {
    pub fn new(config: &Config, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            ladder: DownloadLadder::new(Arc::clone(&extractor), config.temp_dir.clone()),
            extractor,
            download_semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            request_timeout: config.request_timeout,
            title_max_chars: config.title_max_chars,
        }
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/info", get(video_info))
        .route("/api/download", get(download))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/health",
            "info": "GET /api/info?url=<video url>",
            "download": "GET /api/download?url=<video url>&format=<mp4|mp3>",
        },
    }))
}

async fn health() -> Json<serde_json::Value> {
    let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    Json(serde_json::json!({ "status": "healthy", "timestamp": timestamp }))
}

/// Backend failures are reported as `200 {"success": false}`; only a missing
/// `url` is a client error here.
async fn video_info(
    State(state): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<Json<InfoResponse>, ApiError> {
    let url = required_url(params.url.as_deref())?;
    info!("Getting info for URL: {url}");

    let result = match timeout(state.request_timeout, state.extractor.fetch_info(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::TimedOut(state.request_timeout.as_secs())),
    };

    match result {
        Ok(info) => Ok(Json(InfoResponse::found(info))),
        Err(error) => {
            error!("Error getting video info for {url}: {error}");
            Ok(Json(InfoResponse::failed(error.to_string())))
        }
    }
}

async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let url = required_url(params.url.as_deref())?;
    let format = match params.format.as_deref() {
        None => MediaFormat::default(),
        Some(value) => value.parse::<MediaFormat>().map_err(ApiError::bad_request)?,
    };

    let _download_permit = state
        .download_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::internal("Could not reserve download capacity."))?;

    info!("Downloading {format} for URL: {url}");
    // Each rung is already bounded by the extractor; this caps the whole ladder.
    let ladder_timeout = state.request_timeout.saturating_mul(2);
    let media = match timeout(ladder_timeout, state.ladder.download(url, format)).await {
        Ok(result) => result?,
        Err(_) => return Err(FetchError::TimedOut(ladder_timeout.as_secs()).into()),
    };

    let file = tokio::fs::File::open(&media.path).await.map_err(|error| {
        error!("Error opening {:?} for transfer: {error}", media.path);
        ApiError::file_transfer(error)
    })?;
    let metadata = file.metadata().await.map_err(|error| {
        error!("Error reading {:?} for transfer: {error}", media.path);
        ApiError::file_transfer(error)
    })?;

    let filename = attachment_filename(
        &media.title,
        media.format.extension(),
        state.title_max_chars,
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(media.format.content_type()),
    );
    headers.insert(
        CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::file_transfer("invalid content length"))?,
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&filename))
            .map_err(|_| ApiError::file_transfer("invalid attachment filename"))?,
    );

    // The open handle keeps the bytes reachable even if the sweeper unlinks
    // the path mid-transfer.
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

fn required_url(value: Option<&str>) -> Result<&str, ApiError> {
    value
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request(URL_REQUIRED))
}

/// Permissive when no origins are configured, otherwise an exact allow-list.
pub fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, String> {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([CONTENT_DISPOSITION, CONTENT_LENGTH]);

    if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set; accepting requests from any origin.");
        return Ok(base.allow_origin(Any));
    }

    let normalized_origins = configured
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://domain.com"
                )
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        normalized_origins.len(),
        normalized_origins
    );

    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let normalized = origin.to_str().ok().and_then(normalize_origin);
        let allowed = normalized
            .as_ref()
            .is_some_and(|value| allowed_origins.contains(value));
        debug!(
            "CORS origin check raw={:?} normalized={:?} allowed={}",
            origin, normalized, allowed
        );
        allowed
    });

    Ok(base.allow_origin(allow_origin))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
