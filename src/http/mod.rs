//! HTTP intake surface.
//!
//! Thin presentation layer in front of the pipeline: accepts SDK event
//! batches, enriches them with producer-derived context, and hands them to
//! the collector. Also exposes health/readiness probes, the JSON stats
//! snapshot, and the Prometheus text endpoint.
//!
//! Intake always answers `202 Accepted` once the body parses; whether an
//! event survives backpressure is visible only through the stats surface.

use axum::Json;
use axum::Router;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

use crate::collector::BatchCollector;
use crate::event::{ClientContext, EnrichedEvent, EventBatch, ServiceMetric};
use crate::storage::EventStore;

/// Shared state for the intake router.
pub struct AppState {
    pub collector: Arc<BatchCollector>,
    pub store: Arc<dyn EventStore>,
    pub origins: AllowedOrigins,
    pub prometheus: Option<PrometheusHandle>,
}

/// Origin allow-list for browser producers.
#[derive(Debug, Clone)]
pub struct AllowedOrigins {
    allow_all: bool,
    origins: HashSet<String>,
}

impl AllowedOrigins {
    pub fn new(origins: &[String]) -> Self {
        let allow_all = origins.iter().any(|o| o == "*");
        Self {
            allow_all,
            origins: origins.iter().cloned().collect(),
        }
    }

    /// The `Access-Control-Allow-Origin` value to echo for this request,
    /// if the origin is permitted.
    fn allow_origin(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        if self.allow_all {
            return Some(HeaderValue::from_static("*"));
        }
        let origin = headers.get(header::ORIGIN)?;
        let value = origin.to_str().ok()?;
        if self.origins.contains(value) {
            Some(origin.clone())
        } else {
            None
        }
    }
}

/// Build the intake router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/collect", post(collect).options(collect_preflight))
        .route("/collect/api", post(collect_service))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// `POST /collect`: accept a batch of raw SDK events.
async fn collect(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(batch): Json<EventBatch>,
) -> Response {
    let allow_origin = state.origins.allow_origin(&headers);

    if batch.events.is_empty() {
        return accepted(allow_origin);
    }

    let client = ClientContext {
        ip: client_ip(&headers, peer),
        user_agent: header_str(&headers, header::USER_AGENT),
        country: resolve_country(),
    };

    let now = Utc::now();
    let enriched: Vec<EnrichedEvent> = batch
        .events
        .into_iter()
        .map(|event| EnrichedEvent::enrich(event, &client, now))
        .collect();

    debug!(count = enriched.len(), ip = %client.ip, "events accepted");
    state.collector.push_batch(enriched);

    accepted(allow_origin)
}

/// `OPTIONS /collect`: CORS preflight for browser producers.
async fn collect_preflight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let response_headers = response.headers_mut();
    if let Some(origin) = state.origins.allow_origin(&headers) {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

/// `POST /collect/api`: backend service metrics, written directly.
async fn collect_service(
    State(state): State<Arc<AppState>>,
    Json(metrics): Json<Vec<ServiceMetric>>,
) -> Response {
    match state.store.write_service_metrics(&metrics).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({"status": "ok"}))).into_response(),
        Err(e) => {
            error!(count = metrics.len(), error = %e, "service metrics write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error"})),
            )
                .into_response()
        }
    }
}

/// `GET /health`: process liveness.
async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

/// `GET /ready`: storage connectivity.
async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => {
            error!("readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "error", "message": "database unavailable"})),
            )
                .into_response()
        }
    }
}

/// `GET /stats`: the collector's JSON statistics snapshot.
async fn stats(State(state): State<Arc<AppState>>) -> Response {
    Json(state.collector.stats()).into_response()
}

/// `GET /metrics`: Prometheus text format.
async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn accepted(allow_origin: Option<HeaderValue>) -> Response {
    let mut response =
        (StatusCode::ACCEPTED, Json(json!({"status": "ok"}))).into_response();
    if let Some(origin) = allow_origin {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response
}

/// Resolve the client IP: proxy headers first, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return value.to_string();
        }
    }

    peer.ip().to_string()
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Resolve the producer's country.
// TODO: wire up a MaxMind GeoIP lookup; until then the stored origin is empty.
fn resolve_country() -> String {
    String::new()
}
