//! Telemetry event model.
//!
//! Producers submit [`RawEvent`]s; the intake layer attaches server-derived
//! context exactly once to build an [`EnrichedEvent`], which is immutable
//! from that point on. Timestamps from untrusted clients are normalized
//! against server time before an event enters the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum tolerated clock skew in seconds between a producer timestamp
/// and server time. Anything beyond this is replaced with server time.
pub const MAX_CLOCK_SKEW_SECS: i64 = 3600;

/// Batch payload as submitted by the browser SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<RawEvent>,
}

/// A single producer-supplied observation.
///
/// Numeric payload fields are event-type specific; absent fields stay
/// `None` all the way into storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Producer clock time; may be absent or implausible.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    pub session_id: String,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub country: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub page_path: String,

    // Web Vitals
    #[serde(default)]
    pub lcp_ms: Option<f64>,
    #[serde(default)]
    pub fid_ms: Option<f64>,
    #[serde(default)]
    pub cls: Option<f64>,
    #[serde(default)]
    pub ttfb_ms: Option<f64>,
    #[serde(default)]
    pub fcp_ms: Option<f64>,
    #[serde(default)]
    pub inp_ms: Option<f64>,

    // Custom metrics
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub metric_value: Option<f64>,

    /// Free-form context blob, stored as JSONB.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Context derived from the producer's connection, attached server-side.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip: String,
    pub user_agent: String,
    pub country: String,
}

/// A [`RawEvent`] plus server-derived context and a corrected timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: RawEvent,
    /// Resolved geographic origin (empty when resolution is unavailable).
    pub origin_country: String,
    pub user_agent: String,
    pub ip: String,
}

impl EnrichedEvent {
    /// Enrich a raw event with client context and a normalized timestamp.
    ///
    /// The producer timestamp is kept only if it is present and within
    /// [`MAX_CLOCK_SKEW_SECS`] of server time; otherwise it is replaced
    /// with `now`. A missing event country falls back to the resolved
    /// origin.
    pub fn enrich(mut event: RawEvent, client: &ClientContext, now: DateTime<Utc>) -> Self {
        event.time = Some(normalize_time(event.time, now));

        if event.country.as_deref().is_none_or(str::is_empty) {
            event.country = Some(client.country.clone());
        }

        Self {
            event,
            origin_country: client.country.clone(),
            user_agent: client.user_agent.clone(),
            ip: client.ip.clone(),
        }
    }

    /// The corrected timestamp. Always present after enrichment.
    pub fn time(&self) -> DateTime<Utc> {
        self.event.time.unwrap_or_default()
    }
}

/// Clamp an untrusted producer timestamp to server time when missing or
/// outside the skew tolerance.
fn normalize_time(time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match time {
        Some(t) if (now - t).num_seconds().abs() <= MAX_CLOCK_SKEW_SECS => t,
        _ => now,
    }
}

/// A backend service observation, written directly (not batched).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetric {
    pub time: DateTime<Utc>,
    pub service_name: String,
    pub endpoint: String,
    pub method: String,
    pub duration_ms: f64,
    pub status_code: i32,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub request_size: Option<i32>,
    #[serde(default)]
    pub response_size: Option<i32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
