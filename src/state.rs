//! # Application State Management
//!
//! Shared state handed to every HTTP request handler and WebSocket
//! connection. Everything mutable sits behind `Arc<RwLock<T>>`: many
//! readers or one writer, cloned out of the lock so handlers never hold
//! it across an await.

use crate::config::AppConfig;
use crate::session::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (updatable at runtime).
    pub config: Arc<RwLock<AppConfig>>,

    /// Request and bridge metrics, updated on every request and session
    /// event.
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Live session snapshots for the HTTP lookup surface.
    pub sessions: SessionRegistry,

    /// When the server started. Never changes, so no lock.
    pub start_time: Instant,
}

/// Counters collected across all requests and bridged sessions.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// HTTP requests processed since start.
    pub request_count: u64,

    /// Requests that ended in a 4xx/5xx.
    pub error_count: u64,

    /// Currently bridged translation sessions.
    pub active_sessions: u32,

    /// Transcript segments delivered to clients.
    pub segments_sent: u64,

    /// Synthesized-audio fragments delivered to clients.
    pub audio_fragments_sent: u64,

    /// Malformed upstream frames dropped without killing a session.
    pub upstream_frames_dropped: u64,

    /// Client audio blocks dropped because a session was not active.
    pub audio_blocks_dropped: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path".
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let max_sessions = config.session.max_concurrent_sessions;
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            sessions: SessionRegistry::new(max_sessions),
            start_time: Instant::now(),
        }
    }

    /// A copy of the current configuration. Cloning releases the lock
    /// immediately; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    /// Underflow-checked: a session that never fully started may still
    /// report its end.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    pub fn record_segment_sent(&self) {
        self.metrics.write().unwrap().segments_sent += 1;
    }

    pub fn record_audio_fragment_sent(&self) {
        self.metrics.write().unwrap().audio_fragments_sent += 1;
    }

    pub fn record_upstream_frame_dropped(&self) {
        self.metrics.write().unwrap().upstream_frames_dropped += 1;
    }

    pub fn record_audio_block_dropped(&self) {
        self.metrics.write().unwrap().audio_blocks_dropped += 1;
    }

    /// Consistent copy of the metrics for the /metrics endpoint.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            segments_sent: metrics.segments_sent,
            audio_fragments_sent: metrics.audio_fragments_sent,
            upstream_frames_dropped: metrics.upstream_frames_dropped,
            audio_blocks_dropped: metrics.audio_blocks_dropped,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
