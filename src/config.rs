//! # Configuration Management
//!
//! Loads application configuration from three layered sources:
//! built-in defaults, an optional `config.toml`, and environment variables
//! with an `APP_` prefix (plus the bare `HOST`/`PORT` overrides deployment
//! platforms set). The upstream credentials are expected to come from the
//! environment in any real deployment.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Connection settings for the upstream translation engine.
///
/// The two credential headers and the resource id are static per
/// deployment; the per-connection correlation id is generated at connect
/// time, not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// `wss://` endpoint of the translation engine.
    pub ws_url: String,
    pub app_key: String,
    pub access_key: String,
    pub resource_id: String,
}

/// Audio format parameters negotiated in the StartSession frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Container/format label for microphone audio sent upstream.
    pub source_format: String,
    pub source_rate: u32,
    pub source_bits: u32,
    pub source_channels: u32,
    /// Format label for synthesized audio received from upstream.
    pub target_format: String,
    pub target_rate: u32,
    /// Engine translation mode (speech-to-speech).
    pub mode: String,
}

/// Per-session behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cap on concurrently bridged sessions.
    pub max_concurrent_sessions: usize,
    /// How long a Finishing session waits for the upstream acknowledgement
    /// before it is forced Closed.
    pub finish_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            upstream: UpstreamConfig {
                ws_url: "wss://openspeech.bytedance.com/api/v4/ast/v2/translate".to_string(),
                app_key: String::new(),
                access_key: String::new(),
                resource_id: "volc.service_type.10053".to_string(),
            },
            audio: AudioConfig {
                source_format: "wav".to_string(),
                source_rate: 16_000,
                source_bits: 16,
                source_channels: 1,
                target_format: "ogg_opus".to_string(),
                target_rate: 24_000,
                mode: "s2s".to_string(),
            },
            session: SessionConfig {
                max_concurrent_sessions: 10,
                finish_grace_ms: 3_000,
            },
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        AppConfig::default().audio
    }
}

impl AppConfig {
    /// Load configuration: defaults, then `config.toml` (if present), then
    /// `APP_*` environment variables, then `HOST`/`PORT` overrides.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !self.upstream.ws_url.starts_with("ws://") && !self.upstream.ws_url.starts_with("wss://")
        {
            return Err(anyhow::anyhow!(
                "Upstream URL must be a ws:// or wss:// endpoint"
            ));
        }

        if self.audio.source_rate == 0 || self.audio.target_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rates must be greater than 0"));
        }

        if self.session.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!(
                "Max concurrent sessions must be greater than 0"
            ));
        }

        if self.session.finish_grace_ms == 0 {
            return Err(anyhow::anyhow!("Finish grace period must be greater than 0"));
        }

        Ok(())
    }

    /// Finishing grace period as a [`Duration`].
    pub fn finish_grace(&self) -> Duration {
        Duration::from_millis(self.session.finish_grace_ms)
    }

    /// Whether upstream credentials are present. Sessions cannot start
    /// without them, but the HTTP surface still serves health/config.
    pub fn upstream_configured(&self) -> bool {
        !self.upstream.app_key.is_empty() && !self.upstream.access_key.is_empty()
    }

    /// Apply a partial update from a JSON body (runtime config endpoint).
    /// Only recognized fields are touched; the result is re-validated.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(upstream) = partial.get("upstream") {
            if let Some(url) = upstream.get("ws_url").and_then(|v| v.as_str()) {
                self.upstream.ws_url = url.to_string();
            }
            if let Some(resource) = upstream.get("resource_id").and_then(|v| v.as_str()) {
                self.upstream.resource_id = resource.to_string();
            }
        }

        if let Some(session) = partial.get("session") {
            if let Some(max) = session
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.session.max_concurrent_sessions = max as usize;
            }
            if let Some(grace) = session.get("finish_grace_ms").and_then(|v| v.as_u64()) {
                self.session.finish_grace_ms = grace;
            }
        }

        self.validate()?;
        Ok(())
    }
}
