//! Agent configuration loaded from environment variables.
//!
//! Every setting has a default so the agent starts with zero
//! configuration on a development machine.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use capture_net::ProbeConfig;
use capture_shared::constants::{
    CALL_TIMEOUT_SECS, DEFAULT_HTTP_PORT, DRAIN_DEADLINE_SECS, JPEG_QUALITY, MAX_ATTEMPTS,
    MAX_IMAGE_EDGE, POLL_INTERVAL_SECS, PROBE_TIMEOUT_SECS,
};
use capture_store::ImageConfig;
use capture_sync::SyncConfig;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Local address of the HTTP API the UI talks to.
    /// Env: `HTTP_ADDR`
    /// Default: `127.0.0.1:8765`
    pub http_addr: SocketAddr,

    /// Queue file. `None` means the platform data directory.
    /// Env: `QUEUE_PATH`
    pub queue_path: Option<PathBuf>,

    /// Directory for compressed captures. `None` means `captures/` in the
    /// platform data directory.
    /// Env: `CAPTURE_DIR`
    pub capture_dir: Option<PathBuf>,

    /// Base URL of the object storage endpoint.
    /// Env: `STORAGE_URL`
    pub storage_url: String,

    /// Base URL of the document store.
    /// Env: `DOCUMENTS_URL`
    pub documents_url: String,

    /// Env: `PROBE_URL`
    pub probe_url: String,

    /// Env: `PROBE_TIMEOUT_SECS`
    pub probe_timeout: Duration,

    /// Env: `POLL_INTERVAL_SECS`
    pub poll_interval: Duration,

    /// Limit on each upload and each field update.
    /// Env: `CALL_TIMEOUT_SECS`
    pub call_timeout: Duration,

    /// Env: `DRAIN_DEADLINE_SECS`
    pub drain_deadline: Duration,

    /// Env: `MAX_ATTEMPTS`
    pub max_attempts: u32,

    /// Env: `MAX_IMAGE_EDGE`
    pub max_image_edge: u32,

    /// Bearer token sent to the storage and document endpoints.
    /// Env: `AUTH_TOKEN`
    /// Default: none.
    pub auth_token: Option<String>,

    /// Browser origins allowed to call the local API, comma-separated.
    /// Env: `ALLOWED_ORIGINS`
    /// Default: none, so cross-origin browser calls are refused.
    pub allowed_origins: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], DEFAULT_HTTP_PORT).into(),
            queue_path: None,
            capture_dir: None,
            storage_url: "http://127.0.0.1:9000".to_string(),
            documents_url: "http://127.0.0.1:9001".to_string(),
            probe_url: ProbeConfig::default().url,
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            call_timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
            drain_deadline: Duration::from_secs(DRAIN_DEADLINE_SECS),
            max_attempts: MAX_ATTEMPTS,
            max_image_edge: MAX_IMAGE_EDGE,
            auth_token: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.http_addr = parse_or(&lookup, "HTTP_ADDR", config.http_addr);

        if let Some(path) = non_empty(&lookup, "QUEUE_PATH") {
            config.queue_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty(&lookup, "CAPTURE_DIR") {
            config.capture_dir = Some(PathBuf::from(path));
        }
        if let Some(url) = non_empty(&lookup, "STORAGE_URL") {
            config.storage_url = url;
        }
        if let Some(url) = non_empty(&lookup, "DOCUMENTS_URL") {
            config.documents_url = url;
        }
        if let Some(url) = non_empty(&lookup, "PROBE_URL") {
            config.probe_url = url;
        }

        config.probe_timeout = secs_or(&lookup, "PROBE_TIMEOUT_SECS", config.probe_timeout);
        config.poll_interval = secs_or(&lookup, "POLL_INTERVAL_SECS", config.poll_interval);
        config.call_timeout = secs_or(&lookup, "CALL_TIMEOUT_SECS", config.call_timeout);
        config.drain_deadline = secs_or(&lookup, "DRAIN_DEADLINE_SECS", config.drain_deadline);
        config.max_attempts = parse_or(&lookup, "MAX_ATTEMPTS", config.max_attempts);
        config.max_image_edge = parse_or(&lookup, "MAX_IMAGE_EDGE", config.max_image_edge);

        config.auth_token = non_empty(&lookup, "AUTH_TOKEN");

        if let Some(origins) = non_empty(&lookup, "ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            call_timeout: self.call_timeout,
            drain_deadline: self.drain_deadline,
            max_attempts: self.max_attempts,
            ..Default::default()
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            url: self.probe_url.clone(),
            timeout: self.probe_timeout,
        }
    }

    pub fn image_config(&self) -> ImageConfig {
        ImageConfig {
            max_edge: self.max_image_edge,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid setting, using default");
            default
        }
    }
}

/// Whole seconds; zero is rejected since every duration here bounds a wait.
fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    match parse_or(lookup, key, default.as_secs()) {
        0 => {
            tracing::warn!(key, "Zero duration not allowed, using default");
            default
        }
        secs => Duration::from_secs(secs),
    }
}
