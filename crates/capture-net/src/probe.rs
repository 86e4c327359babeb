//! Connectivity probes.
//!
//! A probe answers one question, "can we reach the backend right now", and
//! never fails: every error is an answer of `false`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use capture_shared::constants::PROBE_TIMEOUT_SECS;

#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Lightweight endpoint to GET.
    pub url: String,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "https://clients3.google.com/generate_204".to_string(),
            timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }
}

/// Probe that issues a single GET and looks only at whether a response
/// came back in time.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> bool {
        let request = self.client.get(&self.config.url).send();
        match tokio::time::timeout(self.config.timeout, request).await {
            // Any answer short of a 5xx outage means the network path works.
            Ok(Ok(resp)) => {
                let online = !resp.status().is_server_error();
                debug!(status = resp.status().as_u16(), online, "Probe answered");
                online
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(timeout_ms = self.config.timeout.as_millis() as u64, "Probe timed out");
                false
            }
        }
    }
}
