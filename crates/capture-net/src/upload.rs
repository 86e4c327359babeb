//! Upload of queued captures to remote object storage.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use capture_shared::constants::CALL_TIMEOUT_SECS;
use capture_shared::FieldType;

use crate::error::NetError;
use crate::http::{check_status, join_segments, send, with_auth};

#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Upload the image at `local_uri` for the given field and return its
    /// public URL.
    async fn upload(
        &self,
        local_uri: &str,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
    ) -> Result<String, NetError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// Uploads raw JPEG bytes with
/// `POST {storage_url}/captures/{document_id}/{field_type}/{field_index}`
/// and expects `{ "url": "..." }` back.
#[derive(Debug, Clone)]
pub struct HttpUploadClient {
    client: reqwest::Client,
    storage_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpUploadClient {
    pub fn new(storage_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            storage_url: storage_url.into(),
            auth_token,
            timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn upload(
        &self,
        local_uri: &str,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
    ) -> Result<String, NetError> {
        let path = local_uri.strip_prefix("file://").unwrap_or(local_uri);
        let data = tokio::fs::read(path).await?;
        let size = data.len();

        let index = field_index.to_string();
        let url = join_segments(
            &self.storage_url,
            &["captures", document_id, field_type.as_str(), &index],
        )?;

        let req = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(data);
        let resp = send(with_auth(req, self.auth_token.as_deref()), self.timeout).await?;
        let resp = check_status(resp, document_id).await?;

        let body: UploadResponse = resp
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(format!("upload response: {e}")))?;

        debug!(document_id, %field_type, field_index, size, url = %body.url, "Uploaded capture");
        Ok(body.url)
    }
}
