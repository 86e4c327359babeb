//! Writes an uploaded image URL back into its structured document.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use capture_shared::constants::CALL_TIMEOUT_SECS;
use capture_shared::FieldType;

use crate::error::NetError;
use crate::http::{check_status, join_segments, send, with_auth};

#[async_trait]
pub trait FieldUpdater: Send + Sync {
    /// Set `content.<field_type>[field_index].imageUrl` of the document.
    ///
    /// Fails with [`NetError::DocumentNotFound`] when the document or the
    /// field entry no longer exists.
    async fn update_field(
        &self,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
        url: &str,
    ) -> Result<(), NetError>;
}

/// `PATCH {documents_url}/documents/{id}/fields/{field_type}/{index}`
/// with `{ "imageUrl": url }`.
#[derive(Debug, Clone)]
pub struct HttpFieldUpdater {
    client: reqwest::Client,
    documents_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpFieldUpdater {
    pub fn new(documents_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            documents_url: documents_url.into(),
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
impl FieldUpdater for HttpFieldUpdater {
    async fn update_field(
        &self,
        document_id: &str,
        field_type: FieldType,
        field_index: usize,
        url: &str,
    ) -> Result<(), NetError> {
        let index = field_index.to_string();
        let endpoint = join_segments(
            &self.documents_url,
            &["documents", document_id, "fields", field_type.as_str(), &index],
        )?;

        let req = self
            .client
            .patch(endpoint)
            .json(&serde_json::json!({ "imageUrl": url }));
        let resp = send(with_auth(req, self.auth_token.as_deref()), self.timeout).await?;
        check_status(resp, document_id).await?;

        debug!(document_id, %field_type, field_index, "Updated document field");
        Ok(())
    }
}
