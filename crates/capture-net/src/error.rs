use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 401/403: the configured credentials were refused. Retried, since a
    /// fixed token makes the same request succeed.
    #[error("Remote refused credentials (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Request rejected by remote: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Local file error: {0}")]
    LocalFile(#[from] std::io::Error),
}

impl NetError {
    /// Errors that retrying the same request cannot fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            NetError::DocumentNotFound(_) | NetError::Rejected(_) | NetError::InvalidUrl(_) => {
                true
            }
            NetError::LocalFile(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, NetError::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(NetError::DocumentNotFound("doc1".into()).is_permanent());
        assert!(NetError::Rejected("HTTP 422".into()).is_permanent());
        assert!(NetError::LocalFile(std::io::ErrorKind::NotFound.into()).is_permanent());

        assert!(!NetError::Timeout(30_000).is_permanent());
        assert!(!NetError::Status { status: 503, body: String::new() }.is_permanent());
        assert!(!NetError::LocalFile(std::io::ErrorKind::PermissionDenied.into()).is_permanent());

        let refused = NetError::Unauthorized {
            status: 401,
            body: String::new(),
        };
        assert!(!refused.is_permanent());
        assert!(refused.is_unauthorized());
    }
}
