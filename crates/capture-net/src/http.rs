use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, Url};

use crate::error::NetError;

/// Append path segments to a base URL, escaping each one.
pub(crate) fn join_segments(base: &str, segments: &[&str]) -> Result<Url, NetError> {
    let mut url = Url::parse(base).map_err(|e| NetError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| NetError::InvalidUrl(format!("{base}: cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn with_auth(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

/// Send with a hard deadline on top of the client's own timeout.
pub(crate) async fn send(req: RequestBuilder, timeout: Duration) -> Result<Response, NetError> {
    match tokio::time::timeout(timeout, req.send()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(NetError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Map non-success statuses onto the error taxonomy.
///
/// 404 means the owning document is gone. 401/403 are credential problems,
/// fixed by rotating the token rather than by dropping the capture. 408/429
/// and 5xx are worth retrying; any other 4xx is a rejection that retrying
/// will not change.
pub(crate) async fn check_status(resp: Response, document_id: &str) -> Result<Response, NetError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(NetError::DocumentNotFound(document_id.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NetError::Unauthorized {
            status: status.as_u16(),
            body,
        }),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Err(NetError::Status {
            status: status.as_u16(),
            body,
        }),
        s if s.is_client_error() => Err(NetError::Rejected(format!("HTTP {}: {}", s.as_u16(), body))),
        s => Err(NetError::Status {
            status: s.as_u16(),
            body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_segments_escapes() {
        let url = join_segments("https://storage.example/api/", &["captures", "doc 1/2", "0"]).unwrap();
        assert_eq!(url.as_str(), "https://storage.example/api/captures/doc%201%2F2/0");
    }

    #[test]
    fn test_join_segments_invalid_base() {
        assert!(matches!(join_segments("not a url", &["x"]), Err(NetError::InvalidUrl(_))));
    }
}
