use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Rejected by remote: {0}")]
    Rejected(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Sync endpoint not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 409 | 422 => RemoteError::Rejected(truncated),
            401 | 403 => RemoteError::Unauthorized,
            404 => RemoteError::NotFound(truncated),
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::ServerError(truncated),
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            RemoteError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad payload"),
            RemoteError::Rejected(body) if body == "bad payload"
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            RemoteError::RateLimited
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            RemoteError::ServerError(_)
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::IM_A_TEAPOT, ""),
            RemoteError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "ओ".repeat(400);
        let RemoteError::ServerError(message) =
            RemoteError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body)
        else {
            panic!("expected server error");
        };
        assert!(message.contains("truncated, 1200 total bytes"));
        assert!(message.len() < body.len());
    }
}
