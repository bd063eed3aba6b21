use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited by origin")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Origin unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success status into an error. `url` names the resource so
    /// install failures say which shell entry broke.
    pub fn from_status(status: u16, url: &str, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body);
        let truncated = Self::truncate_body(&body);
        match status {
            403 => FetchError::AccessDenied(url.to_string()),
            404 => FetchError::NotFound(url.to_string()),
            429 => FetchError::RateLimited,
            500..=599 => FetchError::ServerError(format!("{} returned {}: {}", url, status, truncated)),
            _ => FetchError::InvalidResponse(format!("{} returned {}: {}", url, status, truncated)),
        }
    }

    /// True when the request never produced a response.
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::NetworkError(_) | FetchError::Unreachable(_))
    }
}
