use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited by remote API")]
    RateLimited,

    #[error("Empty response body")]
    EmptyBody,

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Serializable summary of a [`FetchError`], carried in batch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Http,
    RateLimited,
    EmptyBody,
    Api,
    Network,
    InvalidResponse,
    Exhausted,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
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

    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => FetchError::RateLimited,
            _ => FetchError::Status {
                status,
                body: Self::truncate_body(body),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Status { .. } => ErrorKind::Http,
            FetchError::RateLimited => ErrorKind::RateLimited,
            FetchError::EmptyBody => ErrorKind::EmptyBody,
            FetchError::Api(_) => ErrorKind::Api,
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            FetchError::Exhausted { .. } => ErrorKind::Exhausted,
        }
    }

    /// The error of the final attempt, looking through [`FetchError::Exhausted`].
    pub fn root_cause(&self) -> &FetchError {
        match self {
            FetchError::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}
