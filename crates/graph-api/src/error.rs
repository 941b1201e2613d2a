use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure. The request URL is stripped.
    #[error("http error: {0}")]
    Http(reqwest::Error),
    #[error("api error {status}: {message} (code {code:?})")]
    Api {
        status: u16,
        message: String,
        code: Option<i64>,
    },
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl ApiError {
    /// Platform error code as a string, used when recording failed replies.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Api { code: Some(code), .. } => Some(code.to_string()),
            Self::Api { status, .. } => Some(status.to_string()),
            Self::Timeout(_) => Some("timeout".to_string()),
            Self::Http(e) if e.is_timeout() => Some("timeout".to_string()),
            _ => None,
        }
    }

    /// Human readable message without the error-kind prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
