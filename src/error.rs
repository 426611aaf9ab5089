use thiserror::Error;

/// Errors raised while talking to the blog backend or loading settings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlogError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status code.
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// The response body did not match the expected shape.
    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BlogError {
    /// Message shown in place of a query's normal view.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Config(_) => "The reader is misconfigured.",
            _ => "Something went wrong",
        }
    }

    /// Transport failures, throttling and server-side errors may succeed on a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for BlogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<config::ConfigError> for BlogError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BlogError>;
