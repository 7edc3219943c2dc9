use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Miniflux API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Bad request when creating feed: {0}")]
    BadRequest(String),

    #[error("Feed URL is not accessible: {0}")]
    FeedNotAccessible(String),

    #[error("Feed already exists but could not be found: {0}")]
    FeedNotLocated(String),

    #[error("Telegram error in {method}: {message}")]
    Telegram { method: String, message: String },

    #[error("FloodWait in {method}: {seconds}s")]
    FloodWait { method: String, seconds: u64 },

    #[error("Title pattern error: {0}")]
    Pattern(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Interrupted by user")]
    Interrupted,
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

impl Error {
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Error::HttpError(_) | Error::Timeout(_) | Error::Io(_) | Error::FloodWait { .. }
        ) || matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Error::Config(_) => "CONFIG",
            Error::HttpError(_) => "HTTP_ERROR",
            Error::Api { .. } => "API_ERROR",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::FeedNotAccessible(_) => "FEED_NOT_ACCESSIBLE",
            Error::FeedNotLocated(_) => "FEED_NOT_LOCATED",
            Error::Telegram { .. } => "TELEGRAM",
            Error::FloodWait { .. } => "FLOOD_WAIT",
            Error::Pattern(_) => "PATTERN",
            Error::Timeout(_) => "TIMEOUT",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Interrupted => "INTERRUPTED",
        }
    }

    /// Process exit code for an error that reaches the command line.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigNotFound(_) => 2,
            Error::Config(_) => 3,
            Error::Interrupted => 130,
            Error::Telegram { .. } | Error::FloodWait { .. } | Error::HttpError(_) | Error::Timeout(_) => 5,
            _ => 4,
        }
    }
}
