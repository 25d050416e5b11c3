use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures while locating and retrieving icon bytes.
///
/// The kinds are kept apart so a caller can decide on fallbacks, e.g. try the
/// conventional `/favicon.ico` after a declared icon could not be fetched.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL '{input}': {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("could not parse {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("no favicon found for {url}")]
    NotFound { url: String },

    #[error("{url} exceeds the {limit} byte size limit")]
    TooLarge { url: String, limit: usize },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl Error {
    /// True for the kinds that mean "nothing usable at this location" rather
    /// than a broken request.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Status { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }
}
