//! Error types for object-storage calls

/// Errors returned by object-storage calls
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 401: the auth token expired or was revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 404: the entity vanished between listing and fetch
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid listing from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StorageError {
    /// Map a non-success status to an error
    pub(crate) fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        match status.as_u16() {
            401 => Self::Unauthorized(url.to_string()),
            404 => Self::NotFound(url.to_string()),
            code => Self::Status {
                status: code,
                url: url.to_string(),
            },
        }
    }
}
