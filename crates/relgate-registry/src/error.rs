//! Error types for relgate-registry

use relgate_state::StorageError;
use thiserror::Error;

/// Errors that can occur while talking to a package index
#[derive(Error, Debug)]
pub enum RegistryError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Index answered with an unexpected status
    #[error("unexpected index response {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Upload command is empty or could not be started
    #[error("upload command failed: {0}")]
    CommandFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Http(err.to_string())
    }
}

impl From<RegistryError> for StorageError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnexpectedStatus { status, url } if status == 401 || status == 403 => {
                StorageError::Unauthorized {
                    reason: format!("{} returned {}", url, status),
                }
            }
            RegistryError::Json(e) => StorageError::Serialization(e.to_string()),
            other => StorageError::Transport {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_status_maps_to_unauthorized() {
        let err: StorageError = RegistryError::UnexpectedStatus {
            status: 403,
            url: "https://pypi.org/pypi/pkg/1.0.0/json".to_string(),
        }
        .into();
        assert!(matches!(err, StorageError::Unauthorized { .. }));
    }

    #[test]
    fn test_http_error_maps_to_transport() {
        let err: StorageError = RegistryError::Http("connection refused".to_string()).into();
        assert!(matches!(err, StorageError::Transport { .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}
