// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::path::PathBuf;

/// Errors raised while loading or persisting the state document.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to read state document {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed state document {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize state document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write state document {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised while building the runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by a [`crate::transfer::TransferClient`].
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    #[error("Destination rejected transfer ({status:?}): {message}")]
    Destination {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Transfer timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// 4xx answers and unencodable payloads will fail the same way on retry.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            TransferError::Payload(_) | TransferError::Client(_) => true,
            TransferError::Destination { status, .. } => {
                status.is_some_and(|code| code.is_client_error())
            }
            TransferError::Timeout(_) | TransferError::Cancelled => false,
        }
    }
}

/// Errors that stop the watcher loop.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("host cannot be empty".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: host cannot be empty"
        );
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let error = TransferError::Destination {
            status: Some(StatusCode::FORBIDDEN),
            message: "denied".to_string(),
        };
        assert!(error.is_permanent());
    }

    #[test]
    fn test_server_and_network_errors_are_retryable() {
        let server = TransferError::Destination {
            status: Some(StatusCode::BAD_GATEWAY),
            message: "upstream".to_string(),
        };
        let network = TransferError::Destination {
            status: None,
            message: "connection reset".to_string(),
        };
        assert!(!server.is_permanent());
        assert!(!network.is_permanent());
        assert!(!TransferError::Timeout(std::time::Duration::from_secs(1)).is_permanent());
    }
}
