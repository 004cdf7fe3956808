//! Error taxonomy for the synchronization layer.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never got a usable answer from the server
    #[error("Erreur réseau: {0}")]
    Network(String),

    /// The server answered `success: false`, or with an error status
    #[error("{0}")]
    Api(String),

    /// A newer request for the same category superseded this one
    #[error("Requête annulée")]
    Cancelled,

    /// Caller-supplied data failed a pre-submit check
    #[error("Données invalides: {0}")]
    Validation(String),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) => SyncError::Network(e.to_string()),
            ApiError::Transport(msg) => SyncError::Network(msg),
            ApiError::Rejected(msg) => SyncError::Api(msg),
            other => SyncError::Api(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
