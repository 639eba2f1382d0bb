// ================================================================
// File: lnnfc-common/src/error.rs
// ================================================================

use std::time::Duration;
use thiserror::Error;

use crate::models::provisioning::LoadStage;

/// Failures reported by a tag transport driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Reader not connected")]
    NotConnected,

    #[error("Hardware fault: {0}")]
    Fault(String),

    #[error("Tag left the field")]
    TagLost,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input. Nothing was sent to the service or the reader.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or HTTP failure talking to the payment service.
    #[error("Remote service error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RemoteService {
        status: Option<u16>,
        message: String,
    },

    #[error("No NFC tag detected within {:.1}s", .0.as_secs_f64())]
    TagTimeout(Duration),

    #[error("Tag write failed: {0}")]
    TagWrite(String),

    #[error("Tag read failed: {0}")]
    TagRead(String),

    /// The write was accepted but reading it back gave something else.
    #[error("Tag verification failed: expected {expected}, found {}", .found.as_deref().unwrap_or("nothing"))]
    Verification {
        expected: String,
        found: Option<String>,
    },

    /// Bytes on the tag cannot even be parsed as a record container.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A workflow failed after creating a claim and deleting that claim failed too.
    #[error("{cause}; rollback also failed at stage {stage}: manual cleanup of claim {claim_id} required ({cleanup})")]
    RollbackFailed {
        claim_id: String,
        stage: LoadStage,
        cause: Box<Error>,
        cleanup: Box<Error>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    pub fn remote(message: impl Into<String>) -> Self {
        Error::RemoteService { status: None, message: message.into() }
    }

    pub fn remote_status(status: u16, message: impl Into<String>) -> Self {
        Error::RemoteService { status: Some(status), message: message.into() }
    }

    /// True for a 404 from the payment service, e.g. deleting an id twice.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RemoteService { status: Some(404), .. })
    }

    /// The claim that may still exist on the service because cleanup failed.
    pub fn stale_claim_id(&self) -> Option<&str> {
        match self {
            Error::RollbackFailed { claim_id, .. } => Some(claim_id),
            _ => None,
        }
    }

    /// The error that started a failed workflow, looking through a failed rollback.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteService {
            status: err.status().map(|s| s.as_u16()),
            // without_url keeps query strings out of logs
            message: err.without_url().to_string(),
        }
    }
}
