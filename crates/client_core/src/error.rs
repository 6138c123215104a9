use shared::{domain::ZoneId, error::ApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed with status {status}: {}", error.message)]
    Http {
        endpoint: String,
        status: u16,
        error: ApiError,
    },
    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("invalid api base url '{0}'")]
    InvalidBaseUrl(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Rejections raised before any remote call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("zone {0} is not known")]
    UnknownZone(ZoneId),
    #[error("zone name must not be empty")]
    EmptyName,
    #[error("timer minutes must be a positive whole number, got '{0}'")]
    InvalidMinutes(String),
    #[error("timer of {0} minutes is too long")]
    TimerTooLong(i64),
    #[error("zone {0} is already running; stop it before starting a timer")]
    ZoneActive(ZoneId),
    #[error("zone {0} has a timer start awaiting confirmation")]
    TimerPending(ZoneId),
}

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ZoneError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ZoneError::Validation(_))
    }
}
