use std::time::Duration;

use thiserror::Error;
use vrf_common::error::{ErrorBody, ErrorCode};

/// Engine-side failures. These never cross the message boundary as-is:
/// the dispatch loop converts them into error envelopes carrying an
/// [`ErrorCode`] plus the rendered message.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no active VRF session")]
    NoActiveSession,

    #[error("malformed PRF output: {0}")]
    MalformedPrf(String),

    #[error("invalid request payload: {0}")]
    InvalidRequest(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoActiveSession => ErrorCode::NoActiveSession,
            Self::MalformedPrf(_) => ErrorCode::MalformedPrf,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Crypto(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn into_body(self) -> ErrorBody {
        let code = self.code();
        ErrorBody::new(code, self.to_string())
    }
}

/// Typed errors surfaced by the manager facade.
#[derive(Debug, Error)]
pub enum VrfManagerError {
    #[error("VRF worker is not initialized")]
    NotInitialized,

    #[error("VRF worker initialization failed: {0}")]
    InitializationFailed(String),

    #[error("no active VRF session")]
    NoActiveSession,

    #[error("malformed PRF output: {0}")]
    MalformedPrf(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("execution unit terminated with the call pending")]
    WorkerTerminated,

    #[error("VRF worker error: {0}")]
    Engine(String),

    #[error("unexpected payload: {0}")]
    UnexpectedPayload(#[from] serde_json::Error),
}

impl VrfManagerError {
    /// Re-throw a wire error body as its typed counterpart.
    pub fn from_body(body: ErrorBody) -> Self {
        match body.code {
            ErrorCode::InitializationFailed => Self::InitializationFailed(body.message),
            ErrorCode::NoActiveSession => Self::NoActiveSession,
            ErrorCode::MalformedPrf => Self::MalformedPrf(body.message),
            ErrorCode::InvalidRequest | ErrorCode::Internal => Self::Engine(body.message),
        }
    }
}
