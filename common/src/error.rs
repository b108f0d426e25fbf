use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error classification carried in response envelopes.
///
/// The facade maps these back to typed errors without matching on message
/// text, so messages stay free-form for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The cryptographic primitive module failed to load. Fatal: every
    /// queued and future request on this engine instance fails with it.
    #[error("initialization failed")]
    InitializationFailed,

    /// A challenge was requested with no resident keypair.
    #[error("no active VRF session")]
    NoActiveSession,

    /// PRF extension results were absent, malformed or undecodable.
    #[error("malformed PRF output")]
    MalformedPrf,

    /// The request payload did not match the operation's expected shape.
    #[error("invalid request")]
    InvalidRequest,

    /// Any other engine-side failure.
    #[error("internal error")]
    Internal,
}

/// Error body of a failed response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
