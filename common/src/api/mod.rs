use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::ErrorBody;

/// Operation codes understood by the engine.
///
/// Anything that does not parse into this enum is treated as a
/// control/liveness signal by the dispatch loop: acknowledged, never
/// forwarded to cryptographic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OperationCode {
    GenerateVrfKeypairBootstrap,
    DeriveVrfKeypairFromPrf,
    DeriveVrfKeypairFromRawPrf,
    GenerateVrfChallenge,
    CheckVrfStatus,
    ClearVrfSession,
}

/// Engine-bound message: `{ tag, id, payload }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub tag: String,
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

impl RequestEnvelope {
    pub fn new<T: ToString, I: ToString>(tag: T, id: I, payload: Value) -> Self {
        Self {
            tag: tag.to_string(),
            id: id.to_string(),
            payload,
        }
    }

    /// Parse the tag against the known operation codes.
    /// `None` means the message is a control signal.
    pub fn operation(&self) -> Option<OperationCode> {
        self.tag.parse().ok()
    }
}

/// Caller-bound message echoing the request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn ok<I: ToString>(id: I, payload: Option<Value>) -> Self {
        Self {
            id: id.to_string(),
            success: true,
            payload,
            error: None,
        }
    }

    pub fn err<I: ToString>(id: I, error: ErrorBody) -> Self {
        Self {
            id: id.to_string(),
            success: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Per-challenge input tuple supplied by the calling flow.
///
/// The block height/hash pair binds the challenge to a chain state the
/// caller trusts; the engine treats both as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VrfInputParams {
    pub user_id: String,
    pub rp_id: String,
    pub block_height: u64,
    pub block_hash: String,
}

/// A produced challenge: VRF output + proof under the session public key,
/// with the input tuple echoed so verifiers can rebuild the alpha string.
///
/// Downstream components embed this as an opaque bundle; proof bytes are
/// verified server-side against the public key, never locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VrfChallengeData {
    pub vrf_output_b64u: String,
    pub vrf_proof_b64u: String,
    pub vrf_public_key_b64u: String,
    pub user_id: String,
    pub rp_id: String,
    pub block_height: u64,
    pub block_hash: String,
}

/// Two independent PRF outputs from one authenticator ceremony.
///
/// Only the encryption secret feeds VRF derivation; the signing secret is
/// reserved for the external signing subsystem and carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualPrfOutputs {
    pub encryption_secret_b64u: String,
    pub signing_secret_b64u: String,
}

/// Encrypted VRF keypair blob handed back to the caller for persistence.
/// The engine itself persists nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVrfKeypair {
    pub ciphertext_b64u: String,
    pub nonce_b64u: String,
}

/// Session status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VrfStatus {
    pub active: bool,
    pub user_id: Option<String>,
    pub session_duration_ms: u64,
}

// Operation parameter payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapParams {
    pub vrf_input: VrfInputParams,
    pub save_in_memory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveFromCredentialParams {
    /// Serialized authenticator assertion whose client extension results
    /// must contain the dual PRF outputs.
    pub credential_json: String,
    pub user_id: String,
    pub vrf_input: VrfInputParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveFromRawPrfParams {
    /// Base64url-encoded PRF encryption secret supplied directly.
    pub prf_output_b64u: String,
    pub user_id: String,
    pub vrf_input: VrfInputParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeParams {
    pub vrf_input: VrfInputParams,
}

// Operation result payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapResult {
    pub vrf_public_key_b64u: String,
    pub vrf_challenge: VrfChallengeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveResult {
    pub vrf_public_key_b64u: String,
    pub encrypted_vrf_keypair: EncryptedVrfKeypair,
    pub vrf_challenge: VrfChallengeData,
}
