use base64::{engine::general_purpose::URL_SAFE_NO_PAD, DecodeError, Engine};

/// Encode bytes as base64url without padding, the encoding used for every
/// byte field crossing the engine boundary (WebAuthn ecosystem convention).
pub fn encode_b64u(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a base64url (no padding) string.
pub fn decode_b64u(value: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}
