use std::time::Duration;

// Default per-call deadline enforced on the manager side.
// Generous on purpose: a timeout never cancels in-flight engine work.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// Domain separators for the HKDF-SHA256 derivations. Changing any of these
// is a breaking change: previously derived keypairs become unrecoverable.
pub const VRF_SEED_DOMAIN: &[u8] = b"vrf-auth:keypair-seed:v1";
pub const VRF_WRAP_DOMAIN: &[u8] = b"vrf-auth:keypair-wrap:v1";

// Domain separator for the challenge alpha string.
pub const CHALLENGE_DOMAIN: &[u8] = b"vrf-auth:webauthn-challenge:v1";

// PRF extension outputs are fixed-width
pub const PRF_OUTPUT_SIZE: usize = 32;

pub const VRF_SEED_SIZE: usize = 32;
pub const AEAD_KEY_SIZE: usize = 32;
pub const AEAD_NONCE_SIZE: usize = 12;
