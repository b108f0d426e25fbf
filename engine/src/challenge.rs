use sha2::{Digest, Sha256};
use vrf_common::{api::{VrfChallengeData, VrfInputParams}, utils::encode_b64u};
use vrf_wasm::ecvrf::ECVRFKeyPair;

use crate::{config::CHALLENGE_DOMAIN, crypto::PrimitiveModule, error::EngineError};

/// Serialize the input tuple into the exact layout the prove routine
/// expects: SHA-256 over the domain separator and the length-prefixed
/// fields. Length prefixes keep distinct tuples from concatenating into
/// the same byte string.
pub fn build_alpha(input: &VrfInputParams) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DOMAIN);

    for field in [input.user_id.as_bytes(), input.rp_id.as_bytes()] {
        hasher.update((field.len() as u32).to_be_bytes());
        hasher.update(field);
    }
    hasher.update(input.block_height.to_be_bytes());

    let hash_bytes = input.block_hash.as_bytes();
    hasher.update((hash_bytes.len() as u32).to_be_bytes());
    hasher.update(hash_bytes);

    hasher.finalize().into()
}

/// Produce a challenge for the given keypair and input tuple.
///
/// Pure in (keypair, input): identical arguments give byte-identical
/// output and proof, across calls and across restarts that re-derive the
/// same keypair.
pub fn generate_challenge(
    module: &PrimitiveModule,
    keypair: &ECVRFKeyPair,
    input: &VrfInputParams,
) -> Result<VrfChallengeData, EngineError> {
    let alpha = build_alpha(input);
    let (output, proof) = module.prove(keypair, &alpha)?;
    let public_key = module.public_key_bytes(keypair)?;

    Ok(VrfChallengeData {
        vrf_output_b64u: encode_b64u(&output),
        vrf_proof_b64u: encode_b64u(&proof),
        vrf_public_key_b64u: encode_b64u(&public_key),
        user_id: input.user_id.clone(),
        rp_id: input.rp_id.clone(),
        block_height: input.block_height,
        block_hash: input.block_hash.clone(),
    })
}
