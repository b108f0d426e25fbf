use log::{debug, info};
use serde_json::Value;
use vrf_common::{
    api::{
        BootstrapParams, BootstrapResult, DeriveFromCredentialParams, DeriveFromRawPrfParams,
        DeriveResult, DualPrfOutputs, EncryptedVrfKeypair, VrfInputParams,
    },
    utils::{decode_b64u, encode_b64u},
};
use zeroize::Zeroizing;

use crate::{
    challenge::generate_challenge,
    config::PRF_OUTPUT_SIZE,
    crypto::{self, PrimitiveModule},
    error::EngineError,
    session::VrfSession,
};

/// Bootstrap a session with a random keypair and return its first
/// challenge. The keypair is kept resident only when asked; key material
/// is never exported by this path.
pub fn bootstrap(
    module: &PrimitiveModule,
    session: &mut VrfSession,
    params: BootstrapParams,
) -> Result<BootstrapResult, EngineError> {
    let keypair = module.random_keypair();
    let challenge = generate_challenge(module, &keypair, &params.vrf_input)?;
    let public_key = challenge.vrf_public_key_b64u.clone();

    if params.save_in_memory {
        session.install(keypair, params.vrf_input.user_id.clone());
        info!("bootstrapped VRF session for {}", params.vrf_input.user_id);
    } else {
        debug!("bootstrap keypair discarded (saveInMemory = false)");
    }

    Ok(BootstrapResult {
        vrf_public_key_b64u: public_key,
        vrf_challenge: challenge,
    })
}

/// Recover the keypair from the PRF outputs of a serialized authenticator
/// assertion, install it, and return the first challenge plus the
/// encrypted keypair blob for the caller's persistence layer.
pub fn derive_from_credential(
    module: &PrimitiveModule,
    session: &mut VrfSession,
    params: DeriveFromCredentialParams,
) -> Result<DeriveResult, EngineError> {
    let outputs = extract_prf_outputs(&params.credential_json)?;
    let secret = decode_prf_secret(&outputs.encryption_secret_b64u)?;
    derive_and_install(module, session, &secret, params.user_id, &params.vrf_input)
}

/// Same as [`derive_from_credential`], with the secret supplied directly.
pub fn derive_from_raw_prf(
    module: &PrimitiveModule,
    session: &mut VrfSession,
    params: DeriveFromRawPrfParams,
) -> Result<DeriveResult, EngineError> {
    let secret = decode_prf_secret(&params.prf_output_b64u)?;
    derive_and_install(module, session, &secret, params.user_id, &params.vrf_input)
}

/// Pull the dual PRF outputs out of a serialized WebAuthn-style assertion.
/// Missing or non-string extension results are a hard precondition
/// failure: the caller must re-run the ceremony.
pub fn extract_prf_outputs(credential_json: &str) -> Result<DualPrfOutputs, EngineError> {
    let credential: Value = serde_json::from_str(credential_json)
        .map_err(|e| EngineError::MalformedPrf(format!("credential is not valid JSON: {e}")))?;

    let results = credential
        .get("clientExtensionResults")
        .and_then(|v| v.get("prf"))
        .and_then(|v| v.get("results"))
        .ok_or_else(|| {
            EngineError::MalformedPrf("credential carries no PRF extension results".to_owned())
        })?;

    let first = prf_result_str(results, "first")?;
    let second = prf_result_str(results, "second")?;

    Ok(DualPrfOutputs {
        encryption_secret_b64u: first.to_owned(),
        signing_secret_b64u: second.to_owned(),
    })
}

fn prf_result_str<'a>(results: &'a Value, name: &str) -> Result<&'a str, EngineError> {
    results
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::MalformedPrf(format!("PRF extension result '{name}' missing")))
}

fn decode_prf_secret(encoded: &str) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let secret = decode_b64u(encoded)
        .map(Zeroizing::new)
        .map_err(|e| EngineError::MalformedPrf(format!("PRF output is not base64url: {e}")))?;
    if secret.len() != PRF_OUTPUT_SIZE {
        return Err(EngineError::MalformedPrf(format!(
            "PRF output must be {} bytes, got {}",
            PRF_OUTPUT_SIZE,
            secret.len()
        )));
    }
    Ok(secret)
}

// Install happens only after every fallible step succeeded, so a failed
// derivation never replaces or clears the previous resident keypair.
fn derive_and_install(
    module: &PrimitiveModule,
    session: &mut VrfSession,
    secret: &[u8],
    user_id: String,
    input: &VrfInputParams,
) -> Result<DeriveResult, EngineError> {
    let seed = crypto::derive_seed(secret, &user_id)?;
    let keypair = module.keypair_from_seed(&seed);

    let wrap_key = crypto::derive_wrap_key(secret, &user_id)?;
    let keypair_bytes = module.serialize_keypair(&keypair)?;
    let (ciphertext, nonce) = module.seal(&wrap_key, &keypair_bytes)?;

    let challenge = generate_challenge(module, &keypair, input)?;
    let public_key = challenge.vrf_public_key_b64u.clone();

    session.install(keypair, user_id.clone());
    info!("derived VRF session for {}", user_id);

    Ok(DeriveResult {
        vrf_public_key_b64u: public_key,
        encrypted_vrf_keypair: EncryptedVrfKeypair {
            ciphertext_b64u: encode_b64u(&ciphertext),
            nonce_b64u: encode_b64u(&nonce),
        },
        vrf_challenge: challenge,
    })
}
