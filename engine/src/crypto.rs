use anyhow::anyhow;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hmac::{Hmac, Mac};
use log::{debug, error};
use rand::{rngs::OsRng, RngCore};
use rand_core::SeedableRng;
use sha2::Sha256;
use vrf_wasm::{
    ecvrf::ECVRFKeyPair,
    traits::WasmRngFromSeed,
    vrf::{VRFKeyPair, VRFProof},
};
use zeroize::Zeroizing;

use crate::{
    config::{AEAD_KEY_SIZE, AEAD_NONCE_SIZE, VRF_SEED_DOMAIN, VRF_SEED_SIZE, VRF_WRAP_DOMAIN},
    error::EngineError,
};

type HmacSha256 = Hmac<Sha256>;

// HKDF-SHA256 (RFC 5869)

fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Result<[u8; 32], EngineError> {
    // qualified: the aead KeyInit in scope also offers new_from_slice
    let mut mac = <HmacSha256 as Mac>::new_from_slice(salt)
        .map_err(|e| EngineError::Crypto(format!("HKDF extract: {e}")))?;
    mac.update(ikm);
    Ok(mac.finalize().into_bytes().into())
}

fn hkdf_expand(prk: &[u8; 32], info: &[u8], out_len: usize) -> Result<Vec<u8>, EngineError> {
    // out_len <= 255 * 32 per the RFC; callers only ask for key-sized outputs
    let mut okm = Vec::with_capacity(out_len);
    let mut previous: Option<[u8; 32]> = None;
    let mut counter = 1u8;

    while okm.len() < out_len {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(prk)
            .map_err(|e| EngineError::Crypto(format!("HKDF expand: {e}")))?;
        if let Some(prev) = &previous {
            mac.update(prev);
        }
        mac.update(info);
        mac.update(&[counter]);

        let block: [u8; 32] = mac.finalize().into_bytes().into();
        let take = (out_len - okm.len()).min(block.len());
        okm.extend_from_slice(&block[..take]);
        previous = Some(block);
        counter = counter
            .checked_add(1)
            .ok_or_else(|| EngineError::Crypto("HKDF expand output too long".to_owned()))?;
    }

    Ok(okm)
}

fn hkdf_32(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; 32]>, EngineError> {
    let prk = hkdf_extract(salt, ikm)?;
    let okm = Zeroizing::new(hkdf_expand(&prk, info, 32)?);
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&okm);
    Ok(out)
}

/// Deterministic VRF keygen material from a ceremony PRF secret,
/// bound to the account identifier.
pub fn derive_seed(secret: &[u8], user_id: &str) -> Result<Zeroizing<[u8; VRF_SEED_SIZE]>, EngineError> {
    hkdf_32(VRF_SEED_DOMAIN, secret, user_id.as_bytes())
}

/// AEAD key wrapping the serialized keypair, derived from the same secret
/// under a distinct domain so seed and wrap key never coincide.
pub fn derive_wrap_key(secret: &[u8], user_id: &str) -> Result<Zeroizing<[u8; AEAD_KEY_SIZE]>, EngineError> {
    hkdf_32(VRF_WRAP_DOMAIN, secret, user_id.as_bytes())
}

/// The VRF/AEAD primitive module, loaded once per engine and kept warm
/// inside the dispatch task. All cryptographic entry points used by the
/// services hang off this struct.
pub struct PrimitiveModule {
    _priv: (),
}

impl PrimitiveModule {
    /// Load the primitive module, running a keygen/prove/verify self-check.
    /// A failure here is fatal for the owning engine instance.
    pub async fn load() -> anyhow::Result<Self> {
        let module = Self { _priv: () };

        let keypair = module.keypair_from_seed(&[7u8; VRF_SEED_SIZE]);
        let proof = keypair.prove(b"primitive module self-check");
        proof
            .verify(b"primitive module self-check", &keypair.pk)
            .map_err(|e| {
                error!("VRF primitive self-check failed: {:?}", e);
                anyhow!("VRF primitive self-check failed: {:?}", e)
            })?;

        debug!("VRF primitive module loaded");
        Ok(module)
    }

    /// Deterministic keygen: one seed, one keypair, forever.
    pub fn keypair_from_seed(&self, seed: &[u8; VRF_SEED_SIZE]) -> ECVRFKeyPair {
        let mut rng = WasmRngFromSeed::from_seed(*seed);
        ECVRFKeyPair::generate(&mut rng)
    }

    /// Random keygen for bootstrap sessions. No determinism contract.
    pub fn random_keypair(&self) -> ECVRFKeyPair {
        let mut seed = Zeroizing::new([0u8; VRF_SEED_SIZE]);
        OsRng.fill_bytes(&mut *seed);
        self.keypair_from_seed(&seed)
    }

    /// Run the VRF prove routine over `alpha`.
    /// Returns the 64-byte output and the serialized proof.
    pub fn prove(
        &self,
        keypair: &ECVRFKeyPair,
        alpha: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
        let proof = keypair.prove(alpha);
        let output = proof.to_hash().to_vec();
        let proof_bytes = bincode::serialize(&proof)
            .map_err(|e| EngineError::Crypto(format!("proof serialization failed: {e}")))?;
        Ok((output, proof_bytes))
    }

    /// Compact byte encoding of the public key.
    pub fn public_key_bytes(&self, keypair: &ECVRFKeyPair) -> Result<Vec<u8>, EngineError> {
        bincode::serialize(&keypair.pk)
            .map_err(|e| EngineError::Crypto(format!("public key serialization failed: {e}")))
    }

    /// Compact byte encoding of the full keypair, fed to [`Self::seal`].
    pub fn serialize_keypair(&self, keypair: &ECVRFKeyPair) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        bincode::serialize(keypair)
            .map(Zeroizing::new)
            .map_err(|e| EngineError::Crypto(format!("keypair serialization failed: {e}")))
    }

    /// AEAD-seal `plaintext` under `key` with a fresh random nonce.
    pub fn seal(
        &self,
        key: &[u8; AEAD_KEY_SIZE],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; AEAD_NONCE_SIZE]), EngineError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

        let mut nonce_bytes = [0u8; AEAD_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| EngineError::Crypto(format!("AEAD seal failed: {e}")))?;
        Ok((ciphertext, nonce_bytes))
    }
}
