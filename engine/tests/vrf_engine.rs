//! End-to-end coverage of the VRF session & challenge engine through the
//! manager facade: determinism, divergence, input sensitivity, session
//! lifecycle, control signals and worker teardown.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use vrf_common::{api::VrfInputParams, utils::encode_b64u};
use vrf_engine::{crypto::PrimitiveModule, VrfManagerError, VrfWorkerManager};

fn input(height: u64) -> VrfInputParams {
    VrfInputParams {
        user_id: "alice.testnet".to_owned(),
        rp_id: "localhost".to_owned(),
        block_height: height,
        block_hash: "11111111111111111111111111111111".to_owned(),
    }
}

async fn live_manager() -> VrfWorkerManager {
    let manager = VrfWorkerManager::new();
    manager.initialize().await.unwrap();
    manager
}

#[tokio::test]
async fn calls_before_initialize_are_rejected() {
    let manager = VrfWorkerManager::new();
    assert!(matches!(
        manager.check_vrf_status().await,
        Err(VrfManagerError::NotInitialized)
    ));
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let manager = live_manager().await;
    manager.initialize().await.unwrap();
    manager.ping().await.unwrap();
}

#[tokio::test]
async fn bootstrap_twice_yields_distinct_keys_and_outputs() {
    let manager = live_manager().await;

    let first = manager
        .generate_vrf_keypair_bootstrap(input(12345), true)
        .await
        .unwrap();
    let second = manager
        .generate_vrf_keypair_bootstrap(input(12345), true)
        .await
        .unwrap();

    assert_ne!(first.vrf_public_key_b64u, second.vrf_public_key_b64u);
    assert_ne!(
        first.vrf_challenge.vrf_output_b64u,
        second.vrf_challenge.vrf_output_b64u
    );
}

#[tokio::test]
async fn raw_prf_derivation_is_deterministic_and_height_sensitive() {
    let manager = live_manager().await;
    let secret = encode_b64u(&[0x5au8; 32]);

    let first = manager
        .derive_vrf_keypair_from_raw_prf(secret.clone(), "alice.testnet".to_owned(), input(12345))
        .await
        .unwrap();
    let second = manager
        .derive_vrf_keypair_from_raw_prf(secret.clone(), "alice.testnet".to_owned(), input(12345))
        .await
        .unwrap();

    assert_eq!(first.vrf_public_key_b64u, second.vrf_public_key_b64u);
    assert_eq!(
        first.vrf_challenge.vrf_output_b64u,
        second.vrf_challenge.vrf_output_b64u
    );
    assert_eq!(
        first.vrf_challenge.vrf_proof_b64u,
        second.vrf_challenge.vrf_proof_b64u
    );

    // changing only the block height changes the output, not the key
    let third = manager
        .derive_vrf_keypair_from_raw_prf(secret, "alice.testnet".to_owned(), input(99999))
        .await
        .unwrap();
    assert_eq!(first.vrf_public_key_b64u, third.vrf_public_key_b64u);
    assert_ne!(
        first.vrf_challenge.vrf_output_b64u,
        third.vrf_challenge.vrf_output_b64u
    );

    // distinct secrets diverge
    let other = manager
        .derive_vrf_keypair_from_raw_prf(
            encode_b64u(&[0xa5u8; 32]),
            "alice.testnet".to_owned(),
            input(12345),
        )
        .await
        .unwrap();
    assert_ne!(first.vrf_public_key_b64u, other.vrf_public_key_b64u);
    assert_ne!(
        first.vrf_challenge.vrf_output_b64u,
        other.vrf_challenge.vrf_output_b64u
    );
}

#[tokio::test]
async fn credential_derivation_matches_raw_derivation() {
    let manager = live_manager().await;
    let secret_bytes = [0x77u8; 32];

    let credential = json!({
        "id": "test-credential",
        "type": "public-key",
        "clientExtensionResults": {
            "prf": {
                "results": {
                    "first": encode_b64u(&secret_bytes),
                    "second": encode_b64u(&[0x99u8; 32]),
                }
            }
        }
    })
    .to_string();

    let from_credential = manager
        .derive_vrf_keypair_from_prf(credential, "alice.testnet".to_owned(), input(12345))
        .await
        .unwrap();
    let from_raw = manager
        .derive_vrf_keypair_from_raw_prf(
            encode_b64u(&secret_bytes),
            "alice.testnet".to_owned(),
            input(12345),
        )
        .await
        .unwrap();

    assert_eq!(
        from_credential.vrf_public_key_b64u,
        from_raw.vrf_public_key_b64u
    );
    assert_eq!(
        from_credential.vrf_challenge.vrf_output_b64u,
        from_raw.vrf_challenge.vrf_output_b64u
    );
}

#[tokio::test]
async fn malformed_credential_fails_and_keeps_previous_session() {
    let manager = live_manager().await;

    manager
        .derive_vrf_keypair_from_raw_prf(
            encode_b64u(&[0x11u8; 32]),
            "alice.testnet".to_owned(),
            input(12345),
        )
        .await
        .unwrap();

    let result = manager
        .derive_vrf_keypair_from_prf(
            json!({ "id": "no extensions here" }).to_string(),
            "mallory.testnet".to_owned(),
            input(12345),
        )
        .await;
    assert!(matches!(result, Err(VrfManagerError::MalformedPrf(_))));

    let status = manager.check_vrf_status().await.unwrap();
    assert!(status.active);
    assert_eq!(status.user_id.as_deref(), Some("alice.testnet"));
}

#[tokio::test]
async fn status_reflects_session_lifecycle() {
    let manager = live_manager().await;

    let status = manager.check_vrf_status().await.unwrap();
    assert!(!status.active);
    assert_eq!(status.user_id, None);
    assert_eq!(status.session_duration_ms, 0);

    let mut bootstrap_input = input(12345);
    bootstrap_input.user_id = "vrf-test-account.testnet".to_owned();
    manager
        .generate_vrf_keypair_bootstrap(bootstrap_input, true)
        .await
        .unwrap();

    let status = manager.check_vrf_status().await.unwrap();
    assert!(status.active);
    assert_eq!(status.user_id.as_deref(), Some("vrf-test-account.testnet"));

    manager.clear_vrf_session().await.unwrap();
    let status = manager.check_vrf_status().await.unwrap();
    assert!(!status.active);
    assert_eq!(status.user_id, None);
    assert_eq!(status.session_duration_ms, 0);
}

#[tokio::test]
async fn challenge_without_session_is_a_typed_error() {
    let manager = live_manager().await;

    assert!(matches!(
        manager.generate_vrf_challenge(input(12345)).await,
        Err(VrfManagerError::NoActiveSession)
    ));

    // after clearing an active session the same error comes back
    manager
        .generate_vrf_keypair_bootstrap(input(12345), true)
        .await
        .unwrap();
    manager.generate_vrf_challenge(input(12345)).await.unwrap();
    manager.clear_vrf_session().await.unwrap();
    assert!(matches!(
        manager.generate_vrf_challenge(input(12345)).await,
        Err(VrfManagerError::NoActiveSession)
    ));
}

#[tokio::test]
async fn clearing_an_inactive_session_is_a_no_op() {
    let manager = live_manager().await;
    manager.clear_vrf_session().await.unwrap();
    manager.clear_vrf_session().await.unwrap();
    assert!(!manager.check_vrf_status().await.unwrap().active);
}

#[tokio::test]
async fn load_failure_surfaces_as_initialization_error() {
    let manager = VrfWorkerManager::new();
    manager
        .initialize_with(async { Err(anyhow::anyhow!("wasm blob rejected")) })
        .await
        .unwrap();

    assert!(matches!(
        manager.check_vrf_status().await,
        Err(VrfManagerError::InitializationFailed(_))
    ));
    // stays failed for every later request
    assert!(matches!(
        manager.ping().await,
        Err(VrfManagerError::InitializationFailed(_))
    ));
}

#[tokio::test]
async fn deadline_fires_when_the_engine_never_answers() {
    let manager = VrfWorkerManager::with_timeout(Duration::from_millis(50));
    manager
        .initialize_with(std::future::pending())
        .await
        .unwrap();

    assert!(matches!(
        manager.check_vrf_status().await,
        Err(VrfManagerError::Timeout(_))
    ));
}

#[tokio::test]
async fn late_response_after_timeout_is_dropped() {
    let (latch_tx, latch_rx) = tokio::sync::oneshot::channel::<()>();
    let manager = VrfWorkerManager::with_timeout(Duration::from_millis(50));
    manager
        .initialize_with(async move {
            latch_rx.await.ok();
            PrimitiveModule::load().await
        })
        .await
        .unwrap();

    // queued behind the not-yet-loaded module, so the deadline fires first
    assert!(matches!(
        manager.check_vrf_status().await,
        Err(VrfManagerError::Timeout(_))
    ));

    // the engine comes up and answers the timed-out request; the router
    // finds no pending entry for it and drops the stale response
    latch_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // a fresh call gets its own correlated answer, not the stale one
    let status = manager.check_vrf_status().await.unwrap();
    assert!(!status.active);
    assert_eq!(status.user_id, None);
}

#[tokio::test]
async fn shutdown_rejects_pending_calls() {
    let manager = Arc::new(VrfWorkerManager::new());
    manager
        .initialize_with(std::future::pending())
        .await
        .unwrap();

    let caller = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.check_vrf_status().await })
    };

    // let the call register before tearing the worker down
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.shutdown().await;

    let result = caller.await.unwrap();
    assert!(matches!(result, Err(VrfManagerError::WorkerTerminated)));
}

#[tokio::test]
async fn restart_rederives_the_same_challenge() {
    let secret = encode_b64u(&[0x42u8; 32]);

    let first = {
        let manager = live_manager().await;
        let result = manager
            .derive_vrf_keypair_from_raw_prf(secret.clone(), "alice.testnet".to_owned(), input(7))
            .await
            .unwrap();
        manager.shutdown().await;
        result
    };

    // fresh engine instance, same PRF secret, same input tuple
    let manager = live_manager().await;
    let second = manager
        .derive_vrf_keypair_from_raw_prf(secret, "alice.testnet".to_owned(), input(7))
        .await
        .unwrap();

    assert_eq!(first.vrf_public_key_b64u, second.vrf_public_key_b64u);
    assert_eq!(
        first.vrf_challenge.vrf_output_b64u,
        second.vrf_challenge.vrf_output_b64u
    );
    assert_eq!(
        first.vrf_challenge.vrf_proof_b64u,
        second.vrf_challenge.vrf_proof_b64u
    );
}

#[tokio::test]
async fn encrypted_keypair_blob_is_returned_for_persistence() {
    let manager = live_manager().await;
    let result = manager
        .derive_vrf_keypair_from_raw_prf(
            encode_b64u(&[0x24u8; 32]),
            "alice.testnet".to_owned(),
            input(12345),
        )
        .await
        .unwrap();

    assert!(!result.encrypted_vrf_keypair.ciphertext_b64u.is_empty());
    assert!(!result.encrypted_vrf_keypair.nonce_b64u.is_empty());
}

// Exercising the loader seam the way an embedder would
#[tokio::test]
async fn initialize_with_preloaded_module() {
    let manager = VrfWorkerManager::new();
    manager.initialize_with(PrimitiveModule::load()).await.unwrap();
    manager.ping().await.unwrap();
}
