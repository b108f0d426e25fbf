use std::time::Instant;

use log::debug;
use vrf_common::api::VrfStatus;
use vrf_wasm::ecvrf::ECVRFKeyPair;

/// The single resident keypair and its bookkeeping.
struct Resident {
    keypair: ECVRFKeyPair,
    user_id: String,
    activated_at: Instant,
}

/// Single-slot session store, owned exclusively by the dispatch task.
///
/// The dispatch loop processes one request at a time, which is the only
/// thing making last-write-wins installs safe without locking.
#[derive(Default)]
pub struct VrfSession {
    resident: Option<Resident>,
}

impl VrfSession {
    /// Install a keypair, unconditionally replacing any resident one.
    pub fn install(&mut self, keypair: ECVRFKeyPair, user_id: String) {
        if let Some(previous) = &self.resident {
            debug!(
                "replacing resident VRF keypair for {} with {}",
                previous.user_id, user_id
            );
        }
        self.resident = Some(Resident {
            keypair,
            user_id,
            activated_at: Instant::now(),
        });
    }

    /// Discard the resident keypair. A no-op when already inactive.
    pub fn clear(&mut self) {
        if let Some(resident) = self.resident.take() {
            debug!("cleared VRF session for {}", resident.user_id);
        }
    }

    /// The resident keypair, if any.
    pub fn keypair(&self) -> Option<&ECVRFKeyPair> {
        self.resident.as_ref().map(|r| &r.keypair)
    }

    pub fn status(&self) -> VrfStatus {
        match &self.resident {
            Some(resident) => VrfStatus {
                active: true,
                user_id: Some(resident.user_id.clone()),
                session_duration_ms: resident.activated_at.elapsed().as_millis() as u64,
            },
            None => VrfStatus {
                active: false,
                user_id: None,
                session_duration_ms: 0,
            },
        }
    }
}
