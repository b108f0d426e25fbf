use std::future::Future;

use log::{debug, error, trace, warn};
use serde_json::Value;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use vrf_common::api::{OperationCode, RequestEnvelope, ResponseEnvelope};
use vrf_common::error::{ErrorBody, ErrorCode};

use crate::{
    challenge, crypto::PrimitiveModule, derivation, error::EngineError, session::VrfSession,
};

/// Channel ends of a spawned engine task.
pub struct EngineChannels {
    pub request_tx: UnboundedSender<RequestEnvelope>,
    pub response_rx: UnboundedReceiver<ResponseEnvelope>,
    pub task: JoinHandle<()>,
}

/// Spawn the isolated engine task.
///
/// The request channel doubles as the pre-ready buffer: envelopes sent
/// while `loader` is still pending sit in it, in arrival order, and drain
/// one at a time once the primitive module is up. If loading fails, every
/// queued and future request is answered with an initialization error.
pub fn spawn<L>(loader: L) -> EngineChannels
where
    L: Future<Output = anyhow::Result<PrimitiveModule>> + Send + 'static,
{
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<RequestEnvelope>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<ResponseEnvelope>();

    let task = tokio::spawn(async move {
        // ready latch: nothing is processed before this resolves
        let module = match loader.await {
            Ok(module) => module,
            Err(e) => {
                error!("VRF primitive module failed to load: {e}");
                let body = ErrorBody::new(
                    ErrorCode::InitializationFailed,
                    format!("primitive module failed to load: {e}"),
                );
                while let Some(request) = request_rx.recv().await {
                    if response_tx
                        .send(ResponseEnvelope::err(&request.id, body.clone()))
                        .is_err()
                    {
                        break;
                    }
                }
                return;
            }
        };
        debug!("VRF engine ready, draining request queue");

        // Single consumer, one request at a time: the session below is the
        // only mutable resident and never sees concurrent writers.
        let mut session = VrfSession::default();
        while let Some(request) = request_rx.recv().await {
            let response = process_request(&module, &mut session, request);
            if response_tx.send(response).is_err() {
                // caller side is gone, stop quietly
                break;
            }
        }
        debug!("VRF engine task exiting");
    });

    EngineChannels {
        request_tx,
        response_rx,
        task,
    }
}

/// Handle one envelope, always producing exactly one response with the
/// original id. Unknown tags are control/liveness signals: acknowledged
/// without touching any cryptographic routine or session state.
fn process_request(
    module: &PrimitiveModule,
    session: &mut VrfSession,
    request: RequestEnvelope,
) -> ResponseEnvelope {
    let Some(operation) = request.operation() else {
        trace!("acknowledging control signal '{}'", request.tag);
        return ResponseEnvelope::ok(&request.id, None);
    };

    match handle_operation(module, session, operation, request.payload) {
        Ok(payload) => ResponseEnvelope::ok(&request.id, payload),
        Err(e) => {
            warn!("{operation} failed: {e}");
            ResponseEnvelope::err(&request.id, e.into_body())
        }
    }
}

fn handle_operation(
    module: &PrimitiveModule,
    session: &mut VrfSession,
    operation: OperationCode,
    payload: Value,
) -> Result<Option<Value>, EngineError> {
    if log::log_enabled!(log::Level::Trace) {
        trace!("processing {}", operation);
    }

    match operation {
        OperationCode::GenerateVrfKeypairBootstrap => {
            let result = derivation::bootstrap(module, session, parse(payload)?)?;
            to_payload(&result)
        }
        OperationCode::DeriveVrfKeypairFromPrf => {
            let result = derivation::derive_from_credential(module, session, parse(payload)?)?;
            to_payload(&result)
        }
        OperationCode::DeriveVrfKeypairFromRawPrf => {
            let result = derivation::derive_from_raw_prf(module, session, parse(payload)?)?;
            to_payload(&result)
        }
        OperationCode::GenerateVrfChallenge => {
            let params: vrf_common::api::ChallengeParams = parse(payload)?;
            let keypair = session.keypair().ok_or(EngineError::NoActiveSession)?;
            let result = challenge::generate_challenge(module, keypair, &params.vrf_input)?;
            to_payload(&result)
        }
        OperationCode::CheckVrfStatus => to_payload(&session.status()),
        OperationCode::ClearVrfSession => {
            session.clear();
            Ok(None)
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, EngineError> {
    serde_json::from_value(payload).map_err(|e| EngineError::InvalidRequest(e.to_string()))
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Option<Value>, EngineError> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| EngineError::Internal(format!("response serialization failed: {e}")))
}
