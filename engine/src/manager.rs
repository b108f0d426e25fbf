use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, trace};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{
    sync::{mpsc::UnboundedSender, oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};
use vrf_common::api::{
    BootstrapParams, BootstrapResult, ChallengeParams, DeriveFromCredentialParams,
    DeriveFromRawPrfParams, DeriveResult, OperationCode, RequestEnvelope, ResponseEnvelope,
    VrfChallengeData, VrfInputParams, VrfStatus,
};

use crate::{
    config::DEFAULT_CALL_TIMEOUT,
    crypto::PrimitiveModule,
    dispatch::{self, EngineChannels},
    error::VrfManagerError,
};

type PendingCalls = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

struct WorkerChannels {
    request_tx: UnboundedSender<RequestEnvelope>,
    engine_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
}

/// Caller-side facade over the isolated VRF engine.
///
/// Owns the engine task's lifecycle, allocates correlation ids, tracks one
/// pending call per in-flight request and enforces a per-call deadline.
/// Arbitrarily many calls may be in flight at once; serialization happens
/// inside the engine, not here.
pub struct VrfWorkerManager {
    worker: Mutex<Option<WorkerChannels>>,
    pending: PendingCalls,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl VrfWorkerManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self {
            worker: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            call_timeout,
        }
    }

    /// Spawn the engine task. Idempotent: a second call on a live manager
    /// is a no-op.
    pub async fn initialize(&self) -> Result<(), VrfManagerError> {
        self.initialize_with(PrimitiveModule::load()).await
    }

    /// Spawn the engine with a caller-supplied primitive loader. The
    /// loader runs inside the engine task; a load failure surfaces as
    /// [`VrfManagerError::InitializationFailed`] on every subsequent call.
    pub async fn initialize_with<L>(&self, loader: L) -> Result<(), VrfManagerError>
    where
        L: Future<Output = anyhow::Result<PrimitiveModule>> + Send + 'static,
    {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            trace!("initialize called on a live VRF worker, ignoring");
            return Ok(());
        }

        let EngineChannels {
            request_tx,
            mut response_rx,
            task: engine_task,
        } = dispatch::spawn(loader);

        let pending = self.pending.clone();
        let router_task = tokio::spawn(async move {
            while let Some(response) = response_rx.recv().await {
                match pending.lock().await.remove(&response.id) {
                    // receiver may have timed out in between, that is fine
                    Some(sender) => {
                        let _ = sender.send(response);
                    }
                    None => trace!("dropping stale response for id {}", response.id),
                }
            }

            // engine gone: reject everything still pending by dropping the
            // completion handles
            let mut pending = pending.lock().await;
            if !pending.is_empty() {
                debug!(
                    "VRF engine terminated, rejecting {} pending calls",
                    pending.len()
                );
                pending.clear();
            }
        });

        *worker = Some(WorkerChannels {
            request_tx,
            engine_task,
            router_task,
        });
        Ok(())
    }

    /// Tear the engine down. Every outstanding call is rejected with
    /// [`VrfManagerError::WorkerTerminated`].
    pub async fn shutdown(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };
        debug!("shutting down VRF worker");

        worker.engine_task.abort();
        drop(worker.request_tx);
        // the router drains pending calls once the response channel closes
        let _ = worker.router_task.await;
    }

    /// Post one envelope and await its correlated response.
    async fn call(&self, tag: String, payload: Value) -> Result<Option<Value>, VrfManagerError> {
        let request_tx = {
            let worker = self.worker.lock().await;
            worker
                .as_ref()
                .ok_or(VrfManagerError::NotInitialized)?
                .request_tx
                .clone()
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), sender);

        if request_tx
            .send(RequestEnvelope::new(tag, &id, payload))
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(VrfManagerError::WorkerTerminated);
        }

        match timeout(self.call_timeout, receiver).await {
            Err(_) => {
                // deadline fired first; a late answer will find no entry
                // and be dropped by the router
                self.pending.lock().await.remove(&id);
                Err(VrfManagerError::Timeout(self.call_timeout))
            }
            Ok(Err(_)) => Err(VrfManagerError::WorkerTerminated),
            Ok(Ok(response)) => {
                if response.success {
                    Ok(response.payload)
                } else {
                    Err(response
                        .error
                        .map(VrfManagerError::from_body)
                        .unwrap_or_else(|| {
                            VrfManagerError::Engine("error response without body".to_owned())
                        }))
                }
            }
        }
    }

    async fn call_operation<P: Serialize, R: DeserializeOwned>(
        &self,
        operation: OperationCode,
        params: &P,
    ) -> Result<R, VrfManagerError> {
        let payload = serde_json::to_value(params)?;
        let response = self.call(operation.to_string(), payload).await?;
        let payload = response
            .ok_or_else(|| VrfManagerError::Engine("missing response payload".to_owned()))?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Liveness probe: an intentionally unrecognized tag that the engine
    /// acknowledges through its control path.
    pub async fn ping(&self) -> Result<(), VrfManagerError> {
        self.call("ping".to_owned(), Value::Null).await.map(|_| ())
    }

    pub async fn generate_vrf_keypair_bootstrap(
        &self,
        vrf_input: VrfInputParams,
        save_in_memory: bool,
    ) -> Result<BootstrapResult, VrfManagerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("generate_vrf_keypair_bootstrap");
        }
        self.call_operation(
            OperationCode::GenerateVrfKeypairBootstrap,
            &BootstrapParams {
                vrf_input,
                save_in_memory,
            },
        )
        .await
    }

    pub async fn derive_vrf_keypair_from_prf(
        &self,
        credential_json: String,
        user_id: String,
        vrf_input: VrfInputParams,
    ) -> Result<DeriveResult, VrfManagerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("derive_vrf_keypair_from_prf");
        }
        self.call_operation(
            OperationCode::DeriveVrfKeypairFromPrf,
            &DeriveFromCredentialParams {
                credential_json,
                user_id,
                vrf_input,
            },
        )
        .await
    }

    pub async fn derive_vrf_keypair_from_raw_prf(
        &self,
        prf_output_b64u: String,
        user_id: String,
        vrf_input: VrfInputParams,
    ) -> Result<DeriveResult, VrfManagerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("derive_vrf_keypair_from_raw_prf");
        }
        self.call_operation(
            OperationCode::DeriveVrfKeypairFromRawPrf,
            &DeriveFromRawPrfParams {
                prf_output_b64u,
                user_id,
                vrf_input,
            },
        )
        .await
    }

    pub async fn generate_vrf_challenge(
        &self,
        vrf_input: VrfInputParams,
    ) -> Result<VrfChallengeData, VrfManagerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("generate_vrf_challenge");
        }
        self.call_operation(
            OperationCode::GenerateVrfChallenge,
            &ChallengeParams { vrf_input },
        )
        .await
    }

    pub async fn check_vrf_status(&self) -> Result<VrfStatus, VrfManagerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("check_vrf_status");
        }
        self.call_operation(OperationCode::CheckVrfStatus, &Value::Null)
            .await
    }

    pub async fn clear_vrf_session(&self) -> Result<(), VrfManagerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("clear_vrf_session");
        }
        self.call(OperationCode::ClearVrfSession.to_string(), Value::Null)
            .await
            .map(|_| ())
    }
}

impl Default for VrfWorkerManager {
    fn default() -> Self {
        Self::new()
    }
}
