#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use signer_core::provider::local::LocalKeyProvider;
use signer_core::provider::{ProviderEvent, ProviderFailure, RpcRequest, SigningProvider};
use signer_core::{
    BridgeConfig, CallPayload, LedgerAddress, LedgerClient, LedgerError, SignAndSubmitWorkflow,
    Signature, TxHash, WorkflowHandle,
};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

pub const KEY_ONE_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
pub const KEY_ONE_LEDGER: &str = "5D14rgDrpYMeQDnqqnrVRDySA8AYLrwyKC13scBZgmhSh9ur";
pub const KEY_TWO_LEDGER: &str = "5GR9dMZ7gN3SHVqDKQqqSCrLpNfaJFF2NP8CRKWkuC28iDYr";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn key(n: u8) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[31] = n;
    key
}

/// `personal_sign` signature by key `n` in provider wire form.
pub fn rpc_signature(message: &[u8], n: u8) -> String {
    let raw = chain_eth::message::sign_personal_message(message, &key(n)).unwrap();
    format!("0x{}", hex::encode(raw))
}

enum Script {
    /// Wait for the gate before answering normally.
    Hold(oneshot::Receiver<()>),
    /// Answer with this value instead of signing.
    Respond(Value),
}

/// Local-key provider whose `personal_sign` answers can be scripted.
///
/// Scripts apply to `personal_sign` requests in order; unscripted requests
/// are answered by the wrapped [`LocalKeyProvider`].
pub struct ScriptedProvider {
    inner: LocalKeyProvider,
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedProvider {
    pub fn new(keys: &[[u8; 32]]) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalKeyProvider::new(keys).unwrap(),
            scripts: Mutex::new(VecDeque::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalKeyProvider::unavailable(),
            scripts: Mutex::new(VecDeque::new()),
        })
    }

    pub fn local(&self) -> &LocalKeyProvider {
        &self.inner
    }

    /// Holds the next signature until the returned sender fires.
    pub fn hold_next_signature(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.scripts.lock().unwrap().push_back(Script::Hold(rx));
        tx
    }

    pub fn respond_next_signature(&self, value: Value) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Respond(value));
    }
}

#[async_trait::async_trait]
impl SigningProvider for ScriptedProvider {
    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderFailure> {
        if request.method == "personal_sign" {
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(Script::Hold(gate)) => {
                    if gate.await.is_err() {
                        return Err(ProviderFailure::new(
                            ProviderFailure::DISCONNECTED,
                            "gate dropped",
                        ));
                    }
                }
                Some(Script::Respond(value)) => {
                    let _ = self.inner.request(request).await;
                    return Ok(value);
                }
                None => {}
            }
        }
        self.inner.request(request).await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        self.inner.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub payload: Vec<u8>,
    pub sender: LedgerAddress,
    pub signature: Signature,
}

/// Ledger client that records what it is asked to submit.
#[derive(Default)]
pub struct RecordingLedger {
    submissions: Mutex<Vec<Submission>>,
    failures: Mutex<VecDeque<LedgerError>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl RecordingLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn fail_next(&self, error: LedgerError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Holds the next submission until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }
}

#[async_trait::async_trait]
impl LedgerClient for RecordingLedger {
    async fn submit_unsigned(
        &self,
        payload: &CallPayload,
        sender: &LedgerAddress,
        signature: &Signature,
    ) -> Result<TxHash, LedgerError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.await
                .map_err(|_| LedgerError::Transport("gate dropped".into()))?;
        }

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(Submission {
            payload: payload.as_bytes().to_vec(),
            sender: sender.clone(),
            signature: signature.clone(),
        });
        Ok(TxHash(format!("0x{:064x}", submissions.len())))
    }
}

pub fn spawn_workflow(
    provider: &Arc<ScriptedProvider>,
    ledger: &Arc<RecordingLedger>,
    config: &BridgeConfig,
) -> WorkflowHandle {
    SignAndSubmitWorkflow::with_provider(Arc::clone(provider), Arc::clone(ledger), config)
        .unwrap()
        .spawn()
}
