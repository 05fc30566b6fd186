use std::future::{self, Future};
use std::sync::Arc;

use chain_substrate::ss58::NetworkPrefix;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::handle::{Command, Intent, Reply, WorkflowHandle};
use super::state::{WorkflowSnapshot, WorkflowState};
use crate::binder::{AccountBinder, BinderChange};
use crate::codec::{ledger_address_matches, recover_public_key};
use crate::config::BridgeConfig;
use crate::error::{ErrorKind, SignerError};
use crate::gateway::ExternalSignerGateway;
use crate::ledger::LedgerClient;
use crate::provider::SigningProvider;
use crate::types::{BoundIdentity, CallPayload, Signature, SignedCall, SigningRequest, TxHash};

/// How a suspended operation ended.
enum Settled<T> {
    Done(T),
    /// A cancel intent arrived. Carries its reply.
    Cancelled(Reply),
    /// The binding the operation depends on was discarded.
    Invalidated,
}

/// Drives one payload at a time from selection to submission.
///
/// Suspends at account activation, signing and submission. While
/// suspended it keeps serving intents: `cancel` drops the in-flight
/// request, anything else is refused with [`SignerError::Busy`].
pub struct SignAndSubmitWorkflow<P, L> {
    binder: AccountBinder<P>,
    ledger: Arc<L>,
    prefix: NetworkPrefix,
    command_buffer: usize,
    state: WorkflowState,
    payload: Option<CallPayload>,
    signed: Option<SignedCall>,
    last_error: Option<SignerError>,
    last_receipt: Option<TxHash>,
    snapshots: watch::Sender<WorkflowSnapshot>,
}

impl<P, L> SignAndSubmitWorkflow<P, L>
where
    P: SigningProvider + 'static,
    L: LedgerClient + 'static,
{
    pub fn new(
        binder: AccountBinder<P>,
        ledger: Arc<L>,
        config: &BridgeConfig,
    ) -> Result<Self, SignerError> {
        config.validate()?;
        let (snapshots, _) = watch::channel(WorkflowSnapshot::default());
        Ok(Self {
            binder,
            ledger,
            prefix: config.prefix()?,
            command_buffer: config.command_buffer,
            state: WorkflowState::Idle,
            payload: None,
            signed: None,
            last_error: None,
            last_receipt: None,
            snapshots,
        })
    }

    /// Builds the gateway and binder for `provider`.
    pub fn with_provider(
        provider: Arc<P>,
        ledger: Arc<L>,
        config: &BridgeConfig,
    ) -> Result<Self, SignerError> {
        let binder = AccountBinder::new(ExternalSignerGateway::new(provider), config);
        Self::new(binder, ledger, config)
    }

    /// Starts the workflow on the current tokio runtime.
    pub fn spawn(self) -> WorkflowHandle {
        let (commands, receiver) = mpsc::channel(self.command_buffer);
        let handle = WorkflowHandle::new(commands, self.snapshots.subscribe());
        tokio::spawn(self.run(receiver));
        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(prefix = %self.prefix, "workflow started");
        self.publish();

        loop {
            tokio::select! {
                biased;
                Some(change) = self.binder.next_change() => self.on_change(change),
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command, &mut commands).await,
                    None => break,
                },
            }
        }

        info!("workflow stopped");
    }

    async fn dispatch(&mut self, command: Command, commands: &mut mpsc::Receiver<Command>) {
        let Command { intent, reply } = command;
        let name = intent.name();

        let result = match intent {
            Intent::Connect => self.connect(commands).await,
            Intent::SelectPayload(payload) => self.select_payload(payload),
            Intent::Sign => self.sign(commands).await,
            Intent::Submit => self.submit(commands).await,
            Intent::Cancel => Ok(self.cancel()),
        };

        if let Err(e) = &result {
            debug!(intent = name, error = %e, "intent failed");
        }
        self.publish();
        let _ = reply.send(result);
    }

    async fn connect(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
    ) -> Result<WorkflowState, SignerError> {
        if self.state != WorkflowState::Idle {
            return Err(self.refuse("connect"));
        }

        self.last_error = None;
        self.transition(WorkflowState::AccountPending);
        self.publish();

        let prefix = self.prefix;
        let bind = self.binder.bind(prefix);
        match supervise(bind, commands, None::<&mut AccountBinder<P>>).await {
            Settled::Done(Ok(identity)) => {
                // Changes queued while the prompt was open apply now.
                self.binder.drain_changes();
                if self.binder.public_key().is_none() {
                    return Err(self.fail(SignerError::StaleBinding));
                }
                info!(account = %identity.external_address, "account connected");
                self.transition(WorkflowState::AccountReady);
                Ok(self.state)
            }
            Settled::Done(Err(e)) => Err(self.fail(e)),
            Settled::Cancelled(reply) => Err(self.abandon(reply)),
            Settled::Invalidated => Err(self.fail(SignerError::StaleBinding)),
        }
    }

    fn select_payload(&mut self, payload: CallPayload) -> Result<WorkflowState, SignerError> {
        if !self.state.has_account() {
            return Err(self.refuse("select payload"));
        }

        if self.signed.take().is_some() {
            debug!("discarded signature over the previous payload");
        }
        debug!(?payload, "payload selected");
        self.payload = Some(payload);
        self.last_error = None;
        self.transition(WorkflowState::PayloadSelected);
        Ok(self.state)
    }

    async fn sign(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
    ) -> Result<WorkflowState, SignerError> {
        let payload = match (self.state, &self.payload) {
            (WorkflowState::PayloadSelected | WorkflowState::Failed(_), Some(payload)) => {
                payload.clone()
            }
            _ => return Err(self.refuse("sign")),
        };
        let requester = match self.binder.identity() {
            Some(identity) if identity.is_bound() => identity.external_address,
            _ => return Err(self.fail(SignerError::StaleBinding)),
        };

        let message = self.ledger.signing_payload(&payload);
        let request = SigningRequest {
            payload,
            requester,
            message,
        };

        self.signed = None;
        self.last_error = None;
        self.transition(WorkflowState::AwaitingSignature);
        self.publish();

        let op = self
            .binder
            .gateway()
            .signature_request(request.requester.clone(), request.message.clone());

        match supervise(op, commands, Some(&mut self.binder)).await {
            Settled::Done(Ok(signature)) => {
                if self.binder.drain_changes() {
                    return Err(self.fail(SignerError::StaleBinding));
                }
                if let Err(e) = self.check_signer(&request, &signature) {
                    return Err(self.fail(e));
                }
                info!(account = %request.requester, %signature, "payload signed");
                self.signed = Some(SignedCall { request, signature });
                self.transition(WorkflowState::Signed);
                Ok(self.state)
            }
            Settled::Done(Err(e)) => Err(self.fail(e)),
            Settled::Cancelled(reply) => Err(self.abandon(reply)),
            Settled::Invalidated => Err(self.fail(SignerError::StaleBinding)),
        }
    }

    /// The payload signature must come from the key the account was bound with.
    fn check_signer(
        &mut self,
        request: &SigningRequest,
        signature: &Signature,
    ) -> Result<(), SignerError> {
        let recovered = recover_public_key(request.requester.as_str(), &request.message, signature)?;
        match self.binder.public_key() {
            Some(expected) if expected == recovered => Ok(()),
            Some(expected) => Err(SignerError::SignerMismatch {
                expected: expected.to_hex(),
                recovered: recovered.to_hex(),
            }),
            None => Err(SignerError::StaleBinding),
        }
    }

    async fn submit(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
    ) -> Result<WorkflowState, SignerError> {
        let signed = match (self.state, &self.signed) {
            (WorkflowState::Signed, Some(signed)) => signed.clone(),
            _ => return Err(self.refuse("submit")),
        };
        let sender = match self.binder.identity() {
            Some(BoundIdentity {
                external_address,
                ledger_address: Some(ledger_address),
            }) if external_address == signed.request.requester => ledger_address,
            _ => return Err(self.fail(SignerError::StaleBinding)),
        };
        let public_key = match self.binder.public_key() {
            Some(public_key) => public_key,
            None => return Err(self.fail(SignerError::StaleBinding)),
        };
        match ledger_address_matches(&public_key, &sender) {
            Ok(true) => {}
            Ok(false) => return Err(self.fail(SignerError::StaleBinding)),
            Err(e) => return Err(self.fail(e)),
        }

        self.transition(WorkflowState::Submitting);
        self.publish();

        let ledger = Arc::clone(&self.ledger);
        let op = async move {
            ledger
                .submit_unsigned(&signed.request.payload, &sender, &signed.signature)
                .await
        };

        match supervise(op, commands, Some(&mut self.binder)).await {
            Settled::Done(Ok(tx_hash)) => {
                info!(%tx_hash, "call submitted");
                self.last_receipt = Some(tx_hash);
                self.transition(WorkflowState::Submitted);
                Ok(self.state)
            }
            Settled::Done(Err(e)) => Err(self.fail(e.into())),
            Settled::Cancelled(reply) => Err(self.abandon(reply)),
            Settled::Invalidated => Err(self.fail(SignerError::StaleBinding)),
        }
    }

    fn cancel(&mut self) -> WorkflowState {
        if self.state != WorkflowState::Idle {
            info!(state = %self.state, "workflow cancelled");
        }
        self.reset();
        self.state
    }

    /// Cancels a suspended operation and answers the cancel intent.
    fn abandon(&mut self, reply: Reply) -> SignerError {
        let state = self.cancel();
        self.publish();
        let _ = reply.send(Ok(state));
        SignerError::Cancelled
    }

    /// Provider change seen while no operation is in flight.
    fn on_change(&mut self, change: BinderChange) {
        debug!(change = ?change.change, invalidated = change.invalidated, "provider change");
        self.publish();
    }

    /// Resets when the binding the current state relies on is gone.
    ///
    /// Suspended operations are left to `supervise`.
    fn check_binding(&mut self) {
        if self.state.has_account()
            && !self.state.is_suspended()
            && self.binder.public_key().is_none()
        {
            warn!(state = %self.state, "binding invalidated");
            self.fail(SignerError::StaleBinding);
        }
    }

    /// Records `error` and moves to the state its kind calls for.
    fn fail(&mut self, error: SignerError) -> SignerError {
        let kind = error.kind();
        if kind == ErrorKind::StaleBinding {
            warn!(state = %self.state, "account or network changed, resetting");
            self.reset();
        } else if self.state == WorkflowState::AccountPending {
            self.transition(WorkflowState::Idle);
        } else if matches!(kind, ErrorKind::UserRejected | ErrorKind::ProviderError) {
            // The account stays bound and the selection stays.
            let next = if self.payload.is_some() {
                WorkflowState::PayloadSelected
            } else {
                WorkflowState::AccountReady
            };
            self.transition(next);
        } else {
            if kind == ErrorKind::SubmissionFailed {
                self.signed = None;
            }
            self.transition(WorkflowState::Failed(kind));
        }
        self.last_error = Some(error.clone());
        error
    }

    fn refuse(&self, intent: &'static str) -> SignerError {
        warn!(intent, state = %self.state, "intent not allowed");
        SignerError::InvalidState {
            intent,
            state: self.state.name(),
        }
    }

    fn reset(&mut self) {
        self.payload = None;
        self.signed = None;
        self.transition(WorkflowState::Idle);
    }

    fn transition(&mut self, next: WorkflowState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    fn publish(&mut self) {
        self.check_binding();
        let identity = self.binder.identity();
        self.snapshots.send_replace(WorkflowSnapshot {
            state: self.state,
            identity,
            payload: self.payload.clone(),
            signed: self.signed.clone(),
            last_error: self.last_error.clone(),
            last_receipt: self.last_receipt.clone(),
        });
    }
}

/// Runs `op` while serving intents and, if `binder` is given, provider
/// changes. Intents are checked first, then invalidations, then the op.
async fn supervise<P, F>(
    op: F,
    commands: &mut mpsc::Receiver<Command>,
    mut binder: Option<&mut AccountBinder<P>>,
) -> Settled<F::Output>
where
    P: SigningProvider + 'static,
    F: Future,
{
    tokio::pin!(op);
    loop {
        tokio::select! {
            biased;
            Some(command) = commands.recv() => {
                if let Intent::Cancel = command.intent {
                    return Settled::Cancelled(command.reply);
                }
                warn!(intent = command.intent.name(), "request in flight, refusing intent");
                let _ = command.reply.send(Err(SignerError::Busy));
            }
            _ = next_invalidation(&mut binder) => return Settled::Invalidated,
            output = &mut op => return Settled::Done(output),
        }
    }
}

async fn next_invalidation<P: SigningProvider + 'static>(
    binder: &mut Option<&mut AccountBinder<P>>,
) {
    let Some(binder) = binder else {
        return future::pending().await;
    };
    loop {
        match binder.next_change().await {
            Some(change) if change.invalidated => return,
            Some(_) => {}
            None => return future::pending().await,
        }
    }
}
