//! Adapter over the external signing provider.
//!
//! Owns the provider's event stream and keeps the provider's current
//! account list. Queued events are applied before any read of that state,
//! and each applied event is kept as a [`GatewayChange`] until the owner
//! takes it with [`ExternalSignerGateway::next_change`] or
//! [`ExternalSignerGateway::try_next_change`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use chain_eth::message::encode_message_param;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::SignerError;
use crate::provider::{ProviderEvent, ProviderFailure, RpcRequest, SigningProvider};
use crate::types::{ExternalAddress, Signature};

/// A provider event after it has been applied to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayChange {
    Accounts {
        previous: Option<ExternalAddress>,
        active: Option<ExternalAddress>,
    },
    Network {
        chain_id: Option<String>,
    },
}

impl GatewayChange {
    /// Whether the active account (or the network) is different now.
    pub fn is_identity_change(&self) -> bool {
        match self {
            GatewayChange::Accounts { previous, active } => previous != active,
            GatewayChange::Network { .. } => true,
        }
    }
}

pub struct ExternalSignerGateway<P> {
    provider: Arc<P>,
    accounts: watch::Sender<Vec<ExternalAddress>>,
    chain_id: Option<String>,
    events: mpsc::UnboundedReceiver<ProviderEvent>,
    /// Applied but not yet taken.
    pending: VecDeque<GatewayChange>,
}

impl<P: SigningProvider + 'static> ExternalSignerGateway<P> {
    pub fn new(provider: Arc<P>) -> Self {
        let events = provider.subscribe();
        let (accounts, _) = watch::channel(Vec::new());
        Self {
            provider,
            accounts,
            chain_id: None,
            events,
            pending: VecDeque::new(),
        }
    }

    /// Reports whether a provider is present. Never prompts.
    pub fn detect_provider(&self) -> bool {
        self.provider.is_available()
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Accounts as last reported by the provider. First entry is active.
    pub fn current_accounts(&mut self) -> Vec<ExternalAddress> {
        self.sync();
        self.accounts.borrow().clone()
    }

    pub fn active_account(&mut self) -> Option<ExternalAddress> {
        self.sync();
        self.accounts.borrow().first().cloned()
    }

    /// Active account as of the last applied event, without applying more.
    pub(crate) fn applied_active_account(&self) -> Option<ExternalAddress> {
        self.accounts.borrow().first().cloned()
    }

    pub fn chain_id(&mut self) -> Option<&str> {
        self.sync();
        self.chain_id.as_deref()
    }

    /// Applies every event the provider has queued. Returns how many were
    /// applied.
    ///
    /// Applied changes stay queued for [`Self::next_change`] and
    /// [`Self::try_next_change`].
    pub fn sync(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            let change = self.apply(event);
            self.pending.push_back(change);
            applied += 1;
        }
        applied
    }

    /// Observes the account list. Updated whenever the gateway applies
    /// provider events.
    pub fn watch_accounts(&self) -> watch::Receiver<Vec<ExternalAddress>> {
        self.accounts.subscribe()
    }

    /// Asks the provider for account access. May show a prompt.
    ///
    /// On success the account list is replaced and returned.
    pub async fn activate(&self) -> Result<Vec<ExternalAddress>, SignerError> {
        if !self.detect_provider() {
            return Err(SignerError::ProviderMissing);
        }

        let response = send(self.provider.as_ref(), RpcRequest::request_accounts()).await?;
        let entries = response.as_array().ok_or_else(|| {
            SignerError::ProviderError(format!(
                "eth_requestAccounts returned {response} instead of an account list"
            ))
        })?;

        let mut accounts = Vec::with_capacity(entries.len());
        for entry in entries {
            let address = entry.as_str().ok_or_else(|| {
                SignerError::ProviderError(format!("account entry {entry} is not a string"))
            })?;
            accounts.push(ExternalAddress::parse(address)?);
        }

        if accounts.is_empty() {
            return Err(SignerError::ProviderError(
                "provider authorized no accounts".into(),
            ));
        }

        self.accounts.send_replace(accounts.clone());
        Ok(accounts)
    }

    /// Asks the provider to `personal_sign` `payload` with `signer`.
    pub async fn request_signature(
        &self,
        signer: &ExternalAddress,
        payload: &[u8],
    ) -> Result<Signature, SignerError> {
        self.signature_request(signer.clone(), payload.to_vec())
            .await
    }

    /// Same as [`Self::request_signature`], but the returned future does
    /// not borrow the gateway, so events can be pulled while it runs.
    pub fn signature_request(
        &self,
        signer: ExternalAddress,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send + 'static {
        let provider = Arc::clone(&self.provider);
        async move {
            if !provider.is_available() {
                return Err(SignerError::ProviderMissing);
            }

            let request = RpcRequest::personal_sign(signer.as_str(), encode_message_param(&payload));
            match send(provider.as_ref(), request).await? {
                Value::String(raw) => Signature::from_rpc(&raw),
                other => Err(SignerError::MalformedSignature(format!(
                    "expected a signature string, got {other}"
                ))),
            }
        }
    }

    /// Waits for the next provider event and applies it.
    ///
    /// Returns `None` once the provider has dropped its side of the stream.
    pub async fn next_change(&mut self) -> Option<GatewayChange> {
        if let Some(change) = self.pending.pop_front() {
            return Some(change);
        }
        let event = self.events.recv().await?;
        Some(self.apply(event))
    }

    /// Takes the next change without waiting.
    pub fn try_next_change(&mut self) -> Option<GatewayChange> {
        self.sync();
        self.pending.pop_front()
    }

    fn apply(&mut self, event: ProviderEvent) -> GatewayChange {
        debug!(?event, "provider event");
        match event {
            ProviderEvent::AccountsChanged(raw) => {
                let accounts: Vec<ExternalAddress> = raw
                    .iter()
                    .filter_map(|address| match ExternalAddress::parse(address) {
                        Ok(address) => Some(address),
                        Err(e) => {
                            warn!(%address, error = %e, "ignoring malformed account from provider");
                            None
                        }
                    })
                    .collect();
                self.replace_accounts(accounts)
            }
            ProviderEvent::ChainChanged(chain_id) => {
                self.chain_id = Some(chain_id);
                GatewayChange::Network {
                    chain_id: self.chain_id.clone(),
                }
            }
            ProviderEvent::Disconnect => self.replace_accounts(Vec::new()),
        }
    }

    fn replace_accounts(&mut self, accounts: Vec<ExternalAddress>) -> GatewayChange {
        let active = accounts.first().cloned();
        let previous = self.accounts.send_replace(accounts).first().cloned();
        GatewayChange::Accounts { previous, active }
    }
}

/// Sends one request, logging it and mapping provider failures.
async fn send<P: SigningProvider + ?Sized>(
    provider: &P,
    request: RpcRequest,
) -> Result<Value, SignerError> {
    debug!(
        request = %serde_json::to_string(&request).unwrap_or_default(),
        "sending provider request"
    );

    let method = request.method;
    provider.request(request).await.map_err(|failure| {
        debug!(method, code = failure.code, message = %failure.message, "provider request failed");
        map_failure(failure)
    })
}

fn map_failure(failure: ProviderFailure) -> SignerError {
    if failure.code == ProviderFailure::USER_REJECTED {
        SignerError::UserRejected(failure.message)
    } else {
        SignerError::ProviderError(failure.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::local::{Approval, LocalKeyProvider};

    fn key(n: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = n;
        key
    }

    fn gateway(keys: &[[u8; 32]]) -> (Arc<LocalKeyProvider>, ExternalSignerGateway<LocalKeyProvider>) {
        let provider = Arc::new(LocalKeyProvider::new(keys).unwrap());
        let gateway = ExternalSignerGateway::new(Arc::clone(&provider));
        (provider, gateway)
    }

    /// Answers every request with the same JSON value.
    struct FixedResponse(Value);

    #[async_trait::async_trait]
    impl SigningProvider for FixedResponse {
        fn is_available(&self) -> bool {
            true
        }

        async fn request(&self, _request: RpcRequest) -> Result<Value, ProviderFailure> {
            Ok(self.0.clone())
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
            mpsc::unbounded_channel().1
        }
    }

    #[tokio::test]
    async fn detect_does_not_prompt() {
        let (provider, gateway) = gateway(&[key(1)]);
        assert!(gateway.detect_provider());
        assert_eq!(provider.request_count("eth_requestAccounts"), 0);

        let missing = ExternalSignerGateway::new(Arc::new(LocalKeyProvider::unavailable()));
        assert!(!missing.detect_provider());
    }

    #[tokio::test]
    async fn activate_replaces_accounts() {
        let (_provider, mut gateway) = gateway(&[key(1), key(2)]);
        let mut watcher = gateway.watch_accounts();
        assert!(gateway.current_accounts().is_empty());

        let accounts = gateway.activate().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(
            gateway.active_account().unwrap().as_str(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), accounts);
    }

    #[tokio::test]
    async fn activate_without_provider() {
        let gateway = ExternalSignerGateway::new(Arc::new(LocalKeyProvider::unavailable()));
        assert_eq!(gateway.activate().await, Err(SignerError::ProviderMissing));
    }

    #[tokio::test]
    async fn rejection_maps_to_user_rejected() {
        let (provider, mut gateway) = gateway(&[key(1)]);
        provider.set_approval(Approval::Reject);
        let err = gateway.activate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserRejected);
        assert!(gateway.current_accounts().is_empty());
    }

    #[tokio::test]
    async fn signature_for_active_account() {
        let (_provider, gateway) = gateway(&[key(1)]);
        let account = gateway.activate().await.unwrap().remove(0);
        let sig = gateway
            .request_signature(&account, b"hello world")
            .await
            .unwrap();
        assert!(sig.as_rpc().starts_with("0x"));
        assert_eq!(sig.to_bytes().len(), 65);
    }

    #[tokio::test]
    async fn rejected_signature() {
        let (provider, gateway) = gateway(&[key(1)]);
        let account = gateway.activate().await.unwrap().remove(0);
        provider.set_approval(Approval::Reject);
        let err = gateway
            .request_signature(&account, b"hello world")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserRejected);
        assert!(err.kind().is_retryable());
    }

    #[tokio::test]
    async fn other_provider_codes_are_provider_errors() {
        let (_provider, gateway) = gateway(&[key(1)]);
        // personal_sign before eth_requestAccounts is unauthorized (4100).
        let account = ExternalAddress::parse("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap();
        let err = gateway
            .request_signature(&account, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderError);
        assert!(err.to_string().contains("4100"));
    }

    #[tokio::test]
    async fn null_signature_is_malformed() {
        let gateway = ExternalSignerGateway::new(Arc::new(FixedResponse(Value::Null)));
        let account = ExternalAddress::parse("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap();
        let err = gateway
            .request_signature(&account, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
    }

    #[tokio::test]
    async fn short_signature_is_malformed() {
        let gateway =
            ExternalSignerGateway::new(Arc::new(FixedResponse(Value::String("0x1234".into()))));
        let account = ExternalAddress::parse("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap();
        let err = gateway
            .request_signature(&account, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSignature);
    }

    #[tokio::test]
    async fn empty_account_list_is_an_error() {
        let gateway = ExternalSignerGateway::new(Arc::new(FixedResponse(Value::Array(vec![]))));
        let err = gateway.activate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderError);
    }

    #[tokio::test]
    async fn events_apply_before_reads() {
        let (provider, mut gateway) = gateway(&[key(1), key(2)]);
        let accounts = gateway.activate().await.unwrap();
        let mut watcher = gateway.watch_accounts();
        watcher.borrow_and_update();

        provider.switch_account(1);
        assert_eq!(gateway.active_account(), Some(accounts[1].clone()));
        assert!(watcher.has_changed().unwrap());
        assert_eq!(watcher.borrow_and_update()[0], accounts[1]);

        // The change is still reported once.
        let change = gateway.next_change().await.unwrap();
        assert_eq!(
            change,
            GatewayChange::Accounts {
                previous: Some(accounts[0].clone()),
                active: Some(accounts[1].clone()),
            }
        );
        assert!(change.is_identity_change());
        assert!(gateway.try_next_change().is_none());
    }

    #[tokio::test]
    async fn sync_counts_applied_events() {
        let (provider, mut gateway) = gateway(&[key(1), key(2)]);
        gateway.activate().await.unwrap();
        assert_eq!(gateway.sync(), 0);

        provider.switch_account(1);
        provider.switch_chain("0x5");
        assert_eq!(gateway.sync(), 2);
        assert_eq!(gateway.chain_id(), Some("0x5"));
        assert!(gateway.try_next_change().is_some());
        assert!(gateway.try_next_change().is_some());
        assert!(gateway.try_next_change().is_none());
    }

    #[tokio::test]
    async fn chain_change_and_disconnect() {
        let (provider, mut gateway) = gateway(&[key(1)]);
        gateway.activate().await.unwrap();

        provider.switch_chain("0x2a");
        provider.disconnect();

        let change = gateway.try_next_change().unwrap();
        assert_eq!(
            change,
            GatewayChange::Network {
                chain_id: Some("0x2a".into())
            }
        );
        assert_eq!(gateway.chain_id(), Some("0x2a"));

        let change = gateway.try_next_change().unwrap();
        assert!(change.is_identity_change());
        assert!(gateway.current_accounts().is_empty());
    }
}
