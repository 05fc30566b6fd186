use std::sync::{Mutex, MutexGuard};

use chain_eth::address::{normalize_address, pubkey_bytes_to_eth_address};
use chain_eth::error::EthError;
use chain_eth::message::{decode_message_param, sign_personal_message};
use k256::ecdsa::SigningKey;
use serde_json::Value;
use tokio::sync::mpsc;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{ProviderEvent, ProviderFailure, RpcRequest, SigningProvider};

/// What the simulated user answers to prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Approve,
    Reject,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct LocalKey {
    #[zeroize(skip)]
    address: String,
    secret: [u8; 32],
}

struct LocalState {
    keys: Vec<LocalKey>,
    active: usize,
    authorized: bool,
    approval: Approval,
    chain_id: String,
    subscribers: Vec<mpsc::UnboundedSender<ProviderEvent>>,
    calls: Vec<&'static str>,
}

/// In-process provider holding secp256k1 keys.
///
/// Behaves like a browser wallet: accounts are exposed only after
/// `eth_requestAccounts`, `personal_sign` follows the wallet message
/// convention, and account or chain switches are pushed to subscribers.
pub struct LocalKeyProvider {
    available: bool,
    state: Mutex<LocalState>,
}

impl LocalKeyProvider {
    pub fn new(private_keys: &[[u8; 32]]) -> Result<Self, EthError> {
        let mut keys = Vec::with_capacity(private_keys.len());
        for private_key in private_keys {
            let signing_key = SigningKey::from_bytes(private_key.into())
                .map_err(|e| EthError::InvalidPrivateKey(e.to_string()))?;

            let encoded = signing_key.verifying_key().to_encoded_point(true);
            let mut compressed = [0u8; 33];
            compressed.copy_from_slice(encoded.as_bytes());

            keys.push(LocalKey {
                address: pubkey_bytes_to_eth_address(&compressed)?,
                secret: *private_key,
            });
        }

        Ok(Self {
            available: true,
            state: Mutex::new(LocalState {
                keys,
                active: 0,
                authorized: false,
                approval: Approval::Approve,
                chain_id: "0x1".to_string(),
                subscribers: Vec::new(),
                calls: Vec::new(),
            }),
        })
    }

    /// A provider that reports itself as not installed.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            state: Mutex::new(LocalState {
                keys: Vec::new(),
                active: 0,
                authorized: false,
                approval: Approval::Reject,
                chain_id: "0x1".to_string(),
                subscribers: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets the answer to all following prompts.
    pub fn set_approval(&self, approval: Approval) {
        self.lock().approval = approval;
    }

    /// Addresses in key order.
    pub fn addresses(&self) -> Vec<String> {
        self.lock().keys.iter().map(|k| k.address.clone()).collect()
    }

    /// Makes another key the active account and notifies subscribers.
    pub fn switch_account(&self, index: usize) {
        let mut state = self.lock();
        if index >= state.keys.len() {
            return;
        }
        state.active = index;
        if state.authorized {
            let accounts = state.ordered_accounts();
            state.emit(ProviderEvent::AccountsChanged(accounts));
        }
    }

    pub fn switch_chain(&self, chain_id: &str) {
        let mut state = self.lock();
        state.chain_id = chain_id.to_string();
        state.emit(ProviderEvent::ChainChanged(chain_id.to_string()));
    }

    /// Revokes account access, as when the user disconnects the site.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        state.authorized = false;
        state.emit(ProviderEvent::Disconnect);
    }

    /// Number of requests received for `method`.
    pub fn request_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|m| **m == method).count()
    }
}

impl LocalState {
    fn ordered_accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self.keys.iter().map(|k| k.address.clone()).collect();
        if self.active < accounts.len() {
            let active = accounts.remove(self.active);
            accounts.insert(0, active);
        }
        accounts
    }

    fn emit(&mut self, event: ProviderEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn personal_sign(&self, params: &Value) -> Result<Value, ProviderFailure> {
        let (account, message) = match params.as_array().map(Vec::as_slice) {
            Some([Value::String(account), Value::String(message)]) => (account, message),
            _ => {
                return Err(ProviderFailure::new(
                    -32602,
                    "personal_sign expects [account, message]",
                ))
            }
        };

        if !self.authorized {
            return Err(ProviderFailure::new(
                ProviderFailure::UNAUTHORIZED,
                "account access not granted",
            ));
        }

        let wanted = normalize_address(account)
            .map_err(|e| ProviderFailure::new(-32602, e.to_string()))?;
        let key = self
            .keys
            .iter()
            .find(|k| k.address == wanted)
            .ok_or_else(|| {
                ProviderFailure::new(ProviderFailure::UNAUTHORIZED, "unknown account")
            })?;

        if self.approval == Approval::Reject {
            return Err(ProviderFailure::user_rejected());
        }

        let signature = sign_personal_message(&decode_message_param(message), &key.secret)
            .map_err(|e| ProviderFailure::new(ProviderFailure::INTERNAL, e.to_string()))?;
        Ok(Value::String(format!("0x{}", hex::encode(signature))))
    }
}

#[async_trait::async_trait]
impl SigningProvider for LocalKeyProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderFailure> {
        if !self.available {
            return Err(ProviderFailure::new(
                ProviderFailure::DISCONNECTED,
                "provider not installed",
            ));
        }

        let mut state = self.lock();
        state.calls.push(request.method);

        match request.method {
            "eth_requestAccounts" => {
                if state.approval == Approval::Reject {
                    return Err(ProviderFailure::user_rejected());
                }
                state.authorized = true;
                Ok(Value::from(state.ordered_accounts()))
            }
            "eth_accounts" => {
                let accounts = if state.authorized {
                    state.ordered_accounts()
                } else {
                    Vec::new()
                };
                Ok(Value::from(accounts))
            }
            "eth_chainId" => Ok(Value::String(state.chain_id.clone())),
            "personal_sign" => state.personal_sign(&request.params),
            other => Err(ProviderFailure::new(
                ProviderFailure::UNSUPPORTED_METHOD,
                format!("unsupported method {other}"),
            )),
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_eth::message::encode_message_param;
    use chain_eth::signature::{recover_personal_signer, RecoverableSignature};

    fn key(n: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = n;
        key
    }

    #[tokio::test]
    async fn accounts_require_request() {
        let provider = LocalKeyProvider::new(&[key(1)]).unwrap();
        let before = provider
            .request(RpcRequest {
                method: "eth_accounts",
                params: Value::Array(vec![]),
            })
            .await
            .unwrap();
        assert_eq!(before, Value::Array(vec![]));

        let accounts = provider.request(RpcRequest::request_accounts()).await.unwrap();
        assert_eq!(
            accounts,
            serde_json::json!(["0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"])
        );
    }

    #[tokio::test]
    async fn personal_sign_signs_decoded_bytes() {
        let provider = LocalKeyProvider::new(&[key(1)]).unwrap();
        provider.request(RpcRequest::request_accounts()).await.unwrap();

        let account = provider.addresses()[0].clone();
        let message = [0x04u8, 0x00, 0x01];
        let response = provider
            .request(RpcRequest::personal_sign(
                &account,
                encode_message_param(&message),
            ))
            .await
            .unwrap();

        let sig = RecoverableSignature::from_rpc(response.as_str().unwrap()).unwrap();
        let recovered = recover_personal_signer(&message, &sig).unwrap();
        assert_eq!(
            hex::encode(recovered),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
    }

    #[tokio::test]
    async fn rejection_uses_4001() {
        let provider = LocalKeyProvider::new(&[key(1)]).unwrap();
        provider.set_approval(Approval::Reject);
        let err = provider
            .request(RpcRequest::request_accounts())
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderFailure::USER_REJECTED);
    }

    #[tokio::test]
    async fn switch_account_reorders_and_notifies() {
        let provider = LocalKeyProvider::new(&[key(1), key(2)]).unwrap();
        let mut events = provider.subscribe();
        provider.request(RpcRequest::request_accounts()).await.unwrap();

        provider.switch_account(1);
        let addresses = provider.addresses();
        assert_eq!(
            events.recv().await,
            Some(ProviderEvent::AccountsChanged(vec![
                addresses[1].clone(),
                addresses[0].clone()
            ]))
        );
    }

    #[tokio::test]
    async fn unavailable_provider_fails_requests() {
        let provider = LocalKeyProvider::unavailable();
        assert!(!provider.is_available());
        let err = provider
            .request(RpcRequest::request_accounts())
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderFailure::DISCONNECTED);
    }

    #[test]
    fn invalid_key_is_rejected() {
        assert!(LocalKeyProvider::new(&[[0u8; 32]]).is_err());
    }
}
