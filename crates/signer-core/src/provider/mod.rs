//! Port to the external signing provider (an EIP-1193 style wallet).

pub mod local;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use local::LocalKeyProvider;

/// A JSON-RPC style request, as passed to `provider.request(...)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn request_accounts() -> Self {
        Self {
            method: "eth_requestAccounts",
            params: Value::Array(Vec::new()),
        }
    }

    /// `personal_sign` with `[account, message]` params.
    pub fn personal_sign(account: &str, message_param: String) -> Self {
        Self {
            method: "personal_sign",
            params: Value::Array(vec![
                Value::String(account.to_string()),
                Value::String(message_param),
            ]),
        }
    }
}

/// Error object returned by the provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("provider error {code}: {message}")]
pub struct ProviderFailure {
    pub code: i64,
    pub message: String,
}

impl ProviderFailure {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }
}

/// Notifications the provider emits on its own initiative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// New account list; the first entry is the active account.
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Disconnect,
}

/// The signing provider as seen from this crate.
#[async_trait::async_trait]
pub trait SigningProvider: Send + Sync {
    /// Whether a provider is installed. Must not prompt the user.
    fn is_available(&self) -> bool;

    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderFailure>;

    /// Opens a new event subscription.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}
