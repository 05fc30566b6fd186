//! Custom-signature bridge between an external ECDSA signer and a ledger.
//!
//! An account held by an external wallet (EIP-1193 style provider) is
//! bound to a ledger address derived from its public key. Calls for the
//! ledger are signed by the wallet with `personal_sign` and submitted as
//! unsigned transactions carrying that signature.
//!
//! - [`codec`]: public-key recovery and ledger address derivation
//! - [`gateway`]: adapter over the signing provider
//! - [`binder`]: keeps the bound identity in step with the active account
//! - [`workflow`]: the connect, sign and submit state machine

pub mod binder;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod provider;
pub mod types;
pub mod workflow;

pub use binder::AccountBinder;
pub use config::BridgeConfig;
pub use error::{ErrorKind, SignerError};
pub use gateway::ExternalSignerGateway;
pub use ledger::{LedgerClient, LedgerError};
pub use provider::{LocalKeyProvider, SigningProvider};
pub use types::{
    BoundIdentity, CallPayload, ExternalAddress, LedgerAddress, PublicKey, Signature, SignedCall,
    SigningRequest, TxHash,
};
pub use workflow::{SignAndSubmitWorkflow, WorkflowHandle, WorkflowSnapshot, WorkflowState};

pub use chain_substrate::ss58::NetworkPrefix;
