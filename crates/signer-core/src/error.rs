use std::fmt;

use chain_eth::error::EthError;
use chain_substrate::error::SubstrateError;
use thiserror::Error;

/// Every failure the bridge can report to its caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("no signing provider detected")]
    ProviderMissing,

    #[error("request rejected by user: {0}")]
    UserRejected(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The recovered key does not belong to the account that was asked to sign.
    #[error("signer mismatch: expected {expected}, recovered {recovered}")]
    SignerMismatch { expected: String, recovered: String },

    #[error("invalid call payload: {0}")]
    InvalidPayload(String),

    #[error("account or network changed while the request was in flight")]
    StaleBinding,

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("another request is already in flight")]
    Busy,

    #[error("cannot {intent} while {state}")]
    InvalidState {
        intent: &'static str,
        state: &'static str,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("workflow is no longer running")]
    Closed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Classification of a [`SignerError`], preserved all the way to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProviderMissing,
    UserRejected,
    ProviderError,
    MalformedSignature,
    InvalidSignature,
    InvalidAddress,
    InvalidPayload,
    StaleBinding,
    SubmissionFailed,
    Busy,
    InvalidState,
    Cancelled,
    Closed,
    Config,
}

impl ErrorKind {
    /// Whether re-issuing the same request by user action can succeed.
    ///
    /// Cryptographic and format failures are structural and would repeat.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::UserRejected
                | ErrorKind::ProviderError
                | ErrorKind::SubmissionFailed
                | ErrorKind::Busy
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SignerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignerError::ProviderMissing => ErrorKind::ProviderMissing,
            SignerError::UserRejected(_) => ErrorKind::UserRejected,
            SignerError::ProviderError(_) => ErrorKind::ProviderError,
            SignerError::MalformedSignature(_) => ErrorKind::MalformedSignature,
            SignerError::InvalidSignature(_) | SignerError::SignerMismatch { .. } => {
                ErrorKind::InvalidSignature
            }
            SignerError::InvalidAddress(_) => ErrorKind::InvalidAddress,
            SignerError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            SignerError::StaleBinding => ErrorKind::StaleBinding,
            SignerError::SubmissionFailed(_) => ErrorKind::SubmissionFailed,
            SignerError::Busy => ErrorKind::Busy,
            SignerError::InvalidState { .. } => ErrorKind::InvalidState,
            SignerError::Cancelled => ErrorKind::Cancelled,
            SignerError::Closed => ErrorKind::Closed,
            SignerError::InvalidConfig(_) => ErrorKind::Config,
        }
    }
}

impl From<EthError> for SignerError {
    fn from(e: EthError) -> Self {
        match e {
            EthError::InvalidAddress(msg) => SignerError::InvalidAddress(msg),
            EthError::MalformedSignature(msg) => SignerError::MalformedSignature(msg),
            EthError::InvalidSignature(msg) | EthError::InvalidPublicKey(msg) => {
                SignerError::InvalidSignature(msg)
            }
            EthError::InvalidPrivateKey(msg) | EthError::SigningError(msg) => {
                SignerError::ProviderError(msg)
            }
        }
    }
}

impl From<SubstrateError> for SignerError {
    fn from(e: SubstrateError) -> Self {
        SignerError::InvalidConfig(e.to_string())
    }
}
