use thiserror::Error;

/// Errors raised by the provider-side (Ethereum-format) primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EthError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The value returned as a signature does not have the shape of one.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// The signature is well-formed but cryptographically unusable.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing error: {0}")]
    SigningError(String),
}
