use std::fmt;
use std::sync::Arc;

use chain_eth::signature::RecoverableSignature;
use chain_substrate::ss58::NetworkPrefix;

use crate::error::SignerError;

/// Compressed secp256k1 public key recovered from a provider signature.
///
/// Only [`crate::codec::recover_public_key`] produces these.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    pub(crate) fn from_recovered(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// An account as the signing provider knows it, in EIP-55 form.
///
/// Parsing checks syntax only; ownership is never verified here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalAddress(String);

impl ExternalAddress {
    pub fn parse(address: &str) -> Result<Self, SignerError> {
        Ok(Self(chain_eth::address::normalize_address(address)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SS58 address on the target ledger, tied to the prefix it was encoded for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerAddress {
    address: String,
    prefix: NetworkPrefix,
}

impl LedgerAddress {
    pub(crate) fn new(address: String, prefix: NetworkPrefix) -> Self {
        Self { address, prefix }
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn prefix(&self) -> NetworkPrefix {
        self.prefix
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// The provider's active account paired with its derived ledger address.
///
/// `ledger_address` is `None` while the active account has not been bound
/// (or its binding was discarded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    pub external_address: ExternalAddress,
    pub ledger_address: Option<LedgerAddress>,
}

impl BoundIdentity {
    pub fn is_bound(&self) -> bool {
        self.ledger_address.is_some()
    }
}

/// Serialized call built by the ledger client. Opaque and immutable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CallPayload(Arc<[u8]>);

impl CallPayload {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self(Arc::from(bytes))
    }

    /// Parses `0x`-prefixed (or bare) call-data hex.
    pub fn from_hex(call_data: &str) -> Result<Self, SignerError> {
        let stripped = call_data.strip_prefix("0x").unwrap_or(call_data);
        let bytes = hex::decode(stripped)
            .map_err(|e| SignerError::InvalidPayload(format!("invalid call data hex: {e}")))?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for CallPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallPayload({})", self.to_hex())
    }
}

/// A commitment to sign one payload with one account. Consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub payload: CallPayload,
    pub requester: ExternalAddress,
    /// The exact bytes handed to `personal_sign`.
    pub message: Vec<u8>,
}

/// A signature as returned by the provider, with its parsed components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    raw: String,
    parsed: RecoverableSignature,
}

impl Signature {
    /// Validates the shape of a provider response.
    pub fn from_rpc(raw: &str) -> Result<Self, SignerError> {
        let parsed = RecoverableSignature::from_rpc(raw)?;
        Ok(Self {
            raw: raw.trim().to_string(),
            parsed,
        })
    }

    /// The string exactly as the provider returned it.
    pub fn as_rpc(&self) -> &str {
        &self.raw
    }

    /// `r || s || v` with `v` in 27/28 form.
    pub fn to_bytes(&self) -> [u8; 65] {
        self.parsed.to_bytes()
    }

    pub fn recoverable(&self) -> &RecoverableSignature {
        &self.parsed
    }
}

/// Normalised `0x` hex form, `v` as 27/28.
impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parsed.to_rpc())
    }
}

/// A signing request together with the signature produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCall {
    pub request: SigningRequest,
    pub signature: Signature,
}

/// Transaction identifier returned by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
