//! Address derivation and signature recovery. Pure functions, no state.

use chain_eth::signature::recover_personal_signer;
use chain_substrate::account::{ecdsa_account_id, ecdsa_to_ss58};
use chain_substrate::ss58::{self, NetworkPrefix};

use crate::error::SignerError;
use crate::types::{ExternalAddress, LedgerAddress, PublicKey, Signature};

/// Recovers the public key behind a `personal_sign` signature over `message`.
///
/// `signer_hint` is checked for syntax only. Whether the recovered key
/// belongs to it is the caller's concern.
pub fn recover_public_key(
    signer_hint: &str,
    message: &[u8],
    signature: &Signature,
) -> Result<PublicKey, SignerError> {
    // Structural checks before touching the curve.
    let recoverable = signature.recoverable();
    recoverable.to_k256()?;
    recoverable.recovery_id()?;

    ExternalAddress::parse(signer_hint)?;

    let key = recover_personal_signer(message, recoverable)?;
    Ok(PublicKey::from_recovered(key))
}

/// SS58 address of blake2b-256(compressed key) under `prefix`.
pub fn derive_ledger_address(public_key: &PublicKey, prefix: NetworkPrefix) -> LedgerAddress {
    LedgerAddress::new(ecdsa_to_ss58(public_key.as_bytes(), prefix), prefix)
}

/// Whether `ledger` decodes to the account id of `public_key`.
///
/// Fails if `ledger` is not a valid SS58 address.
pub fn ledger_address_matches(
    public_key: &PublicKey,
    ledger: &LedgerAddress,
) -> Result<bool, SignerError> {
    let (prefix, account_id) = ss58::decode(ledger.as_str())
        .map_err(|e| SignerError::InvalidAddress(e.to_string()))?;
    Ok(prefix == ledger.prefix() && account_id == ecdsa_account_id(public_key.as_bytes()))
}

/// External (EIP-55) address controlled by `public_key`.
pub fn external_address_of(public_key: &PublicKey) -> Result<ExternalAddress, SignerError> {
    let address = chain_eth::address::pubkey_bytes_to_eth_address(public_key.as_bytes())?;
    ExternalAddress::parse(&address)
}
