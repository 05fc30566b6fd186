use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

use crate::error::EthError;

/// EIP-191 version 0x45 prefix used by `personal_sign`.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Hashes a message the way `personal_sign` does:
/// `keccak256("\x19Ethereum Signed Message:\n" + len(message) + message)`.
pub fn hash_personal_message(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Signs an arbitrary message using EIP-191 personal_sign.
///
/// Returns the 65-byte signature (r[32] + s[32] + v[1]) where v is 27 or 28.
pub fn sign_personal_message(
    message: &[u8],
    private_key: &[u8; 32],
) -> Result<[u8; 65], EthError> {
    let msg_hash = hash_personal_message(message);

    let mut key_bytes = *private_key;
    let signing_key = SigningKey::from_bytes((&key_bytes).into())
        .map_err(|e| EthError::InvalidPrivateKey(e.to_string()));
    key_bytes.zeroize();
    let signing_key = signing_key?;

    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash(&msg_hash)
        .map_err(|e| EthError::SigningError(e.to_string()))?;

    let mut sig = [0u8; 65];
    sig[..32].copy_from_slice(&signature.r().to_bytes());
    sig[32..64].copy_from_slice(&signature.s().to_bytes());
    sig[64] = recovery_id.is_y_odd() as u8 + 27;
    Ok(sig)
}

/// Encodes message bytes as the `personal_sign` message parameter.
///
/// Bytes are always sent hex-encoded so the wallet signs exactly these bytes,
/// whatever they contain.
pub fn encode_message_param(message: &[u8]) -> String {
    format!("0x{}", hex::encode(message))
}

/// Interprets a `personal_sign` message parameter the way wallets do: a
/// `0x`-prefixed hex string stands for its decoded bytes, anything else is
/// taken as UTF-8 text.
pub fn decode_message_param(param: &str) -> Vec<u8> {
    if let Some(stripped) = param.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(stripped) {
            return bytes;
        }
    }
    param.as_bytes().to_vec()
}
