use crate::ss58::{self, NetworkPrefix};

/// Account id of an ECDSA signer: blake2b-256 of the 33-byte compressed
/// secp256k1 public key.
///
/// This is how the runtime maps ECDSA keys into its 32-byte account space;
/// it is unrelated to the Keccak-derived 20-byte EVM address of the same key.
pub fn ecdsa_account_id(compressed_pubkey: &[u8; 33]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .hash(compressed_pubkey);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// SS58 address of an ECDSA signer under the given network prefix.
pub fn ecdsa_to_ss58(compressed_pubkey: &[u8; 33], prefix: NetworkPrefix) -> String {
    ss58::encode(prefix, &ecdsa_account_id(compressed_pubkey))
}
