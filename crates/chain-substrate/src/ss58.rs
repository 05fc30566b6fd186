use std::fmt;

use crate::error::SubstrateError;

/// Context string hashed in front of every SS58 checksum.
const SS58_CONTEXT: &[u8] = b"SS58PRE";

/// Number of checksum bytes for a 32-byte account id.
const CHECKSUM_LEN: usize = 2;

/// Highest prefix expressible in the two-byte SS58 form.
const MAX_PREFIX: u16 = 0x3fff;

/// A validated SS58 network prefix.
///
/// Prefixes 0-63 encode as one byte, 64-16383 as two. 46 and 47 are
/// reserved by the registry and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkPrefix(u16);

impl NetworkPrefix {
    /// Generic Substrate prefix (addresses start with "5").
    pub const SUBSTRATE: NetworkPrefix = NetworkPrefix(42);

    pub fn new(prefix: u16) -> Result<Self, SubstrateError> {
        if prefix > MAX_PREFIX || prefix == 46 || prefix == 47 {
            return Err(SubstrateError::InvalidPrefix(prefix));
        }
        Ok(Self(prefix))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    fn to_bytes(self) -> Vec<u8> {
        let ident = self.0;
        if ident < 64 {
            vec![ident as u8]
        } else {
            let first = ((ident & 0b0000_0000_1111_1100) as u8) >> 2;
            let second = ((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first | 0b0100_0000, second]
        }
    }

    /// Reads a prefix from the front of decoded address bytes, returning it
    /// with the number of bytes it occupied.
    fn from_bytes(data: &[u8]) -> Result<(Self, usize), SubstrateError> {
        match data.first() {
            Some(&b) if b < 64 => Ok((Self::new(b as u16)?, 1)),
            Some(&b) if b < 128 => {
                let second = *data.get(1).ok_or_else(|| {
                    SubstrateError::InvalidAddress("truncated two-byte prefix".into())
                })?;
                let lower = (b << 2) | (second >> 6);
                let upper = second & 0b0011_1111;
                let prefix = (lower as u16) | ((upper as u16) << 8);
                Ok((Self::new(prefix)?, 2))
            }
            Some(&b) => Err(SubstrateError::InvalidAddress(format!(
                "unsupported address type byte {b}"
            ))),
            None => Err(SubstrateError::InvalidAddress("empty address".into())),
        }
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encodes a 32-byte account id as an SS58 address.
///
/// Layout: prefix (1 or 2 bytes) || account id || first two bytes of
/// blake2b-512("SS58PRE" || prefix || account id), Base58 encoded.
pub fn encode(prefix: NetworkPrefix, account_id: &[u8; 32]) -> String {
    let mut payload = prefix.to_bytes();
    payload.extend_from_slice(account_id);

    let checksum = ss58_checksum(&payload);
    payload.extend_from_slice(&checksum);

    bs58::encode(payload).into_string()
}

/// Decodes an SS58 address into its prefix and 32-byte account id,
/// verifying the checksum.
pub fn decode(address: &str) -> Result<(NetworkPrefix, [u8; 32]), SubstrateError> {
    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| SubstrateError::InvalidAddress(format!("invalid base58: {e}")))?;

    let (prefix, prefix_len) = NetworkPrefix::from_bytes(&data)?;

    let expected_len = prefix_len + 32 + CHECKSUM_LEN;
    if data.len() != expected_len {
        return Err(SubstrateError::InvalidAddress(format!(
            "expected {expected_len} bytes, got {}",
            data.len()
        )));
    }

    let body = &data[..prefix_len + 32];
    if data[prefix_len + 32..] != ss58_checksum(body) {
        return Err(SubstrateError::InvalidAddress("invalid checksum".into()));
    }

    let mut account_id = [0u8; 32];
    account_id.copy_from_slice(&body[prefix_len..]);
    Ok((prefix, account_id))
}

fn ss58_checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = blake2b_simd::Params::new()
        .hash_length(64)
        .to_state()
        .update(SS58_CONTEXT)
        .update(data)
        .finalize();
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    out
}
