use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::error::EthError;
use crate::message::hash_personal_message;

/// A recoverable secp256k1 signature in the `personal_sign` RPC layout.
///
/// The recovery byte `v` is kept exactly as the provider returned it;
/// [`RecoverableSignature::recovery_id`] decides whether it is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableSignature {
    r: [u8; 32],
    s: [u8; 32],
    v: u8,
}

impl RecoverableSignature {
    /// Builds a signature from its raw components.
    pub fn from_parts(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Parses the value a provider returned from `personal_sign`.
    ///
    /// Accepts the 65-byte `r || s || v` form and the 64-byte EIP-2098
    /// compact form, both `0x`-prefixed hex. Anything else is a
    /// [`EthError::MalformedSignature`]; range checks on the components are
    /// left to recovery.
    pub fn from_rpc(rpc: &str) -> Result<Self, EthError> {
        let hex_part = rpc
            .trim()
            .strip_prefix("0x")
            .ok_or_else(|| EthError::MalformedSignature("missing 0x prefix".into()))?;

        let bytes = hex::decode(hex_part)
            .map_err(|e| EthError::MalformedSignature(format!("invalid hex: {e}")))?;

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        match bytes.len() {
            65 => {
                r.copy_from_slice(&bytes[..32]);
                s.copy_from_slice(&bytes[32..64]);
                Ok(Self { r, s, v: bytes[64] })
            }
            64 => {
                // EIP-2098: the top bit of s carries the y parity.
                r.copy_from_slice(&bytes[..32]);
                s.copy_from_slice(&bytes[32..]);
                let y_parity = s[0] >> 7;
                s[0] &= 0x7f;
                Ok(Self {
                    r,
                    s,
                    v: 27 + y_parity,
                })
            }
            n => Err(EthError::MalformedSignature(format!(
                "expected 64 or 65 bytes, got {n}"
            ))),
        }
    }

    /// Raw recovery byte as received.
    pub fn v(&self) -> u8 {
        self.v
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// `r || s || v` with `v` normalised to 27/28 when it was given as 0/1.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = if self.v < 27 { self.v + 27 } else { self.v };
        out
    }

    /// `0x`-prefixed hex of [`RecoverableSignature::to_bytes`].
    pub fn to_rpc(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Maps `v` onto a recovery id. Only 0, 1, 27 and 28 are accepted.
    pub fn recovery_id(&self) -> Result<RecoveryId, EthError> {
        let parity = match self.v {
            0 | 27 => false,
            1 | 28 => true,
            other => {
                return Err(EthError::InvalidSignature(format!(
                    "recovery id {other} is out of range"
                )))
            }
        };
        Ok(RecoveryId::new(parity, false))
    }

    /// Checks the scalars: r and s in [1, n-1] and s in the lower half of the
    /// curve order.
    pub fn to_k256(&self) -> Result<Signature, EthError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);

        let signature = Signature::from_slice(&rs)
            .map_err(|_| EthError::InvalidSignature("r or s out of range".into()))?;

        if signature.normalize_s().is_some() {
            return Err(EthError::InvalidSignature("s is not in the lower half-order".into()));
        }

        Ok(signature)
    }

    /// Recovers the compressed public key that produced this signature over
    /// a 32-byte digest.
    pub fn recover_prehash(&self, digest: &[u8; 32]) -> Result<[u8; 33], EthError> {
        let signature = self.to_k256()?;
        let recovery_id = self.recovery_id()?;

        let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
            .map_err(|e| EthError::InvalidSignature(format!("public key recovery failed: {e}")))?;

        let encoded = key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        Ok(out)
    }
}

/// Recovers the compressed public key behind a `personal_sign` signature.
///
/// The message is hashed with the EIP-191 prefix before recovery.
pub fn recover_personal_signer(
    message: &[u8],
    signature: &RecoverableSignature,
) -> Result<[u8; 33], EthError> {
    signature.recover_prehash(&hash_personal_message(message))
}
