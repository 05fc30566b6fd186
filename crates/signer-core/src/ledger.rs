//! Port to the target ledger.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::SignerError;
use crate::types::{CallPayload, LedgerAddress, Signature, TxHash};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<LedgerError> for SignerError {
    fn from(e: LedgerError) -> Self {
        SignerError::SubmissionFailed(e.to_string())
    }
}

/// Client that submits calls authorized by a custom signature.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Bytes the external signer signs for `payload`.
    ///
    /// Must be byte-identical to what the ledger verifies the signature
    /// against. Defaults to the raw call bytes.
    fn signing_payload(&self, payload: &CallPayload) -> Vec<u8> {
        payload.as_bytes().to_vec()
    }

    /// Submits `payload` as an unsigned extrinsic carrying `signature` and
    /// the `sender` it was made for.
    async fn submit_unsigned(
        &self,
        payload: &CallPayload,
        sender: &LedgerAddress,
        signature: &Signature,
    ) -> Result<TxHash, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn ledger_errors_are_submission_failures() {
        let err: SignerError = LedgerError::Rejected("bad origin".into()).into();
        assert_eq!(err.kind(), ErrorKind::SubmissionFailed);
        assert_eq!(
            err.to_string(),
            "submission failed: rejected by ledger: bad origin"
        );
    }
}
