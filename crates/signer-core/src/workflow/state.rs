use std::fmt;

use crate::error::{ErrorKind, SignerError};
use crate::types::{BoundIdentity, CallPayload, SignedCall, TxHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    AccountPending,
    AccountReady,
    PayloadSelected,
    AwaitingSignature,
    Signed,
    Submitting,
    Submitted,
    /// A signature or submission failed. Behaves like `AccountReady`: the
    /// account stays bound and the selected payload is kept. Rejections and
    /// provider errors return straight to `PayloadSelected` instead.
    Failed(ErrorKind),
}

impl WorkflowState {
    pub fn name(self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::AccountPending => "account pending",
            WorkflowState::AccountReady => "account ready",
            WorkflowState::PayloadSelected => "payload selected",
            WorkflowState::AwaitingSignature => "awaiting signature",
            WorkflowState::Signed => "signed",
            WorkflowState::Submitting => "submitting",
            WorkflowState::Submitted => "submitted",
            WorkflowState::Failed(_) => "failed",
        }
    }

    /// Waiting on the provider or the ledger.
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            WorkflowState::AccountPending
                | WorkflowState::AwaitingSignature
                | WorkflowState::Submitting
        )
    }

    /// Whether an account is bound in this state.
    pub fn has_account(self) -> bool {
        !matches!(self, WorkflowState::Idle | WorkflowState::AccountPending)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Failed(kind) => write!(f, "failed ({kind})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Everything the UI renders, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub identity: Option<BoundIdentity>,
    pub payload: Option<CallPayload>,
    pub signed: Option<SignedCall>,
    pub last_error: Option<SignerError>,
    pub last_receipt: Option<TxHash>,
}
