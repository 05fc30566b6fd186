//! The sign-and-submit state machine.
//!
//! Runs as a task that owns the binder and the ledger client. The UI talks
//! to it through a [`WorkflowHandle`] and renders [`WorkflowSnapshot`]s.

mod handle;
mod service;
mod state;

pub use handle::WorkflowHandle;
pub use service::SignAndSubmitWorkflow;
pub use state::{WorkflowSnapshot, WorkflowState};
