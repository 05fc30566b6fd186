use tokio::sync::{mpsc, oneshot, watch};

use super::state::{WorkflowSnapshot, WorkflowState};
use crate::error::SignerError;
use crate::types::CallPayload;

#[derive(Debug)]
pub(crate) enum Intent {
    Connect,
    SelectPayload(CallPayload),
    Sign,
    Submit,
    Cancel,
}

impl Intent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Intent::Connect => "connect",
            Intent::SelectPayload(_) => "select payload",
            Intent::Sign => "sign",
            Intent::Submit => "submit",
            Intent::Cancel => "cancel",
        }
    }
}

pub(crate) type Reply = oneshot::Sender<Result<WorkflowState, SignerError>>;

pub(crate) struct Command {
    pub(crate) intent: Intent,
    pub(crate) reply: Reply,
}

/// Cloneable front end of a running workflow.
///
/// Each intent resolves once the workflow has handled it, with the state it
/// left the workflow in. Dropping every handle stops the workflow.
#[derive(Clone)]
pub struct WorkflowHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<WorkflowSnapshot>,
}

impl WorkflowHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<WorkflowSnapshot>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    pub async fn connect(&self) -> Result<WorkflowState, SignerError> {
        self.send(Intent::Connect).await
    }

    pub async fn select_payload(&self, payload: CallPayload) -> Result<WorkflowState, SignerError> {
        self.send(Intent::SelectPayload(payload)).await
    }

    pub async fn sign(&self) -> Result<WorkflowState, SignerError> {
        self.send(Intent::Sign).await
    }

    pub async fn submit(&self) -> Result<WorkflowState, SignerError> {
        self.send(Intent::Submit).await
    }

    /// Abandons the flow. An in-flight request is dropped and its result,
    /// if it ever arrives, is discarded.
    pub async fn cancel(&self) -> Result<WorkflowState, SignerError> {
        self.send(Intent::Cancel).await
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves with the first snapshot, current one included, that
    /// satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&WorkflowSnapshot) -> bool,
    ) -> Result<WorkflowSnapshot, SignerError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| SignerError::Closed)?;
        Ok(snapshot.clone())
    }

    async fn send(&self, intent: Intent) -> Result<WorkflowState, SignerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { intent, reply })
            .await
            .map_err(|_| SignerError::Closed)?;
        response.await.map_err(|_| SignerError::Closed)?
    }
}
