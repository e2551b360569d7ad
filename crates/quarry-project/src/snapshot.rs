use std::cell::RefCell;

use crate::ProjectError;

/// The version-control snapshot operations framing a transaction.
///
/// The core never reads snapshot contents; it only commands these
/// operations. `ensure_ready` is called before a transaction starts and must
/// roll the workspace back (`reset_hard` plus `clean`) when a previous
/// transaction left the dirty sentinel behind.
pub trait Snapshot {
    fn ensure_ready(&mut self) -> Result<(), ProjectError>;
    fn commit(&mut self, message: &str) -> Result<(), ProjectError>;
    /// Folds the current state into the previous commit.
    fn amend(&mut self) -> Result<(), ProjectError>;
    fn reset_hard(&mut self) -> Result<(), ProjectError>;
    /// Deletes untracked files.
    fn clean(&mut self) -> Result<(), ProjectError>;
}

/// An operation observed by [`RecordingSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotOp {
    EnsureReady,
    Commit(String),
    Amend,
    ResetHard,
    Clean,
}

/// A snapshot double that records the operations invoked on it, for tests
/// of the transaction framing.
#[derive(Debug, Default)]
pub struct RecordingSnapshot {
    ops: RefCell<Vec<SnapshotOp>>,
}

impl RecordingSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<SnapshotOp> {
        self.ops.borrow().clone()
    }
}

impl Snapshot for RecordingSnapshot {
    fn ensure_ready(&mut self) -> Result<(), ProjectError> {
        self.ops.borrow_mut().push(SnapshotOp::EnsureReady);
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<(), ProjectError> {
        self.ops
            .borrow_mut()
            .push(SnapshotOp::Commit(message.to_string()));
        Ok(())
    }

    fn amend(&mut self) -> Result<(), ProjectError> {
        self.ops.borrow_mut().push(SnapshotOp::Amend);
        Ok(())
    }

    fn reset_hard(&mut self) -> Result<(), ProjectError> {
        self.ops.borrow_mut().push(SnapshotOp::ResetHard);
        Ok(())
    }

    fn clean(&mut self) -> Result<(), ProjectError> {
        self.ops.borrow_mut().push(SnapshotOp::Clean);
        Ok(())
    }
}
