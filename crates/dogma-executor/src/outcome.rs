//! The result shapes a dispatched command can produce.

use dogma_types::{CommitResult, Revision};

/// What a successfully dispatched command returned. Most lifecycle
/// commands produce [`ExecutionOutcome::Unit`]; pushes and transforms
/// produce a [`CommitResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Unit,
    Commit(CommitResult),
    Revision(Revision),
}

impl ExecutionOutcome {
    #[must_use]
    pub fn into_commit(self) -> Option<CommitResult> {
        match self {
            ExecutionOutcome::Commit(result) => Some(result),
            _ => None,
        }
    }
}
