//! Results of applying a command, and replication log entries.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::command::Command;
use crate::revision::Revision;

/// The outcome of a successful push: the new head revision and the
/// post-normalization change set actually committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub revision: Revision,
    pub changes: Vec<Change>,
}

impl CommitResult {
    #[must_use]
    pub fn new(revision: Revision, changes: Vec<Change>) -> Self {
        Self { revision, changes }
    }

    /// A result representing a redundant push: the revision is unchanged
    /// and no changes were applied (§7, `RedundantChange`).
    #[must_use]
    pub fn redundant(previous_head: Revision) -> Self {
        Self { revision: previous_head, changes: Vec::new() }
    }
}

/// One entry in the replication log (C5): a sequence number, the instant it
/// committed, and the command it carries.
///
/// The log is totally ordered by `seq` and gap-free. In this workspace the
/// tail is an in-memory buffer, not a durable segment file — a crashed
/// replica loses its uncheckpointed tail and must rejoin the cluster as if
/// freshly provisioned (see `DESIGN.md`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationLogEntry {
    pub seq: i64,
    pub committed_millis: i64,
    pub command: Command,
}

impl ReplicationLogEntry {
    #[must_use]
    pub fn new(seq: i64, committed_millis: i64, command: Command) -> Self {
        Self { seq, committed_millis, command }
    }
}
