//! The error taxonomy (§7): kinds, not class names.
//!
//! Storage errors bubble up unchanged through the local executor; the
//! replicated executor adds the replication-layer kinds. No exception ever
//! crosses the accept loop boundary — every failure becomes a
//! completed-with-error future carrying one of these variants.

use thiserror::Error;

/// The error taxonomy shared by every layer of the command pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DogmaError {
    /// Caller bug: a malformed or semantically invalid command.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The replica (or the addressed repository) is not accepting writes.
    #[error("server is read-only")]
    ReadOnly,

    /// This replica is not the leader; retry, possibly elsewhere.
    #[error("not leader (current leader: {leader_hint:?})")]
    NotLeader { leader_hint: Option<String> },

    /// A push's `baseRevision` did not match HEAD at apply time.
    #[error("conflict: base revision is stale")]
    Conflict,

    /// A push whose changes are a no-op against HEAD; treated as success
    /// with an empty commit, not surfaced as a hard error by callers that
    /// check `CommitResult::changes.is_empty()`, but modelled as a distinct
    /// kind so callers that must distinguish it from a normal commit can.
    #[error("redundant change: nothing to commit")]
    RedundantChange,

    /// Project, repository, or revision does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted to create something that already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// A parent project is missing, or a repository reference would
    /// dangle.
    #[error("parent missing: {0}")]
    ParentMissing(String),

    /// Project or repository is already removed / not removed, as
    /// appropriate to the requested transition.
    #[error("already removed: {0}")]
    AlreadyRemoved(String),

    /// Purge attempted on something still referenced (e.g. a project with
    /// live repositories).
    #[error("still referenced: {0}")]
    StillReferenced(String),

    /// The change list failed validation against current content.
    #[error("invalid change: {0}")]
    InvalidChange(String),

    /// Storage is busy with a conflicting serialized operation (e.g. GC).
    #[error("storage busy")]
    Busy,

    /// A quorum append did not commit within the configured timeout.
    /// Retries are safe: the command's `(author, timestamp, baseRevision)`
    /// fingerprint makes idempotent replay detectable by storage.
    #[error("replication timed out")]
    ReplicationTimeout,

    /// Local apply of a committed log entry failed with a non-retryable
    /// error; the replica has gone read-only and needs operator
    /// intervention.
    #[error("replication divergence detected, replica is now read-only")]
    ReplicationDivergence,

    /// The underlying storage failed; after repeated retries this becomes
    /// fatal.
    #[error("storage I/O error: {0}")]
    StorageIo(String),

    /// A deprecated command (`ResetMetaRepository`) was submitted for
    /// execution. Accepted on decode, rejected here (Open Question, §9).
    #[error("command is deprecated: {0}")]
    Deprecated(String),
}

impl DogmaError {
    /// Whether this error is safe to retry without side effects.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DogmaError::ReplicationTimeout | DogmaError::NotLeader { .. } | DogmaError::Busy)
    }
}
