//! The command model (C1): a closed, JSON-serializable tagged union covering
//! every write operation the executor understands.
//!
//! Commands are immutable values. The executor pattern-matches on the
//! variant; adding a new command means touching exactly one dispatch table,
//! which is the coupling we want across replicas — an old replica must
//! reject a command it doesn't understand rather than silently ignore it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::author::Author;
use crate::change::Change;
use crate::revision::Revision;

fn default_timestamp() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock is before the epoch").as_millis() as i64
}

/// Fields carried by every command: when it was created and who created it.
///
/// Missing on decode: defaults to `now()` / [`Author::system`] per the wire
/// format's backward-compatibility rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHeader {
    #[serde(default = "default_timestamp")]
    pub timestamp: i64,
    #[serde(default = "Author::system")]
    pub author: Author,
}

impl CommandHeader {
    #[must_use]
    pub fn new(timestamp: i64, author: Author) -> Self {
        Self { timestamp, author }
    }

    #[must_use]
    pub fn system_now(timestamp: i64) -> Self {
        Self { timestamp, author: Author::system() }
    }
}

/// Markup format of a commit's `detail` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Markup {
    Plaintext,
    Markdown,
}

/// Opaque reference to a WDEK rotation payload.
///
/// Encryption-at-rest key material itself is out of scope; only the request
/// to rotate it is modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WdekDetails {
    pub wrapped_key: String,
}

/// Replication status attached to a repository by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepositoryReplicationStatus {
    Active,
    ReadOnly,
}

/// Reference to a server-side content transformer used by [`Command::Transform`].
///
/// The transformer's actual logic lives in the storage layer; the command
/// only names which one to invoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTransformerRef {
    pub id: String,
}

/// A created or pending session, as stored by C8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub id: String,
    pub username: String,
    pub creation_time: i64,
    pub expiration_time: i64,
    pub csrf_token: Option<String>,
}

/// A long-lived application token, as stored by C8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyPayload {
    pub key_id: String,
    pub wrapped_key: String,
}

/// The command model: every write operation the executor can dispatch.
///
/// Round-trips through canonical JSON keyed by the `type` discriminator.
/// An unknown `type` is a hard decode error ([`CommandError::UnknownType`]);
/// unknown fields on a known `type` are ignored for forward compatibility
/// (serde's default struct-variant behavior already does this).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    // --- Root ---
    #[serde(rename = "CREATE_PROJECT")]
    CreateProject {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
    },
    #[serde(rename = "REMOVE_PROJECT")]
    RemoveProject {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
    },
    #[serde(rename = "UNREMOVE_PROJECT")]
    UnremoveProject {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
    },
    #[serde(rename = "PURGE_PROJECT")]
    PurgeProject {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
    },

    // --- Project-scoped ---
    /// Deprecated. Accepted on decode; rejected with
    /// `DogmaError::Deprecated` at execution time (see Open Questions).
    #[serde(rename = "RESET_META_REPOSITORY")]
    ResetMetaRepository {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
    },

    // --- Repository-scoped ---
    #[serde(rename = "CREATE_REPOSITORY")]
    CreateRepository {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
    },
    #[serde(rename = "REMOVE_REPOSITORY")]
    RemoveRepository {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
    },
    #[serde(rename = "UNREMOVE_REPOSITORY")]
    UnremoveRepository {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
    },
    #[serde(rename = "PURGE_REPOSITORY")]
    PurgeRepository {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
    },
    #[serde(rename = "CREATE_ROLLING_REPOSITORY")]
    CreateRollingRepository {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
        #[serde(rename = "initialRevision")]
        initial_revision: Revision,
        #[serde(rename = "minRetentionCommits")]
        min_retention_commits: u32,
        #[serde(rename = "minRetentionDays")]
        min_retention_days: u32,
    },
    #[serde(rename = "ROTATE_WDEK")]
    RotateWdek {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
        #[serde(rename = "wdekDetails")]
        wdek_details: WdekDetails,
    },
    #[serde(rename = "UPDATE_REPOSITORY_STATUS")]
    UpdateRepositoryStatus {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
        #[serde(rename = "replicationStatus")]
        replication_status: RepositoryReplicationStatus,
    },

    // --- Push family ---
    #[serde(rename = "NORMALIZING_PUSH")]
    NormalizingPush {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
        #[serde(rename = "baseRevision")]
        base_revision: Revision,
        summary: String,
        detail: String,
        markup: Markup,
        changes: Vec<Change>,
    },
    #[serde(rename = "PUSH_AS_IS")]
    PushAsIs {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
        #[serde(rename = "baseRevision")]
        base_revision: Revision,
        summary: String,
        detail: String,
        markup: Markup,
        changes: Vec<Change>,
    },
    #[serde(rename = "TRANSFORM")]
    Transform {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "projectName")]
        project_name: String,
        #[serde(rename = "repositoryName")]
        repository_name: String,
        #[serde(rename = "baseRevision")]
        base_revision: Revision,
        summary: String,
        detail: String,
        markup: Markup,
        #[serde(rename = "contentTransformer")]
        content_transformer: ContentTransformerRef,
    },

    // --- Session ---
    #[serde(rename = "CREATE_SESSION")]
    CreateSession {
        #[serde(flatten)]
        header: CommandHeader,
        session: SessionPayload,
    },
    #[serde(rename = "REMOVE_SESSION")]
    RemoveSession {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "CREATE_SESSION_MASTER_KEY")]
    CreateSessionMasterKey {
        #[serde(flatten)]
        header: CommandHeader,
        #[serde(rename = "masterKey")]
        master_key: MasterKeyPayload,
    },

    // --- Administrative (bypass read-only gating) ---
    #[serde(rename = "UPDATE_SERVER_STATUS")]
    UpdateServerStatus {
        #[serde(flatten)]
        header: CommandHeader,
        writable: Option<bool>,
        replicating: Option<bool>,
    },
    #[serde(rename = "FORCE_PUSH")]
    ForcePush {
        #[serde(flatten)]
        header: CommandHeader,
        inner: Box<Command>,
    },
}

/// Errors raised while decoding or validating a [`Command`] (C1 failure
/// modes, §4.1).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command type: {0}")]
    UnknownType(String),
    #[error("malformed command JSON: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl Command {
    #[must_use]
    pub fn header(&self) -> &CommandHeader {
        match self {
            Command::CreateProject { header, .. }
            | Command::RemoveProject { header, .. }
            | Command::UnremoveProject { header, .. }
            | Command::PurgeProject { header, .. }
            | Command::ResetMetaRepository { header, .. }
            | Command::CreateRepository { header, .. }
            | Command::RemoveRepository { header, .. }
            | Command::UnremoveRepository { header, .. }
            | Command::PurgeRepository { header, .. }
            | Command::CreateRollingRepository { header, .. }
            | Command::RotateWdek { header, .. }
            | Command::UpdateRepositoryStatus { header, .. }
            | Command::NormalizingPush { header, .. }
            | Command::PushAsIs { header, .. }
            | Command::Transform { header, .. }
            | Command::CreateSession { header, .. }
            | Command::RemoveSession { header, .. }
            | Command::CreateSessionMasterKey { header, .. }
            | Command::UpdateServerStatus { header, .. }
            | Command::ForcePush { header, .. } => header,
        }
    }

    /// Whether this command is read-only (the command model carries only
    /// writes today, so this is always `false`; kept as the seam the
    /// executor's admission check dispatches on — see C4 §4.4).
    #[must_use]
    pub fn is_read(&self) -> bool {
        false
    }

    /// Administrative commands bypass read-only gating: `ForcePush` and
    /// `UpdateServerStatus`.
    #[must_use]
    pub fn is_administrative(&self) -> bool {
        matches!(self, Command::ForcePush { .. } | Command::UpdateServerStatus { .. })
    }

    /// Unwraps a `ForcePush`, yielding the inner command. Unwrapping is
    /// idempotent: a non-`ForcePush` command returns itself unchanged.
    #[must_use]
    pub fn unwrap_force_push(self) -> (Command, bool) {
        match self {
            Command::ForcePush { inner, .. } => {
                let (innermost, _) = inner.unwrap_force_push();
                (innermost, true)
            }
            other => (other, false),
        }
    }

    /// The `(project, repository)` pair this command targets, if any.
    #[must_use]
    pub fn repository_scope(&self) -> Option<(&str, &str)> {
        match self {
            Command::CreateRepository { project_name, repository_name, .. }
            | Command::RemoveRepository { project_name, repository_name, .. }
            | Command::UnremoveRepository { project_name, repository_name, .. }
            | Command::PurgeRepository { project_name, repository_name, .. }
            | Command::CreateRollingRepository { project_name, repository_name, .. }
            | Command::RotateWdek { project_name, repository_name, .. }
            | Command::UpdateRepositoryStatus { project_name, repository_name, .. }
            | Command::NormalizingPush { project_name, repository_name, .. }
            | Command::PushAsIs { project_name, repository_name, .. }
            | Command::Transform { project_name, repository_name, .. } => {
                Some((project_name, repository_name))
            }
            Command::ForcePush { inner, .. } => inner.repository_scope(),
            _ => None,
        }
    }

    /// Decodes a command from its canonical JSON wire form, applying the
    /// header backward-compatibility defaults.
    pub fn decode(bytes: &[u8]) -> Result<Command, CommandError> {
        serde_json::from_slice(bytes).map_err(CommandError::from)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Command serialization is infallible")
    }
}
