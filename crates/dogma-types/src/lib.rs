//! # dogma-types: the Central Dogma command model
//!
//! Shared value types for the replicated command-execution pipeline:
//! - Revisions ([`Revision`])
//! - Authorship ([`Author`])
//! - File-level changes ([`Change`], [`ChangeError`])
//! - The command algebra ([`Command`], [`CommandHeader`], [`CommandError`])
//! - Commit outcomes and log entries ([`CommitResult`], [`ReplicationLogEntry`])
//! - Sessions and tokens ([`Session`], [`Token`])
//! - Mirror definitions ([`Mirror`], [`MirrorDirection`])
//! - The shared error taxonomy ([`DogmaError`])

mod author;
mod change;
mod command;
mod commit;
mod error;
mod mirror;
mod revision;
mod session;

pub use author::Author;
pub use change::{sanitize_text, validate_path, Change, ChangeError};
pub use command::{
    Command, CommandError, CommandHeader, ContentTransformerRef, MasterKeyPayload, Markup,
    RepositoryReplicationStatus, SessionPayload, WdekDetails,
};
pub use commit::{CommitResult, ReplicationLogEntry};
pub use error::DogmaError;
pub use mirror::{Mirror, MirrorDirection};
pub use revision::Revision;
pub use session::{Session, Token};
