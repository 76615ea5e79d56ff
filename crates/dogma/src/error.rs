//! Errors that can arise while bringing a [`crate::CentralDogma`] handle up.

use thiserror::Error;

/// Failures that can occur while constructing a [`crate::CentralDogma`]
/// handle. Distinct from [`dogma_types::DogmaError`], which governs command
/// execution once the handle exists.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("replication.method = QUORUM requires replication.serverId to be set")]
    MissingServerId,

    #[error("invalid cron schedule: {0}")]
    InvalidSchedule(#[from] cron::error::Error),

    #[error("failed to read mirror definitions from the meta-repository: {0}")]
    MirrorDefinitions(#[from] dogma_types::DogmaError),

    #[error("failed to parse mirror definitions in {path}: {source}")]
    MirrorDefinitionsMalformed { path: &'static str, source: serde_json::Error },
}
