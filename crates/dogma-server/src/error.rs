//! Server process error types.

use thiserror::Error;

/// Result type for server bring-up and operation.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while loading configuration, opening a
/// [`dogma::CentralDogma`] handle, or running the process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration failed to load or validate (§6).
    #[error("configuration error: {0}")]
    Config(#[from] dogma_config::ConfigError),

    /// A subsystem failed to start.
    #[error("failed to open replica: {0}")]
    Open(#[from] dogma::OpenError),

    /// `replication.method = QUORUM` was configured, but this build has no
    /// real network `Transport` to run it over — only the in-process
    /// `InMemoryHub` used by tests. Surfaced as a hard startup error rather
    /// than silently falling back to standalone.
    #[error(
        "replication.method = QUORUM has no real network transport in this build; \
         run with replication.method = NONE, or supply a Transport yourself"
    )]
    UnsupportedReplicationBackend,

    /// A command dispatched during startup or shutdown failed.
    #[error("command execution error: {0}")]
    Command(#[from] dogma_types::DogmaError),

    /// I/O error (e.g. installing the Ctrl-C signal handler).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
