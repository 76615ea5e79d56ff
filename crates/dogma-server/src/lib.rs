//! # dogma-server: the Central Dogma process entrypoint
//!
//! Loads configuration (§6), initializes tracing, opens a
//! [`dogma::CentralDogma`] replica, and runs it until asked to shut down.
//! The HTTP/gRPC API surface, web UI, CLI, and client SDKs are out of
//! scope; this crate only owns getting the replicated command-execution
//! pipeline up and keeping it running as a long-lived process.

mod error;

use std::sync::Arc;

use dogma::CentralDogma;
use dogma_config::{DogmaConfig, ReplicationMethod};
use dogma_mirror::NullGitSync;
use tracing::info;

pub use error::{ServerError, ServerResult};

/// Initializes the `tracing` subscriber from `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .try_init();
}

/// Opens a replica from `config` and returns the handle without blocking.
/// Splitting this out from [`run`] lets tests and the compliance harness
/// drive the handle directly instead of waiting on a signal.
pub async fn open(config: DogmaConfig) -> ServerResult<CentralDogma> {
    info!(data_dir = %config.data_dir.display(), method = ?config.replication.method, "opening Central Dogma replica");

    if config.replication.method == ReplicationMethod::Quorum {
        return Err(ServerError::UnsupportedReplicationBackend);
    }

    let git = Arc::new(NullGitSync::new());
    let handle = CentralDogma::open_standalone(config, git).await?;
    info!("replica started, writable = {}", handle.status().is_writable());
    Ok(handle)
}

/// Opens a replica and runs it until `Ctrl-C` (or an equivalent platform
/// shutdown signal) is received, then shuts down cleanly.
pub async fn run(config: DogmaConfig) -> ServerResult<()> {
    let handle = open(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping replica");
    handle.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_rejects_quorum_with_no_real_transport() {
        let data_dir = tempfile::tempdir().unwrap();
        let mut config = DogmaConfig::standalone(data_dir.path());
        config.replication.method = ReplicationMethod::Quorum;
        config.replication.server_id = Some(1);
        config.replication.servers.insert(
            "1".to_owned(),
            dogma_config::ServerAddress { host: "localhost".to_owned(), quorum_port: 8100, election_port: 8101 },
        );

        let result = open(config).await;
        assert!(matches!(result, Err(ServerError::UnsupportedReplicationBackend)));
    }

    #[tokio::test]
    async fn open_standalone_succeeds_and_is_writable() {
        let data_dir = tempfile::tempdir().unwrap();
        let config = DogmaConfig::standalone(data_dir.path());
        let handle = open(config).await.unwrap();
        assert!(handle.status().is_writable());
        handle.shutdown();
    }
}
