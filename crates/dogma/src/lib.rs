//! # dogma: the Central Dogma facade
//!
//! Wires the status manager (C3), local executor (C4), replication log and
//! replicated executor (C5/C6), mirroring scheduler (C7) and session store
//! (C8) into a single cloneable process handle. `CentralDogma::open_standalone`
//! and `::open_quorum` are the two ways to bring one up; `open` is the
//! shared constructor both delegate to.

mod error;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dogma_executor::LocalExecutor;
use dogma_kernel::{InMemoryStorage, Storage, SystemClock};
use dogma_mirror::{GitSync, MirrorScheduler};
use dogma_replication::{QuorumLog, ReplicaId, ReplicatedExecutor, RetentionPolicy, StandaloneLog, Transport};
use dogma_session::{SessionStore, SessionSweeper};
use dogma_status::StatusManager;
use dogma_types::{DogmaError, Mirror};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use dogma_config::DogmaConfig;
pub use error::OpenError;

/// The project/repository pair the mirroring scheduler reads its
/// definitions from (§4.7: "a designated meta-repository, itself under
/// replication"). Fixed rather than configurable, matching the spec's
/// framing of it as a single well-known location.
pub const META_PROJECT_NAME: &str = "dogma";
pub const META_REPOSITORY_NAME: &str = "meta";
const MIRRORS_PATH: &str = "/mirrors.json";

/// How a [`CentralDogma`] handle replicates commands.
pub enum ReplicationBackend {
    /// Single-replica, no quorum commit. The only backend with a real
    /// deployable transport in this workspace.
    Standalone,
    /// Multi-replica quorum commit. `transport` must reach every peer in
    /// `peers`; this workspace only ships [`dogma_replication::InMemoryHub`]
    /// transports, suitable for tests and in-process simulation but not a
    /// real multi-process deployment (see `DESIGN.md`).
    Quorum { transport: Arc<dyn Transport>, peers: Vec<ReplicaId> },
}

/// A process-level handle onto one Central Dogma replica: storage, status,
/// command execution, mirroring, and sessions, all sharing the same
/// `Arc`-backed subsystems. Cheap to clone — every field is a shared handle,
/// not owned state.
#[derive(Clone)]
pub struct CentralDogma {
    storage: Arc<dyn Storage>,
    status: Arc<StatusManager>,
    executor: Arc<ReplicatedExecutor>,
    sessions: Arc<SessionStore>,
    background: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
}

impl CentralDogma {
    /// Brings up a standalone (non-clustered) replica: no quorum commit, no
    /// leader election, and the replica is writable as soon as it starts.
    pub async fn open_standalone(config: DogmaConfig, git: Arc<dyn GitSync>) -> Result<Self, OpenError> {
        Self::open(config, ReplicationBackend::Standalone, git).await
    }

    /// Brings up a replica participating in quorum replication.
    /// `config.replication.serverId` must already be resolved (§6's loader
    /// does this during `validate`).
    pub async fn open_quorum(
        config: DogmaConfig,
        transport: Arc<dyn Transport>,
        peers: Vec<ReplicaId>,
        git: Arc<dyn GitSync>,
    ) -> Result<Self, OpenError> {
        Self::open(config, ReplicationBackend::Quorum { transport, peers }, git).await
    }

    /// Builds every subsystem, wires them together, and spawns the
    /// long-running background tasks (session sweep, mirroring).
    pub async fn open(config: DogmaConfig, backend: ReplicationBackend, git: Arc<dyn GitSync>) -> Result<Self, OpenError> {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;

        let local =
            Arc::new(LocalExecutor::with_worker_count(storage.clone(), status.clone(), config.num_repository_workers as usize));

        let timeout = Duration::from_millis(config.replication.timeout_millis);
        let executor = Arc::new(match backend {
            ReplicationBackend::Standalone => {
                let log = StandaloneLog::new(storage.clone(), status.clone());
                ReplicatedExecutor::standalone(local, log).with_timeout(timeout)
            }
            ReplicationBackend::Quorum { transport, peers } => {
                let replica_id = config.replication.server_id.ok_or(OpenError::MissingServerId)?;
                let retention = RetentionPolicy {
                    max_log_count: config.replication.max_log_count,
                    min_log_age_millis: config.replication.min_log_age_millis,
                };
                let log =
                    QuorumLog::start_with_retention(replica_id, peers, transport, storage.clone(), status.clone(), retention);
                ReplicatedExecutor::quorum(local, log).with_timeout(timeout)
            }
        });

        let clock = Arc::new(SystemClock);
        let sessions = Arc::new(SessionStore::with_capacity(
            clock,
            dogma_session::DEFAULT_SESSION_CACHE_CAPACITY,
            config.authentication.session_timeout_millis,
        ));
        executor.set_session_sink(sessions.clone());

        let mut background = Vec::new();

        let sweeper =
            SessionSweeper::new(sessions.clone(), executor.clone(), &config.authentication.session_validation_schedule)?;
        background.push(tokio::spawn(sweeper.run()));

        if config.mirroring_enabled {
            let mirrors = load_mirror_definitions(&storage)?;
            let scheduler = Arc::new(MirrorScheduler::new(mirrors, executor.clone(), storage.clone(), git)?);
            background.push(tokio::spawn(scheduler.run()));
        } else {
            info!("mirroring disabled, skipping scheduler startup");
        }

        Ok(Self { storage, status, executor, sessions, background: Arc::new(std::sync::Mutex::new(background)) })
    }

    /// A standalone handle rooted at `data_dir`, for tests and quick local
    /// use. Mirroring is left enabled but will see no mirror definitions
    /// until the meta-repository is populated.
    pub async fn open_standalone_at(data_dir: impl AsRef<Path>) -> Result<Self, OpenError> {
        let config = DogmaConfig::standalone(data_dir.as_ref());
        Self::open_standalone(config, Arc::new(dogma_mirror::FakeGitSync::new())).await
    }

    /// The command dispatch entry point: submits `command` through the
    /// replicated executor, which forwards to the local executor once
    /// committed (or, on a standalone replica, immediately).
    pub async fn submit(&self, command: dogma_types::Command) -> Result<dogma_executor::ExecutionOutcome, DogmaError> {
        self.executor.execute(command).await
    }

    /// The underlying storage handle, for callers that need read-only
    /// access without going through the command pipeline (e.g. serving
    /// `GET` queries).
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The replica's status manager (§4.3).
    #[must_use]
    pub fn status(&self) -> &Arc<StatusManager> {
        &self.status
    }

    /// The session store (§4.8), for read paths that need to validate a
    /// bearer token without submitting a command.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Whether this replica currently believes itself to be the leader.
    /// Always `true` on a standalone replica.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.executor.is_leader()
    }

    /// The current leader's address hint, if known and this replica isn't
    /// it.
    #[must_use]
    pub fn leader_hint(&self) -> Option<String> {
        self.executor.leader_hint()
    }

    /// Stops the status manager and every background task (session sweep,
    /// mirroring). Idempotent: safe to call more than once.
    pub fn shutdown(&self) {
        self.status.stop();
        let mut background = self.background.lock().expect("background task list lock poisoned");
        for handle in background.drain(..) {
            handle.abort();
        }
    }
}

/// Reads the current mirror set from the meta-repository, or an empty list
/// if the meta-repository hasn't been created yet. Mirrors are loaded once
/// at startup; picking up edits made to the meta-repository after this
/// point requires a restart, since `MirrorScheduler` doesn't support hot
/// reload (see `DESIGN.md`).
fn load_mirror_definitions(storage: &Arc<dyn Storage>) -> Result<Vec<Mirror>, OpenError> {
    let head = match storage.head(META_PROJECT_NAME, META_REPOSITORY_NAME) {
        Ok(head) => head,
        Err(DogmaError::NotFound(_)) => {
            warn!("meta-repository {META_PROJECT_NAME}/{META_REPOSITORY_NAME} does not exist yet, starting with no mirrors");
            return Ok(Vec::new());
        }
        Err(other) => return Err(other.into()),
    };
    let Some(content) = storage.get(META_PROJECT_NAME, META_REPOSITORY_NAME, head, MIRRORS_PATH)? else {
        return Ok(Vec::new());
    };
    serde_json::from_slice(&content).map_err(|source| OpenError::MirrorDefinitionsMalformed { path: MIRRORS_PATH, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_types::{Author, Command, CommandHeader};

    #[tokio::test]
    async fn open_standalone_starts_writable_and_leader() {
        let handle = CentralDogma::open_standalone_at("unused-in-memory").await.unwrap();
        assert!(handle.is_leader());
        assert!(handle.status().is_writable());
        handle.shutdown();
    }

    #[tokio::test]
    async fn submit_creates_a_project_through_the_facade() {
        let handle = CentralDogma::open_standalone_at("unused-in-memory").await.unwrap();
        handle
            .submit(Command::CreateProject { header: CommandHeader::new(1, Author::system()), project_name: "proj".to_owned() })
            .await
            .unwrap();

        let duplicate = handle
            .submit(Command::CreateProject { header: CommandHeader::new(2, Author::system()), project_name: "proj".to_owned() })
            .await;
        assert!(matches!(duplicate, Err(DogmaError::Exists(_))));
        handle.shutdown();
    }

    #[tokio::test]
    async fn open_with_no_meta_repository_starts_with_no_mirrors() {
        // Exercises the NotFound branch of `load_mirror_definitions`
        // directly, since the meta-repository is never auto-created.
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let mirrors = load_mirror_definitions(&storage).unwrap();
        assert!(mirrors.is_empty());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let handle = CentralDogma::open_standalone_at("unused-in-memory").await.unwrap();
        handle.shutdown();
        handle.shutdown();
    }
}
