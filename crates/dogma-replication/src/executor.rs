//! The replicated command executor (C6): composes C4's admission/dispatch
//! semantics with C5's replication log.
//!
//! Deliberately composition, not inheritance (§9 Design Note): `local` stays
//! a fully usable [`LocalExecutor`] in its own right (used directly by
//! followers' read paths, and by tests that want a single-replica
//! executor without the replication machinery at all), and the log is a
//! separate object this type merely owns.

use std::sync::Arc;
use std::time::Duration;

use dogma_executor::{ExecutionOutcome, LocalExecutor, SessionSink};
use dogma_types::{Command, DogmaError};

use crate::quorum::QuorumLog;
use crate::standalone::StandaloneLog;

/// Default time a client write blocks waiting for quorum before giving up
/// (§6, `replication.timeoutMillis`).
pub const DEFAULT_REPLICATION_TIMEOUT: Duration = Duration::from_millis(1000);

/// The two ways a replica can drive its replication log: a full quorum
/// protocol, or the degenerate single-node stand-in used when replication
/// is disabled.
#[derive(Clone)]
enum Backend {
    Standalone(Arc<StandaloneLog>),
    Quorum(Arc<QuorumLog>),
}

/// Wraps [`LocalExecutor`] (C4) with a replication log (C5), routing writes
/// through consensus before they're visible and rejecting them outright when
/// this replica isn't the leader.
pub struct ReplicatedExecutor {
    local: Arc<LocalExecutor>,
    backend: Backend,
    timeout: Duration,
}

impl ReplicatedExecutor {
    #[must_use]
    pub fn standalone(local: Arc<LocalExecutor>, log: Arc<StandaloneLog>) -> Self {
        Self { local, backend: Backend::Standalone(log), timeout: DEFAULT_REPLICATION_TIMEOUT }
    }

    #[must_use]
    pub fn quorum(local: Arc<LocalExecutor>, log: Arc<QuorumLog>) -> Self {
        Self { local, backend: Backend::Quorum(log), timeout: DEFAULT_REPLICATION_TIMEOUT }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapped single-replica executor, for callers (e.g. read-only
    /// queries) that don't need to go through consensus.
    #[must_use]
    pub fn local(&self) -> &Arc<LocalExecutor> {
        &self.local
    }

    pub fn set_session_sink(&self, sink: Arc<dyn SessionSink>) {
        self.local.set_session_sink(sink.clone());
        match &self.backend {
            Backend::Standalone(log) => log.set_session_sink(sink),
            Backend::Quorum(log) => log.set_session_sink(sink),
        }
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        match &self.backend {
            Backend::Standalone(log) => log.is_leader(),
            Backend::Quorum(log) => log.is_leader(),
        }
    }

    #[must_use]
    pub fn leader_hint(&self) -> Option<String> {
        match &self.backend {
            Backend::Standalone(log) => log.leader_hint().map(|id| id.to_string()),
            Backend::Quorum(log) => log.leader_hint().map(|id| id.to_string()),
        }
    }

    /// Submits a command for replication. Non-leader replicas reject
    /// immediately with [`DogmaError::NotLeader`] rather than forwarding —
    /// forwarding between replicas is a client-facing concern this crate
    /// doesn't own.
    pub async fn execute(&self, command: Command) -> Result<ExecutionOutcome, DogmaError> {
        let backend = self.backend.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || match backend {
            Backend::Standalone(log) => log.propose(command),
            Backend::Quorum(log) => log.propose(command, timeout),
        })
        .await
        .map_err(|err| DogmaError::StorageIo(format!("replication task panicked: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dogma_kernel::InMemoryStorage;
    use dogma_kernel::Storage;
    use dogma_status::StatusManager;
    use dogma_types::{Author, Command, CommandHeader};

    use super::*;
    use crate::transport::InMemoryHub;

    async fn started_status() -> Arc<StatusManager> {
        let status = Arc::new(StatusManager::new());
        status.start().await;
        status
    }

    fn header() -> CommandHeader {
        CommandHeader::new(1000, Author::system())
    }

    #[tokio::test]
    async fn standalone_executor_commits_writes() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = started_status().await;
        let local = Arc::new(LocalExecutor::with_worker_count(storage.clone(), status.clone(), 2));
        let log = StandaloneLog::new(storage, status);
        let executor = ReplicatedExecutor::standalone(local, log);

        let outcome = executor
            .execute(Command::CreateProject { header: header(), project_name: "proj".to_owned() })
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Unit));
        assert!(executor.is_leader());
    }

    #[tokio::test]
    async fn quorum_executor_three_replicas_elect_and_commit() {
        let hub = InMemoryHub::new();
        let ids = [1u32, 2, 3];
        let mut executors = Vec::new();
        for &id in &ids {
            let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
            let status = started_status().await;
            let local = Arc::new(LocalExecutor::with_worker_count(storage.clone(), status.clone(), 1));
            let peers: Vec<u32> = ids.iter().copied().filter(|&p| p != id).collect();
            let transport = Arc::new(hub.join(id));
            let log = QuorumLog::start(id, peers, transport, storage, status);
            executors.push(ReplicatedExecutor::quorum(local, log).with_timeout(Duration::from_secs(5)));
        }

        // Drive the election loop until exactly one replica claims leadership.
        let mut leader_idx = None;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let leaders: Vec<usize> =
                executors.iter().enumerate().filter(|(_, e)| e.is_leader()).map(|(i, _)| i).collect();
            if leaders.len() == 1 {
                leader_idx = Some(leaders[0]);
                break;
            }
        }
        let leader_idx = leader_idx.expect("a leader should have been elected");

        let outcome = executors[leader_idx]
            .execute(Command::CreateProject { header: header(), project_name: "proj".to_owned() })
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Unit));

        for (idx, executor) in executors.iter().enumerate() {
            if idx == leader_idx {
                continue;
            }
            assert!(!executor.is_leader());
        }
    }
}
