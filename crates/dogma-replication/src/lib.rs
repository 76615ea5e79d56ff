//! # dogma-replication: the replication log and replicated executor (C5/C6)
//!
//! A term-based leader election and single-round quorum commit protocol —
//! smaller in scope than full Viewstamped Replication (no view-change,
//! reconfiguration, or standby replicas), matching the "Zookeeper-style
//! quorum write-ahead log" this workspace targets. [`standalone::StandaloneLog`]
//! is the degenerate single-replica case used when replication is disabled.

mod executor;
mod message;
mod quorum;
mod standalone;
mod transport;

pub use executor::{ReplicatedExecutor, DEFAULT_REPLICATION_TIMEOUT};
pub use message::{LogMessage, ReplicaId};
pub use quorum::{QuorumLog, RetentionPolicy};
pub use standalone::StandaloneLog;
pub use transport::{InMemoryHub, InMemoryTransport, NoOpTransport, Transport};

#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dogma_kernel::{InMemoryStorage, Storage};
    use dogma_status::StatusManager;
    use dogma_types::{Author, Command, CommandHeader, Revision};

    use crate::executor::ReplicatedExecutor;
    use crate::quorum::QuorumLog;
    use crate::transport::InMemoryHub;
    use dogma_executor::LocalExecutor;

    fn header() -> CommandHeader {
        CommandHeader::new(42, Author::system())
    }

    struct Replica {
        id: u32,
        storage: Arc<dyn Storage>,
        executor: ReplicatedExecutor,
    }

    async fn build_cluster(hub: &InMemoryHub, ids: &[u32]) -> Vec<Replica> {
        let mut replicas = Vec::new();
        for &id in ids {
            let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
            let status = Arc::new(StatusManager::new());
            status.start().await;
            let local = Arc::new(LocalExecutor::with_worker_count(storage.clone(), status.clone(), 1));
            let peers: Vec<u32> = ids.iter().copied().filter(|&p| p != id).collect();
            let transport = Arc::new(hub.join(id));
            let log = QuorumLog::start(id, peers, transport, storage.clone(), status);
            let executor = ReplicatedExecutor::quorum(local, log).with_timeout(Duration::from_secs(5));
            replicas.push(Replica { id, storage, executor });
        }
        replicas
    }

    async fn wait_for_leader(replicas: &[Replica]) -> usize {
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let leaders: Vec<usize> =
                replicas.iter().enumerate().filter(|(_, r)| r.executor.is_leader()).map(|(i, _)| i).collect();
            if leaders.len() == 1 {
                return leaders[0];
            }
        }
        panic!("cluster never converged on a single leader");
    }

    /// Scenario 4: three-replica cluster, leader push, kill the leader, a
    /// new leader is elected, and the surviving replica that wasn't killed
    /// matches the pre-crash leader's state.
    #[tokio::test]
    async fn leader_crash_reelection_preserves_committed_state() {
        let hub = InMemoryHub::new();
        let ids = [1u32, 2, 3];
        let replicas = build_cluster(&hub, &ids).await;

        let first_leader = wait_for_leader(&replicas).await;
        replicas[first_leader]
            .executor
            .execute(Command::CreateProject { header: header(), project_name: "demo".to_owned() })
            .await
            .unwrap();
        replicas[first_leader]
            .executor
            .execute(Command::CreateRepository {
                header: header(),
                project_name: "demo".to_owned(),
                repository_name: "main".to_owned(),
            })
            .await
            .unwrap();

        // Give followers time to apply via heartbeat/commit propagation.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let pre_crash_head =
            replicas[first_leader].storage.head("demo", "main").expect("repository should exist on the leader");

        hub.kill(ids[first_leader]);

        let remaining: Vec<usize> = (0..replicas.len()).filter(|&i| i != first_leader).collect();
        let mut new_leader = None;
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let leaders: Vec<usize> =
                remaining.iter().copied().filter(|&i| replicas[i].executor.is_leader()).collect();
            if leaders.len() == 1 {
                new_leader = Some(leaders[0]);
                break;
            }
        }
        let new_leader = new_leader.expect("a new leader should be elected after the old one is killed");
        assert_ne!(new_leader, first_leader);

        let survivor = remaining.iter().copied().find(|&i| i != new_leader).unwrap();
        let survivor_head =
            replicas[survivor].storage.head("demo", "main").expect("repository should exist on the survivor");
        assert_eq!(survivor_head, pre_crash_head);
        assert_eq!(survivor_head, Revision::new(2));
    }
}
