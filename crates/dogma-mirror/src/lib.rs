//! # dogma-mirror: cron-scheduled repository mirroring (C7)
//!
//! Each [`dogma_types::Mirror`] definition gets its own cron schedule with
//! bounded jitter, runs only while this replica is the leader, and routes
//! `RemoteToLocal` pulls through the normal replicated command pipeline
//! (C6) rather than writing storage directly. The Git plumbing itself is a
//! pluggable [`GitSync`] seam — out of scope per this workspace's boundary.

mod gitsync;
mod scheduler;

pub use gitsync::{FakeGitSync, GitSync, MirroredFile, NullGitSync};
pub use scheduler::{MirrorScheduler, DEFAULT_MAX_BYTES_PER_MIRROR, DEFAULT_MAX_FILES_PER_MIRROR};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dogma_executor::LocalExecutor;
    use dogma_kernel::{InMemoryStorage, Storage};
    use dogma_replication::{ReplicatedExecutor, StandaloneLog};
    use dogma_status::StatusManager;
    use dogma_types::{Author, Command, CommandHeader, Mirror, MirrorDirection};

    use super::*;

    fn mirror(id: &str, direction: MirrorDirection) -> Mirror {
        Mirror {
            id: id.to_owned(),
            enabled: true,
            project_name: "proj".to_owned(),
            local_repo: "repo".to_owned(),
            local_path: "/".to_owned(),
            direction,
            schedule: "* * * * * *".to_owned(),
            remote_scheme: "git+ssh".to_owned(),
            remote_url: "example.com/repo.git".to_owned(),
            remote_path: "/".to_owned(),
            remote_branch: "main".to_owned(),
            gitignore: None,
            credential_ref: "cred1".to_owned(),
            zone: None,
        }
    }

    async fn cluster() -> (Arc<ReplicatedExecutor>, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;
        let local = Arc::new(LocalExecutor::with_worker_count(storage.clone(), status.clone(), 1));
        let log = StandaloneLog::new(storage.clone(), status);
        (Arc::new(ReplicatedExecutor::standalone(local, log)), storage)
    }

    #[tokio::test]
    async fn remote_to_local_mirror_pulls_into_repository() {
        let (executor, storage) = cluster().await;
        let header = CommandHeader::new(1, Author::system());
        executor.execute(Command::CreateProject { header: header.clone(), project_name: "proj".to_owned() }).await.unwrap();
        executor
            .execute(Command::CreateRepository {
                header,
                project_name: "proj".to_owned(),
                repository_name: "repo".to_owned(),
            })
            .await
            .unwrap();

        let git = Arc::new(FakeGitSync::new());
        git.seed_remote("m1", vec![("/a.txt".to_owned(), b"hello\n".to_vec())]);
        let scheduler =
            MirrorScheduler::new(vec![mirror("m1", MirrorDirection::RemoteToLocal)], executor, storage.clone(), git)
                .unwrap();
        scheduler.run_mirror(&mirror("m1", MirrorDirection::RemoteToLocal)).await;

        let head = storage.head("proj", "repo").unwrap();
        let content = storage.get("proj", "repo", head, "/a.txt").unwrap();
        assert_eq!(content, Some(b"hello\n".to_vec()));
    }

    #[tokio::test]
    async fn local_to_remote_mirror_pushes_repository_content() {
        let (executor, storage) = cluster().await;
        let header = CommandHeader::new(1, Author::system());
        executor.execute(Command::CreateProject { header: header.clone(), project_name: "proj".to_owned() }).await.unwrap();
        executor
            .execute(Command::CreateRepository {
                header: header.clone(),
                project_name: "proj".to_owned(),
                repository_name: "repo".to_owned(),
            })
            .await
            .unwrap();
        executor
            .execute(Command::NormalizingPush {
                header,
                project_name: "proj".to_owned(),
                repository_name: "repo".to_owned(),
                base_revision: dogma_types::Revision::new(1),
                summary: "s".to_owned(),
                detail: String::new(),
                markup: dogma_types::Markup::Plaintext,
                changes: vec![dogma_types::Change::UpsertText { path: "/b.txt".to_owned(), content: "hi\n".to_owned() }],
            })
            .await
            .unwrap();

        let git = Arc::new(FakeGitSync::new());
        let scheduler =
            MirrorScheduler::new(vec![mirror("m2", MirrorDirection::LocalToRemote)], executor, storage, git.clone())
                .unwrap();
        scheduler.run_mirror(&mirror("m2", MirrorDirection::LocalToRemote)).await;

        let pushed = git.pushed("m2").unwrap();
        assert_eq!(pushed, vec![("/b.txt".to_owned(), b"hi\n".to_vec())]);
    }
}
