//! The local command executor (C4).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dogma_kernel::{validate_command, Storage};
use dogma_status::StatusManager;
use dogma_types::{Command, DogmaError};
use tokio::sync::oneshot;
use tracing::{instrument, warn};

use crate::bounded_queue::{BoundedQueue, PushResult};
use crate::outcome::ExecutionOutcome;
use crate::session_sink::SessionSink;

/// Default size of the bounded worker pool (§6, `numRepositoryWorkers`).
pub const DEFAULT_WORKER_COUNT: usize = 16;
/// Default queue depth, sized generously above the worker count so a burst
/// of accepted commands doesn't immediately trip backpressure.
const DEFAULT_QUEUE_CAPACITY: usize = 4096;
const IDLE_POLL: Duration = Duration::from_micros(200);

struct Job {
    command: Command,
    forced: bool,
    respond: oneshot::Sender<Result<ExecutionOutcome, DogmaError>>,
}

type RepoKey = (String, String);

/// Per-repository locks ensuring `commit`/`applyTransform`/lifecycle calls
/// on the same repository are strictly serialized, even though several
/// worker threads may be pulling from the shared queue concurrently (§4.2
/// "Ordering", §5 "Shared-resource policy").
#[derive(Default)]
struct RepoLocks {
    locks: Mutex<HashMap<RepoKey, Arc<Mutex<()>>>>,
}

impl RepoLocks {
    fn lock_for(&self, key: RepoKey) -> Arc<Mutex<()>> {
        self.locks.lock().expect("repo lock registry poisoned").entry(key).or_default().clone()
    }
}

type SessionSinkSlot = Arc<RwLock<Option<Arc<dyn SessionSink>>>>;

/// Accepts commands, enforces admission control, and dispatches to storage
/// on a bounded pool of dedicated worker threads (§4.4, §5).
pub struct LocalExecutor {
    storage: Arc<dyn Storage>,
    status: Arc<StatusManager>,
    session_sink: SessionSinkSlot,
    queue: Arc<BoundedQueue<Job>>,
    repo_locks: Arc<RepoLocks>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

impl LocalExecutor {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, status: Arc<StatusManager>) -> Self {
        Self::with_worker_count(storage, status, DEFAULT_WORKER_COUNT)
    }

    #[must_use]
    pub fn with_worker_count(storage: Arc<dyn Storage>, status: Arc<StatusManager>, worker_count: usize) -> Self {
        let executor = Self {
            storage,
            status,
            session_sink: Arc::new(RwLock::new(None)),
            queue: Arc::new(BoundedQueue::new(DEFAULT_QUEUE_CAPACITY)),
            repo_locks: Arc::new(RepoLocks::default()),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            shutdown: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        };
        executor.spawn_workers(worker_count);
        executor
    }

    fn spawn_workers(&self, worker_count: usize) {
        let mut workers = self.workers.lock().expect("worker list poisoned");
        for idx in 0..worker_count {
            let storage = self.storage.clone();
            let status = self.status.clone();
            let queue = self.queue.clone();
            let repo_locks = self.repo_locks.clone();
            let shutdown = self.shutdown.clone();
            let session_sink = self.session_sink.clone();
            let handle = thread::Builder::new()
                .name(format!("dogma-repo-worker-{idx}"))
                .spawn(move || worker_loop(&queue, &storage, &status, &repo_locks, &shutdown, &session_sink))
                .expect("failed to spawn repository worker thread");
            workers.push(handle);
        }
    }

    /// Registers the session store as the sink for session commands. Until
    /// this is called, session commands are no-ops (§4.4). Registered after
    /// construction because the session store (C8) is built on top of the
    /// replicated executor, which itself wraps this one.
    pub fn set_session_sink(&self, sink: Arc<dyn SessionSink>) {
        *self.session_sink.write().expect("session sink lock poisoned") = Some(sink);
    }

    /// Submits a command for execution, returning a future that completes
    /// once a worker has dispatched it to storage.
    #[instrument(skip_all, fields(command = ?command.header()))]
    pub async fn execute(&self, command: Command) -> Result<ExecutionOutcome, DogmaError> {
        validate_command(&command)?;

        if !self.status.started() {
            return Err(DogmaError::ReadOnly);
        }

        let (to_run, forced) = command.clone().unwrap_force_push();
        let administrative = command.is_administrative();
        if !self.status.is_writable() && !administrative {
            return Err(DogmaError::ReadOnly);
        }

        let (tx, rx) = oneshot::channel();
        let job = Job { command: to_run, forced, respond: tx };
        match self.queue.try_push(job) {
            PushResult::Ok => {}
            PushResult::Backpressure(_) => return Err(DogmaError::Busy),
        }

        rx.await.unwrap_or(Err(DogmaError::StorageIo("worker dropped response channel".to_owned())))
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut workers = self.workers.lock().expect("worker list poisoned");
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for LocalExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    queue: &BoundedQueue<Job>,
    storage: &Arc<dyn Storage>,
    status: &Arc<StatusManager>,
    repo_locks: &Arc<RepoLocks>,
    shutdown: &std::sync::atomic::AtomicBool,
    session_sink: &SessionSinkSlot,
) {
    while !shutdown.load(std::sync::atomic::Ordering::SeqCst) {
        let Some(job) = queue.try_pop() else {
            thread::sleep(IDLE_POLL);
            continue;
        };
        let repo_lock = job.command.repository_scope().map(|(p, r)| repo_locks.lock_for((p.to_owned(), r.to_owned())));
        let _held = repo_lock.as_ref().map(|l| l.lock().expect("repo lock poisoned"));

        let sink = session_sink.read().expect("session sink lock poisoned").clone();
        let sink_ref: Option<&dyn SessionSink> = sink.as_deref();
        if job.forced {
            warn!(command = ?job.command.header(), "force-push bypassing read-only gating");
        }
        let result = crate::dispatch::dispatch(&job.command, storage.as_ref(), status, sink_ref);
        let _ = job.respond.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_kernel::InMemoryStorage;
    use dogma_types::{Author, CommandHeader, Markup, Change};

    async fn started_executor() -> (LocalExecutor, Arc<StatusManager>) {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;
        (LocalExecutor::with_worker_count(storage, status.clone(), 2), status)
    }

    fn header() -> CommandHeader {
        CommandHeader::new(1000, Author::system())
    }

    #[tokio::test]
    async fn create_push_read() {
        let (executor, _status) = started_executor().await;
        executor
            .execute(Command::CreateProject { header: header(), project_name: "foo".to_owned() })
            .await
            .unwrap();
        executor
            .execute(Command::CreateRepository {
                header: header(),
                project_name: "foo".to_owned(),
                repository_name: "bar".to_owned(),
            })
            .await
            .unwrap();
        let outcome = executor
            .execute(Command::NormalizingPush {
                header: header(),
                project_name: "foo".to_owned(),
                repository_name: "bar".to_owned(),
                base_revision: dogma_types::Revision::new(1),
                summary: "s".to_owned(),
                detail: String::new(),
                markup: Markup::Plaintext,
                changes: vec![Change::UpsertText { path: "/x.txt".to_owned(), content: "hi\n".to_owned() }],
            })
            .await
            .unwrap();
        assert_eq!(outcome.into_commit().unwrap().revision, dogma_types::Revision::new(2));
    }

    #[tokio::test]
    async fn not_started_rejects_everything() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        let executor = LocalExecutor::with_worker_count(storage, status, 1);
        let result = executor
            .execute(Command::CreateProject { header: header(), project_name: "foo".to_owned() })
            .await;
        assert!(matches!(result, Err(DogmaError::ReadOnly)));
    }

    #[tokio::test]
    async fn read_only_rejects_normal_writes_but_admits_force_push() {
        let (executor, status) = started_executor().await;
        executor
            .execute(Command::CreateProject { header: header(), project_name: "foo".to_owned() })
            .await
            .unwrap();
        status.set_writable(false);

        let rejected = executor
            .execute(Command::CreateRepository {
                header: header(),
                project_name: "foo".to_owned(),
                repository_name: "bar".to_owned(),
            })
            .await;
        assert!(matches!(rejected, Err(DogmaError::ReadOnly)));

        let forced = executor
            .execute(Command::ForcePush {
                header: header(),
                inner: Box::new(Command::CreateRepository {
                    header: header(),
                    project_name: "foo".to_owned(),
                    repository_name: "bar".to_owned(),
                }),
            })
            .await;
        assert!(forced.is_ok());
    }

    #[tokio::test]
    async fn session_commands_are_no_ops_without_a_registered_sink() {
        let (executor, _status) = started_executor().await;
        let result = executor
            .execute(Command::RemoveSession { header: header(), session_id: "s1".to_owned() })
            .await;
        assert!(result.is_ok());
    }
}
