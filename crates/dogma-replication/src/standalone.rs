//! A degenerate single-replica log: no election, no quorum, always leader.
//! Used when `replication.method = "none"` (§6) — a lone Central Dogma
//! instance still goes through C6 so the rest of the stack doesn't need to
//! special-case it.

use std::sync::Arc;

use dogma_executor::{dispatch, ExecutionOutcome, SessionSink};
use dogma_kernel::{validate_command, Storage};
use dogma_status::StatusManager;
use dogma_types::{Command, DogmaError};
use std::sync::Mutex;

pub struct StandaloneLog {
    storage: Arc<dyn Storage>,
    status: Arc<StatusManager>,
    session_sink: Mutex<Option<Arc<dyn SessionSink>>>,
}

impl StandaloneLog {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, status: Arc<StatusManager>) -> Arc<Self> {
        Arc::new(Self { storage, status, session_sink: Mutex::new(None) })
    }

    pub fn set_session_sink(&self, sink: Arc<dyn SessionSink>) {
        *self.session_sink.lock().expect("session sink lock poisoned") = Some(sink);
    }

    pub fn propose(&self, command: Command) -> Result<ExecutionOutcome, DogmaError> {
        validate_command(&command)?;
        if !self.status.started() {
            return Err(DogmaError::ReadOnly);
        }
        let (to_run, _forced) = command.clone().unwrap_force_push();
        if !self.status.is_writable() && !command.is_administrative() {
            return Err(DogmaError::ReadOnly);
        }
        let sink = self.session_sink.lock().expect("session sink lock poisoned").clone();
        dispatch(&to_run, self.storage.as_ref(), &self.status, sink.as_deref())
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        true
    }

    #[must_use]
    pub fn leader_hint(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_kernel::InMemoryStorage;
    use dogma_types::{Author, CommandHeader};

    #[tokio::test]
    async fn standalone_is_always_leader_and_commits_directly() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let status = Arc::new(StatusManager::new());
        status.start().await;
        let log = StandaloneLog::new(storage, status);
        assert!(log.is_leader());
        let header = CommandHeader::new(1, Author::system());
        let outcome =
            log.propose(Command::CreateProject { header, project_name: "demo".to_owned() }).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Unit));
    }
}
