//! Translates a validated [`Command`] into calls against [`Storage`] (or the
//! registered [`SessionSink`] / [`StatusManager`] for the commands that
//! don't address repository content).

use dogma_kernel::Storage;
use dogma_status::StatusManager;
use dogma_types::{Command, DogmaError};

use crate::outcome::ExecutionOutcome;
use crate::session_sink::SessionSink;

pub fn dispatch(
    command: &Command,
    storage: &dyn Storage,
    status: &StatusManager,
    session_sink: Option<&dyn SessionSink>,
) -> Result<ExecutionOutcome, DogmaError> {
    match command {
        Command::CreateProject { header, project_name } => {
            storage.create_project(project_name, header.timestamp, &header.author)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::RemoveProject { project_name, .. } => {
            storage.remove_project(project_name)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::UnremoveProject { project_name, .. } => {
            storage.unremove_project(project_name)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::PurgeProject { project_name, .. } => {
            storage.purge_project(project_name)?;
            Ok(ExecutionOutcome::Unit)
        }

        Command::ResetMetaRepository { .. } => {
            Err(DogmaError::Deprecated("ResetMetaRepository".to_owned()))
        }

        Command::CreateRepository { header, project_name, repository_name } => {
            storage.create_repository(project_name, repository_name, header.timestamp, &header.author)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::RemoveRepository { project_name, repository_name, .. } => {
            storage.remove_repository(project_name, repository_name)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::UnremoveRepository { project_name, repository_name, .. } => {
            storage.unremove_repository(project_name, repository_name)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::PurgeRepository { project_name, repository_name, .. } => {
            storage.purge_repository(project_name, repository_name)?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::CreateRollingRepository {
            project_name,
            repository_name,
            initial_revision,
            min_retention_commits,
            min_retention_days,
            ..
        } => {
            storage.create_rolling_repository(
                project_name,
                repository_name,
                *initial_revision,
                *min_retention_commits,
                *min_retention_days,
            )?;
            Ok(ExecutionOutcome::Unit)
        }
        Command::RotateWdek { .. } => {
            // WDEK material itself is out of scope (§1); acknowledging the
            // rotation request is all the executor does.
            Ok(ExecutionOutcome::Unit)
        }
        Command::UpdateRepositoryStatus { .. } => Ok(ExecutionOutcome::Unit),

        Command::NormalizingPush {
            header,
            project_name,
            repository_name,
            base_revision,
            summary,
            detail,
            markup,
            changes,
        }
        | Command::PushAsIs {
            header,
            project_name,
            repository_name,
            base_revision,
            summary,
            detail,
            markup,
            changes,
        } => {
            let result = storage.commit(
                project_name,
                repository_name,
                *base_revision,
                header.timestamp,
                &header.author,
                summary,
                detail,
                *markup,
                changes.clone(),
            )?;
            Ok(ExecutionOutcome::Commit(result))
        }
        Command::Transform {
            header,
            project_name,
            repository_name,
            base_revision,
            summary,
            detail,
            markup,
            content_transformer,
        } => {
            let result = storage.apply_transform(
                project_name,
                repository_name,
                *base_revision,
                content_transformer,
                header.timestamp,
                &header.author,
                summary,
                detail,
                *markup,
            )?;
            Ok(ExecutionOutcome::Commit(result))
        }

        Command::CreateSession { session, .. } => {
            if let Some(sink) = session_sink {
                sink.create_session(session.clone())?;
            }
            Ok(ExecutionOutcome::Unit)
        }
        Command::RemoveSession { session_id, .. } => {
            if let Some(sink) = session_sink {
                sink.remove_session(session_id)?;
            }
            Ok(ExecutionOutcome::Unit)
        }
        Command::CreateSessionMasterKey { master_key, .. } => {
            if let Some(sink) = session_sink {
                sink.create_master_key(master_key.clone())?;
            }
            Ok(ExecutionOutcome::Unit)
        }

        Command::UpdateServerStatus { writable, replicating, .. } => {
            if let Some(w) = writable {
                status.set_writable(*w);
            }
            if let Some(r) = replicating {
                status.set_replicating(*r);
            }
            Ok(ExecutionOutcome::Unit)
        }

        Command::ForcePush { inner, .. } => {
            // The admission check unwraps ForcePush before dispatch; seeing
            // it here means a nested ForcePush slipped through, which is
            // still valid (unwrapping is idempotent, §4.1) — recurse.
            dispatch(inner, storage, status, session_sink)
        }
    }
}
