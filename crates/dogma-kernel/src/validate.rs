//! Structural command validation (C1 failure modes, §4.1), performed before
//! a command ever reaches the storage layer.

use dogma_types::{Command, DogmaError};

/// Project and repository names: non-empty, ASCII alphanumeric plus
/// `-`, `_`, `.`, not starting with `.`.
fn validate_name(kind: &str, name: &str) -> Result<(), DogmaError> {
    if name.is_empty() || name.starts_with('.') {
        return Err(DogmaError::InvalidCommand(format!("invalid {kind} name: {name:?}")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
        return Err(DogmaError::InvalidCommand(format!("invalid {kind} name: {name:?}")));
    }
    Ok(())
}

/// Validates a command's structural invariants. Does not touch storage —
/// revision conflicts and existence checks happen in [`crate::storage::Storage`].
pub fn validate_command(command: &Command) -> Result<(), DogmaError> {
    match command {
        Command::CreateProject { project_name, .. }
        | Command::RemoveProject { project_name, .. }
        | Command::UnremoveProject { project_name, .. }
        | Command::PurgeProject { project_name, .. } => validate_name("project", project_name),

        Command::ResetMetaRepository { project_name, .. } => {
            validate_name("project", project_name)?;
            // Deprecated: accepted on decode (the wire format still parses
            // it), rejected at execution time. See DESIGN.md, Open Questions.
            Err(DogmaError::Deprecated("ResetMetaRepository".to_owned()))
        }

        Command::CreateRepository { project_name, repository_name, .. }
        | Command::RemoveRepository { project_name, repository_name, .. }
        | Command::UnremoveRepository { project_name, repository_name, .. }
        | Command::PurgeRepository { project_name, repository_name, .. }
        | Command::RotateWdek { project_name, repository_name, .. }
        | Command::UpdateRepositoryStatus { project_name, repository_name, .. } => {
            validate_name("project", project_name)?;
            validate_name("repository", repository_name)
        }

        Command::CreateRollingRepository { project_name, repository_name, min_retention_commits, min_retention_days, .. } => {
            validate_name("project", project_name)?;
            validate_name("repository", repository_name)?;
            let _ = (min_retention_commits, min_retention_days); // non-negative by type (u32)
            Ok(())
        }

        Command::NormalizingPush { project_name, repository_name, changes, .. }
        | Command::PushAsIs { project_name, repository_name, changes, .. } => {
            validate_name("project", project_name)?;
            validate_name("repository", repository_name)?;
            if changes.is_empty() {
                return Err(DogmaError::InvalidCommand("push with no changes".to_owned()));
            }
            for change in changes {
                dogma_types::validate_path(change.path())
                    .map_err(|e| DogmaError::InvalidCommand(e.to_string()))?;
            }
            Ok(())
        }

        Command::Transform { project_name, repository_name, .. } => {
            validate_name("project", project_name)?;
            validate_name("repository", repository_name)
        }

        Command::CreateSession { .. }
        | Command::RemoveSession { .. }
        | Command::CreateSessionMasterKey { .. } => Ok(()),

        Command::UpdateServerStatus { .. } => Ok(()),

        Command::ForcePush { inner, .. } => validate_command(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_types::{Author, Change, CommandHeader, Markup, Revision};

    fn header() -> CommandHeader {
        CommandHeader::new(0, Author::system())
    }

    #[test]
    fn rejects_empty_project_name() {
        let cmd = Command::CreateProject { header: header(), project_name: String::new() };
        assert!(validate_command(&cmd).is_err());
    }

    #[test]
    fn reset_meta_repository_is_always_deprecated() {
        let cmd = Command::ResetMetaRepository { header: header(), project_name: "foo".to_owned() };
        assert!(matches!(validate_command(&cmd), Err(DogmaError::Deprecated(_))));
    }

    #[test]
    fn push_without_changes_is_invalid() {
        let cmd = Command::NormalizingPush {
            header: header(),
            project_name: "foo".to_owned(),
            repository_name: "bar".to_owned(),
            base_revision: Revision::HEAD,
            summary: "s".to_owned(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![],
        };
        assert!(validate_command(&cmd).is_err());
    }

    #[test]
    fn force_push_validates_its_inner_command() {
        let inner = Command::ResetMetaRepository { header: header(), project_name: "foo".to_owned() };
        let cmd = Command::ForcePush { header: header(), inner: Box::new(inner) };
        assert!(matches!(validate_command(&cmd), Err(DogmaError::Deprecated(_))));
    }

    #[test]
    fn accepts_well_formed_create_repository() {
        let cmd = Command::CreateRepository {
            header: header(),
            project_name: "foo".to_owned(),
            repository_name: "bar".to_owned(),
        };
        assert!(validate_command(&cmd).is_ok());
    }

    #[test]
    fn rejects_upsert_with_bad_path() {
        let cmd = Command::NormalizingPush {
            header: header(),
            project_name: "foo".to_owned(),
            repository_name: "bar".to_owned(),
            base_revision: Revision::HEAD,
            summary: "s".to_owned(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::UpsertText { path: "no-leading-slash".to_owned(), content: "x".to_owned() }],
        };
        assert!(validate_command(&cmd).is_err());
    }
}
