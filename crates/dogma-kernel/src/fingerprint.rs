//! Idempotency fingerprints.
//!
//! A push's `(author, timestamp, baseRevision, changes)` tuple identifies a
//! logically identical replay: if a client retries after a
//! `ReplicationTimeout`, the storage layer can recognize the retry and
//! respond with `RedundantChange` instead of double-applying (§5,
//! "Cancellation & timeouts").

use dogma_types::Command;

/// A stable 32-byte fingerprint of a command's idempotency-relevant
/// fields, suitable for deduplicating retried submissions.
#[must_use]
pub fn fingerprint(command: &Command) -> blake3::Hash {
    let header = command.header();
    let mut hasher = blake3::Hasher::new();
    hasher.update(header.author.name.as_bytes());
    hasher.update(header.author.email.as_bytes());
    hasher.update(&header.timestamp.to_le_bytes());
    hasher.update(command.encode().as_slice());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_types::{Author, CommandHeader};

    #[test]
    fn identical_commands_fingerprint_identically() {
        let cmd = Command::CreateProject {
            header: CommandHeader::new(1, Author::system()),
            project_name: "foo".to_owned(),
        };
        assert_eq!(fingerprint(&cmd), fingerprint(&cmd.clone()));
    }

    #[test]
    fn different_timestamps_fingerprint_differently() {
        let a = Command::CreateProject {
            header: CommandHeader::new(1, Author::system()),
            project_name: "foo".to_owned(),
        };
        let b = Command::CreateProject {
            header: CommandHeader::new(2, Author::system()),
            project_name: "foo".to_owned(),
        };
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
