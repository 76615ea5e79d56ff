//! Commit authorship.

use serde::{Deserialize, Serialize};

/// The author of a command or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into() }
    }

    /// The distinguished author used for commits generated by the server
    /// itself rather than on behalf of a user (migrations, sweeps, mirrors).
    #[must_use]
    pub fn system() -> Self {
        Self { name: "System".to_owned(), email: "system@localhost.localdomain".to_owned() }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        *self == Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_author_is_recognized() {
        assert!(Author::system().is_system());
        assert!(!Author::new("a", "a@b").is_system());
    }
}
