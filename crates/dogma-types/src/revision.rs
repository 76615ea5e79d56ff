//! Repository revisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository revision number.
///
/// Positive values are absolute (`1` is the initial commit). Non-positive
/// values are relative to HEAD (`0` = HEAD, `-1` = HEAD^, …) and must be
/// [normalized](Revision::normalize) against a repository's current head
/// before they can address a specific commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision {
    major: i64,
}

impl Revision {
    /// The initial revision of any repository.
    pub const INIT: Revision = Revision { major: 1 };

    /// The relative revision meaning "current HEAD".
    pub const HEAD: Revision = Revision { major: 0 };

    #[must_use]
    pub fn new(major: i64) -> Self {
        Self { major }
    }

    #[must_use]
    pub fn major(self) -> i64 {
        self.major
    }

    #[must_use]
    pub fn is_relative(self) -> bool {
        self.major <= 0
    }

    #[must_use]
    pub fn is_absolute(self) -> bool {
        !self.is_relative()
    }

    /// Resolves a (possibly relative) revision against a repository's
    /// current head, returning an absolute revision.
    ///
    /// Relative revisions count backwards from `head`: `0` is `head` itself,
    /// `-1` is `head - 1`, and so on. Returns `None` if the result would be
    /// non-positive (before the repository's first commit).
    #[must_use]
    pub fn normalize(self, head: Revision) -> Option<Revision> {
        if self.is_absolute() {
            return Some(self);
        }
        let resolved = head.major + self.major;
        if resolved < 1 {
            None
        } else {
            Some(Revision::new(resolved))
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)
    }
}

impl From<i64> for Revision {
    fn from(major: i64) -> Self {
        Self { major }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_normalizes_to_head() {
        assert_eq!(Revision::HEAD.normalize(Revision::new(42)), Some(Revision::new(42)));
    }

    #[test]
    fn negative_offsets_count_backwards() {
        assert_eq!(Revision::new(-2).normalize(Revision::new(42)), Some(Revision::new(40)));
    }

    #[test]
    fn absolute_revisions_pass_through() {
        assert_eq!(Revision::new(5).normalize(Revision::new(42)), Some(Revision::new(5)));
    }

    #[test]
    fn underflow_before_first_commit_is_none() {
        assert_eq!(Revision::new(-5).normalize(Revision::new(3)), None);
    }
}
