//! File-level changes within a push.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single file-level mutation carried by a push.
///
/// Paths are always absolute (`/`-prefixed), `/`-separated, and contain no
/// empty segments or `..` components — see [`validate_path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Change {
    #[serde(rename = "UPSERT_JSON")]
    UpsertJson { path: String, content: Value },
    #[serde(rename = "UPSERT_YAML")]
    UpsertYaml { path: String, content: String },
    #[serde(rename = "UPSERT_TEXT")]
    UpsertText { path: String, content: String },
    #[serde(rename = "REMOVE")]
    Remove { path: String },
    #[serde(rename = "RENAME")]
    Rename { path: String, new_path: String },
    #[serde(rename = "APPLY_JSON_PATCH")]
    ApplyJsonPatch { path: String, patch: Value },
    #[serde(rename = "APPLY_TEXT_PATCH")]
    ApplyTextPatch { path: String, patch: String },
}

/// Errors produced while validating or normalizing a [`Change`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeError {
    #[error("path must be absolute and use '/' separators: {0}")]
    InvalidPath(String),
    #[error("rename target already exists: {0}")]
    RenameTargetExists(String),
}

impl Change {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Change::UpsertJson { path, .. }
            | Change::UpsertYaml { path, .. }
            | Change::UpsertText { path, .. }
            | Change::Remove { path }
            | Change::Rename { path, .. }
            | Change::ApplyJsonPatch { path, .. }
            | Change::ApplyTextPatch { path, .. } => path,
        }
    }

    /// Validates every path carried by this change, and normalizes
    /// `UpsertText` content (CRLF → LF, trailing newline enforced).
    pub fn validate(self) -> Result<Change, ChangeError> {
        validate_path(self.path())?;
        if let Change::Rename { new_path, .. } = &self {
            validate_path(new_path)?;
        }
        Ok(match self {
            Change::UpsertText { path, content } => {
                Change::UpsertText { path, content: sanitize_text(&content) }
            }
            other => other,
        })
    }
}

/// Normalizes line endings and ensures a single trailing newline, per the
/// text-upsert invariant.
#[must_use]
pub fn sanitize_text(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    if normalized.ends_with('\n') {
        normalized
    } else {
        let mut s = normalized;
        s.push('\n');
        s
    }
}

/// Validates that `path` is absolute, `/`-separated, and contains no empty
/// segments or `..` components.
pub fn validate_path(path: &str) -> Result<(), ChangeError> {
    if !path.starts_with('/') {
        return Err(ChangeError::InvalidPath(path.to_owned()));
    }
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    if segments.iter().any(|seg| seg.is_empty() || *seg == "..") {
        return Err(ChangeError::InvalidPath(path.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        assert!(validate_path("x.txt").is_err());
    }

    #[test]
    fn rejects_dot_dot_segments() {
        assert!(validate_path("/a/../b").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_path("/a//b").is_err());
    }

    #[test]
    fn accepts_well_formed_paths() {
        assert!(validate_path("/a/b/c.txt").is_ok());
    }

    #[test]
    fn text_upsert_gets_crlf_normalized_and_trailing_newline() {
        let change = Change::UpsertText { path: "/x.txt".to_owned(), content: "a\r\nb".to_owned() }
            .validate()
            .unwrap();
        match change {
            Change::UpsertText { content, .. } => assert_eq!(content, "a\nb\n"),
            _ => panic!("expected UpsertText"),
        }
    }

    #[test]
    fn already_terminated_text_is_unchanged() {
        assert_eq!(sanitize_text("hi\n"), "hi\n");
    }
}
