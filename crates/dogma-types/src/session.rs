//! Authentication sessions and long-lived application tokens (C8).

use serde::{Deserialize, Serialize};

/// An authenticated user session. Replicated via `CreateSession` /
/// `RemoveSession` commands; both live beyond process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub username: String,
    pub creation_time_millis: i64,
    pub expiration_time_millis: i64,
    pub csrf_token: Option<String>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expiration_time_millis
    }
}

/// A long-lived application token. Unlike sessions, tokens never
/// auto-expire; they are deactivated or deleted explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub app_id: String,
    pub secret: String,
    pub is_system_admin: bool,
    pub creation_time_millis: i64,
    pub deactivation_time_millis: Option<i64>,
    pub deletion_time_millis: Option<i64>,
}

impl Token {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deactivation_time_millis.is_none() && self.deletion_time_millis.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expiry_is_inclusive_of_the_boundary() {
        let session = Session {
            id: "s1".to_owned(),
            username: "u".to_owned(),
            creation_time_millis: 0,
            expiration_time_millis: 1000,
            csrf_token: None,
        };
        assert!(!session.is_expired(999));
        assert!(session.is_expired(1000));
    }

    #[test]
    fn token_inactive_once_deactivated() {
        let mut token = Token {
            app_id: "app".to_owned(),
            secret: "s".to_owned(),
            is_system_admin: false,
            creation_time_millis: 0,
            deactivation_time_millis: None,
            deletion_time_millis: None,
        };
        assert!(token.is_active());
        token.deactivation_time_millis = Some(10);
        assert!(!token.is_active());
    }
}
