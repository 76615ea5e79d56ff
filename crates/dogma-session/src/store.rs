//! The session cache and token registry (C8's storage side).
//!
//! Sessions are replicated: `CreateSession`/`RemoveSession` commands flow
//! through the same command pipeline as repository writes (C1/C6), and this
//! store's [`dogma_executor::SessionSink`] impl is the apply side every
//! replica runs once a command commits. Tokens carry no command of their
//! own in this command set (§1 scopes token *management* UI/API out) so
//! they're tracked locally, not replicated — see `DESIGN.md`.

use std::collections::HashMap;
use std::sync::Arc;

use dogma_executor::SessionSink;
use dogma_kernel::Clock;
use dogma_types::{DogmaError, MasterKeyPayload, Session, SessionPayload, Token};
use lru::LruCache;
use parking_lot::Mutex;

/// Default bounded size of the session cache (§6, `authentication.sessionCacheSpec`).
pub const DEFAULT_SESSION_CACHE_CAPACITY: usize = 8192;
/// Default session lifetime: 8 hours (§6, `authentication.sessionTimeoutMillis`).
pub const DEFAULT_SESSION_TIMEOUT_MILLIS: i64 = 8 * 60 * 60 * 1000;

/// Bounded LRU session cache, a token registry, and the current session
/// signing key, replicated into every replica via [`SessionSink`].
pub struct SessionStore {
    cache: Mutex<LruCache<String, Session>>,
    tokens: Mutex<HashMap<String, Token>>,
    master_key: Mutex<Option<MasterKeyPayload>>,
    clock: Arc<dyn Clock>,
    timeout_millis: i64,
}

impl SessionStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_SESSION_CACHE_CAPACITY, DEFAULT_SESSION_TIMEOUT_MILLIS)
    }

    #[must_use]
    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize, timeout_millis: i64) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity).unwrap_or(std::num::NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            tokens: Mutex::new(HashMap::new()),
            master_key: Mutex::new(None),
            clock,
            timeout_millis,
        }
    }

    #[must_use]
    pub fn timeout_millis(&self) -> i64 {
        self.timeout_millis
    }

    /// Builds the payload for a new session starting now, ready to submit as
    /// a `CreateSession` command.
    #[must_use]
    pub fn new_session_payload(&self, id: String, username: String, csrf_token: Option<String>) -> SessionPayload {
        let now = self.clock.now_millis();
        SessionPayload { id, username, creation_time: now, expiration_time: now + self.timeout_millis, csrf_token }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.cache.lock().get(id).cloned()
    }

    /// IDs of every cached session expired as of now. The sweep submits a
    /// `RemoveSession` for each; already-removed entries are simply absent
    /// from the next scan, which is what makes repeated sweeps idempotent.
    #[must_use]
    pub fn expired_ids(&self) -> Vec<String> {
        let now = self.clock.now_millis();
        self.cache.lock().iter().filter(|(_, session)| session.is_expired(now)).map(|(id, _)| id.clone()).collect()
    }

    #[must_use]
    pub fn master_key(&self) -> Option<MasterKeyPayload> {
        self.master_key.lock().clone()
    }

    pub fn create_token(&self, token: Token) {
        self.tokens.lock().insert(token.app_id.clone(), token);
    }

    #[must_use]
    pub fn token(&self, app_id: &str) -> Option<Token> {
        self.tokens.lock().get(app_id).cloned()
    }

    pub fn deactivate_token(&self, app_id: &str) -> Result<(), DogmaError> {
        let mut tokens = self.tokens.lock();
        let token = tokens.get_mut(app_id).ok_or_else(|| DogmaError::NotFound(format!("token: {app_id}")))?;
        token.deactivation_time_millis = Some(self.clock.now_millis());
        Ok(())
    }

    pub fn delete_token(&self, app_id: &str) -> Result<(), DogmaError> {
        let mut tokens = self.tokens.lock();
        let token = tokens.get_mut(app_id).ok_or_else(|| DogmaError::NotFound(format!("token: {app_id}")))?;
        token.deletion_time_millis = Some(self.clock.now_millis());
        Ok(())
    }
}

impl SessionSink for SessionStore {
    fn create_session(&self, session: SessionPayload) -> Result<(), DogmaError> {
        let session = Session {
            id: session.id,
            username: session.username,
            creation_time_millis: session.creation_time,
            expiration_time_millis: session.expiration_time,
            csrf_token: session.csrf_token,
        };
        self.cache.lock().put(session.id.clone(), session);
        Ok(())
    }

    fn remove_session(&self, session_id: &str) -> Result<(), DogmaError> {
        // Popping an absent key is a no-op, which is exactly what makes a
        // repeated sweep over an already-removed session harmless.
        self.cache.lock().pop(session_id);
        Ok(())
    }

    fn create_master_key(&self, key: MasterKeyPayload) -> Result<(), DogmaError> {
        *self.master_key.lock() = Some(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogma_kernel::FixedClock;

    fn store() -> SessionStore {
        SessionStore::with_capacity(Arc::new(FixedClock::new(0)), 4, 1000)
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let payload = store.new_session_payload("s1".to_owned(), "alice".to_owned(), None);
        store.create_session(payload).unwrap();
        let session = store.get("s1").unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.expiration_time_millis, 1000);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = store();
        store.remove_session("missing").unwrap();
        store.remove_session("missing").unwrap();
    }

    #[test]
    fn expired_ids_finds_only_stale_sessions() {
        let clock = Arc::new(FixedClock::new(1000));
        let store = SessionStore::with_capacity(clock, 4, 1000);
        store
            .create_session(SessionPayload {
                id: "fresh".to_owned(),
                username: "a".to_owned(),
                creation_time: 1000,
                expiration_time: 5000,
                csrf_token: None,
            })
            .unwrap();
        store
            .create_session(SessionPayload {
                id: "stale".to_owned(),
                username: "b".to_owned(),
                creation_time: 0,
                expiration_time: 500,
                csrf_token: None,
            })
            .unwrap();
        let expired = store.expired_ids();
        assert_eq!(expired, vec!["stale".to_owned()]);
    }

    #[test]
    fn token_lifecycle_is_local_and_not_replicated() {
        let store = store();
        store.create_token(Token {
            app_id: "app1".to_owned(),
            secret: "shh".to_owned(),
            is_system_admin: false,
            creation_time_millis: 0,
            deactivation_time_millis: None,
            deletion_time_millis: None,
        });
        assert!(store.token("app1").unwrap().is_active());
        store.deactivate_token("app1").unwrap();
        assert!(!store.token("app1").unwrap().is_active());
    }
}
