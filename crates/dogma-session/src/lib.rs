//! # dogma-session: session and token store (C8)
//!
//! A bounded LRU session cache kept in sync across replicas by registering
//! [`SessionStore`] as the [`dogma_executor::SessionSink`] for the local
//! executor, plus a cron-scheduled sweep that retires expired sessions by
//! submitting ordinary `RemoveSession` commands through the replicated
//! executor (C6) — sessions are first-class replicated state, not a
//! side-channel.

mod store;
mod sweep;

pub use store::{SessionStore, DEFAULT_SESSION_CACHE_CAPACITY, DEFAULT_SESSION_TIMEOUT_MILLIS};
pub use sweep::{SessionSweeper, DEFAULT_SWEEP_SCHEDULE};
