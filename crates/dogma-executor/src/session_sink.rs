//! The seam between the local executor and the session store (C8).
//!
//! Session mutation does not go through [`dogma_kernel::Storage`] — the
//! storage interface is scoped to project/repository content (§4.2). The
//! session store registers itself here instead; if none is registered,
//! session commands are no-ops per §4.4 ("Session commands are no-ops...
//! if session management is disabled on this replica").

use dogma_types::{DogmaError, MasterKeyPayload, SessionPayload};

pub trait SessionSink: Send + Sync {
    fn create_session(&self, session: SessionPayload) -> Result<(), DogmaError>;
    fn remove_session(&self, session_id: &str) -> Result<(), DogmaError>;
    fn create_master_key(&self, key: MasterKeyPayload) -> Result<(), DogmaError>;
}
