pub mod cleanup;
pub mod manager;
pub mod store;
pub mod types;

pub use cleanup::{
    Cleanup, CleanupResult, CleanupTask, SESSION_IDLE_TIMEOUT_SECS, SWEEP_INTERVAL_SECS,
};
pub use manager::SessionManager;
pub use store::SessionStore;
pub use types::{MessageRef, Session, SessionState};
