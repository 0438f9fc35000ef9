//! Food log entries recorded by the bot and edited through the HTTP API

use async_trait::async_trait;
use uuid::Uuid;

pub mod error;
pub mod store;
pub mod types;

pub use error::LogStoreError;
pub use store::MemoryLogStore;
pub use types::{LogEntry, LogUpdate, NewLog};

/// Per-user storage of food log entries.
///
/// Every operation is scoped to `user_id`; touching another user's entry
/// fails with [`LogStoreError::NotOwner`].
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Validates and stores a new entry, assigning its id and timestamps.
    async fn create_log(&self, user_id: i64, log: NewLog) -> Result<LogEntry, LogStoreError>;

    /// Returns the user's entries, newest `timestamp` first.
    async fn list_logs(&self, user_id: i64) -> Result<Vec<LogEntry>, LogStoreError>;

    /// Applies a partial update. The stored entry is unchanged when the
    /// result would be invalid.
    async fn update_log(
        &self,
        user_id: i64,
        id: Uuid,
        update: LogUpdate,
    ) -> Result<LogEntry, LogStoreError>;

    async fn delete_log(&self, user_id: i64, id: Uuid) -> Result<(), LogStoreError>;
}
