//! In-memory log store
//!
//! Entries are kept by id in a `tokio::sync::RwLock<HashMap>`. Nothing is
//! persisted; all entries are lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::logs::error::{LogStoreError, Result};
use crate::logs::types::{LogEntry, LogUpdate, NewLog};
use crate::logs::LogStore;

#[derive(Debug, Clone, Default)]
pub struct MemoryLogStore {
    entries: Arc<RwLock<HashMap<Uuid, LogEntry>>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all users
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn owned_entry<'a>(
    entries: &'a mut HashMap<Uuid, LogEntry>,
    user_id: i64,
    id: Uuid,
) -> Result<&'a mut LogEntry> {
    let entry = entries.get_mut(&id).ok_or(LogStoreError::NotFound(id))?;
    if entry.user_id != user_id {
        return Err(LogStoreError::NotOwner(id));
    }
    Ok(entry)
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn create_log(&self, user_id: i64, log: NewLog) -> Result<LogEntry> {
        log.validate()?;

        let now = Utc::now();
        let entry = LogEntry {
            id: Uuid::new_v4(),
            user_id,
            food_items: log.food_items,
            calories: log.calories,
            confidence: log.confidence,
            timestamp: log.timestamp.unwrap_or(now),
            created_at: now,
            updated_at: now,
        };

        let mut entries = self.entries.write().await;
        entries.insert(entry.id, entry.clone());

        tracing::debug!(user_id = %user_id, log_id = %entry.id, total = entries.len(), "Created log entry");
        Ok(entry)
    }

    async fn list_logs(&self, user_id: i64) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read().await;
        let mut logs: Vec<LogEntry> = entries
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        drop(entries);

        // Newest meal first
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        tracing::debug!(user_id = %user_id, count = logs.len(), "Listed log entries");
        Ok(logs)
    }

    async fn update_log(&self, user_id: i64, id: Uuid, update: LogUpdate) -> Result<LogEntry> {
        let mut entries = self.entries.write().await;
        let entry = owned_entry(&mut entries, user_id, id)?;

        let mut updated = entry.clone();
        updated.apply(update, Utc::now());
        updated.validate()?;

        *entry = updated.clone();
        tracing::debug!(user_id = %user_id, log_id = %id, "Updated log entry");
        Ok(updated)
    }

    async fn delete_log(&self, user_id: i64, id: Uuid) -> Result<()> {
        let mut entries = self.entries.write().await;
        owned_entry(&mut entries, user_id, id)?;
        entries.remove(&id);

        tracing::debug!(user_id = %user_id, log_id = %id, "Deleted log entry");
        Ok(())
    }
}
