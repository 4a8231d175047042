//! Memory store boundary used by every pipeline stage

use crate::types::{Memory, UUID};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Participant identity recorded before the first memory in a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Participant id
    pub user_id: UUID,
    /// Room id
    pub room_id: UUID,
    /// Platform handle
    pub user_name: String,
    /// Display name
    pub display_name: String,
    /// Originating platform
    pub source: String,
}

/// A stored account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id
    pub id: UUID,
    /// Platform handle
    pub user_name: String,
    /// Display name
    pub display_name: String,
    /// Originating platform
    pub source: String,
}

/// Generation log entry (prompt/response pairs, decisions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Who triggered the log
    pub user_id: UUID,
    /// Room it belongs to
    pub room_id: UUID,
    /// Log kind (`"response"`, `"action"`)
    pub kind: String,
    /// Free-form body
    pub body: serde_json::Value,
}

/// Persistence contract for memories, rooms, participants and logs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist a memory. Creating the same id twice keeps the first copy.
    ///
    /// Returns `true` when the memory was newly inserted.
    async fn create_memory(&self, memory: &Memory) -> Result<bool>;

    /// Fetch a memory by id
    async fn get_memory_by_id(&self, id: UUID) -> Result<Option<Memory>>;

    /// Most recent memories in a room, oldest first
    async fn get_recent_memories(&self, room_id: UUID, count: usize) -> Result<Vec<Memory>>;

    /// Create the account if missing
    async fn ensure_user_exists(&self, account: &Account) -> Result<()>;

    /// Create the room if missing
    async fn ensure_room_exists(&self, room_id: UUID) -> Result<()>;

    /// Add the participant to the room if missing
    async fn ensure_participant_in_room(&self, user_id: UUID, room_id: UUID) -> Result<()>;

    /// Append a generation log entry
    async fn log(&self, entry: &LogEntry) -> Result<()>;

    /// Make sure account, room and membership exist
    async fn ensure_connection(&self, connection: &Connection) -> Result<()> {
        self.ensure_user_exists(&Account {
            id: connection.user_id,
            user_name: connection.user_name.clone(),
            display_name: connection.display_name.clone(),
            source: connection.source.clone(),
        })
        .await?;
        self.ensure_room_exists(connection.room_id).await?;
        self.ensure_participant_in_room(connection.user_id, connection.room_id)
            .await
    }
}

#[derive(Default)]
struct Inner {
    memories: HashMap<UUID, Memory>,
    order: Vec<UUID>,
    accounts: HashMap<UUID, Account>,
    rooms: HashSet<UUID>,
    participants: HashSet<(UUID, UUID)>,
    logs: Vec<LogEntry>,
}

/// Process-local store, used for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every memory in insertion order
    pub async fn memories(&self) -> Vec<Memory> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.memories.get(id).cloned())
            .collect()
    }

    /// Every log entry in insertion order
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.inner.read().await.logs.clone()
    }

    /// Whether the user participates in the room
    pub async fn is_participant(&self, user_id: UUID, room_id: UUID) -> bool {
        self.inner
            .read()
            .await
            .participants
            .contains(&(user_id, room_id))
    }

    /// Stored account by id
    pub async fn account(&self, id: UUID) -> Option<Account> {
        self.inner.read().await.accounts.get(&id).cloned()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn create_memory(&self, memory: &Memory) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.memories.contains_key(&memory.id) {
            return Ok(false);
        }
        inner.order.push(memory.id);
        inner.memories.insert(memory.id, memory.clone());
        Ok(true)
    }

    async fn get_memory_by_id(&self, id: UUID) -> Result<Option<Memory>> {
        Ok(self.inner.read().await.memories.get(&id).cloned())
    }

    async fn get_recent_memories(&self, room_id: UUID, count: usize) -> Result<Vec<Memory>> {
        let inner = self.inner.read().await;
        let mut recent: Vec<Memory> = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.memories.get(id))
            .filter(|m| m.room_id == room_id)
            .take(count)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn ensure_user_exists(&self, account: &Account) -> Result<()> {
        self.inner
            .write()
            .await
            .accounts
            .entry(account.id)
            .or_insert_with(|| account.clone());
        Ok(())
    }

    async fn ensure_room_exists(&self, room_id: UUID) -> Result<()> {
        self.inner.write().await.rooms.insert(room_id);
        Ok(())
    }

    async fn ensure_participant_in_room(&self, user_id: UUID, room_id: UUID) -> Result<()> {
        self.inner
            .write()
            .await
            .participants
            .insert((user_id, room_id));
        Ok(())
    }

    async fn log(&self, entry: &LogEntry) -> Result<()> {
        self.inner.write().await.logs.push(entry.clone());
        Ok(())
    }
}
