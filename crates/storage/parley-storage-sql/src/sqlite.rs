//! SQLite memory store
//!
//! Memory ids are primary keys and inserts use `INSERT OR IGNORE`, so
//! re-processing a platform message never duplicates or rewrites a memory.

use async_trait::async_trait;
use parley_core::memory_store::{Account, LogEntry, MemoryStore};
use parley_core::{Content, Memory, ParleyError, Result, UUID};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

fn db(e: sqlx::Error) -> ParleyError {
    ParleyError::database(e.to_string())
}

fn parse_uuid(column: &str, value: &str) -> Result<UUID> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| ParleyError::database(format!("Invalid {} '{}': {}", column, value, e)))
}

/// SQLite-backed [`MemoryStore`]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    /// Open (creating if missing) the database and apply the schema.
    ///
    /// Accepts a path, a `sqlite:` URL or `:memory:`.
    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Opening SQLite database at: {}", database_path);

        let in_memory = database_path.contains(":memory:");
        let url = if database_path.starts_with("sqlite:") {
            database_path.to_string()
        } else {
            format!("sqlite:{}", database_path)
        };
        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| ParleyError::database(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);

        // Every connection to :memory: is its own database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(db)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        debug!("Initializing SQLite schema...");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL,
                display_name TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS participants (
                user_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (user_id, room_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_memories_room ON memories (room_id, created_at)",
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db)?;
        }
        Ok(())
    }

    /// Number of stored memories
    pub async fn count_memories(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.get("n"))
    }

    /// Stored log entries for a room, oldest first
    pub async fn get_logs(&self, room_id: UUID) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT user_id, room_id, kind, body FROM logs WHERE room_id = ? ORDER BY id ASC",
        )
        .bind(room_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|row| {
                let user_id: String = row.get("user_id");
                let room_id: String = row.get("room_id");
                let body: String = row.get("body");
                Ok(LogEntry {
                    user_id: parse_uuid("user_id", &user_id)?,
                    room_id: parse_uuid("room_id", &room_id)?,
                    kind: row.get("kind"),
                    body: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }
}

fn row_to_memory(row: &SqliteRow) -> Result<Memory> {
    let id: String = row.get("id");
    let agent_id: String = row.get("agent_id");
    let user_id: String = row.get("user_id");
    let room_id: String = row.get("room_id");
    let content: String = row.get("content");
    let embedding: String = row.get("embedding");

    Ok(Memory {
        id: parse_uuid("id", &id)?,
        agent_id: parse_uuid("agent_id", &agent_id)?,
        user_id: parse_uuid("user_id", &user_id)?,
        room_id: parse_uuid("room_id", &room_id)?,
        content: serde_json::from_str::<Content>(&content)?,
        created_at: row.get("created_at"),
        embedding: serde_json::from_str(&embedding)?,
    })
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn create_memory(&self, memory: &Memory) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO memories (id, agent_id, user_id, room_id, content, embedding, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(memory.id.to_string())
        .bind(memory.agent_id.to_string())
        .bind(memory.user_id.to_string())
        .bind(memory.room_id.to_string())
        .bind(serde_json::to_string(&memory.content)?)
        .bind(serde_json::to_string(&memory.embedding)?)
        .bind(memory.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_memory_by_id(&self, id: UUID) -> Result<Option<Memory>> {
        let row = sqlx::query(
            "SELECT id, agent_id, user_id, room_id, content, embedding, created_at
             FROM memories WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(row_to_memory).transpose()
    }

    async fn get_recent_memories(&self, room_id: UUID, count: usize) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, user_id, room_id, content, embedding, created_at
             FROM memories WHERE room_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(room_id.to_string())
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut memories = rows.iter().map(row_to_memory).collect::<Result<Vec<_>>>()?;
        memories.reverse();
        Ok(memories)
    }

    async fn ensure_user_exists(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO accounts (id, user_name, display_name, source) VALUES (?, ?, ?, ?)",
        )
        .bind(account.id.to_string())
        .bind(&account.user_name)
        .bind(&account.display_name)
        .bind(&account.source)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn ensure_room_exists(&self, room_id: UUID) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO rooms (id) VALUES (?)")
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn ensure_participant_in_room(&self, user_id: UUID, room_id: UUID) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO participants (user_id, room_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn log(&self, entry: &LogEntry) -> Result<()> {
        sqlx::query("INSERT INTO logs (user_id, room_id, kind, body) VALUES (?, ?, ?, ?)")
            .bind(entry.user_id.to_string())
            .bind(entry.room_id.to_string())
            .bind(&entry.kind)
            .bind(serde_json::to_string(&entry.body)?)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }
}
