//! SQLite-backed durable conversation storage.

use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use tracing::info;

use agora_core::{Turn, TurnRole};

/// Durable turn storage shared by every session handle pointing at the same
/// location. Rows are keyed by `(agent_id, conversation_id)` so two agents
/// never see each other's history even when they share a file.
pub struct DurableStore {
    conn: Mutex<Connection>,
}

impl DurableStore {
    /// Open or create the store at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open session database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!(path = %path, "Session store opened");
        Ok(store)
    }

    /// Create a non-persistent in-process store.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory session store")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS turns (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_key
                ON turns(agent_id, conversation_id);",
        )?;
        Ok(())
    }

    /// Append a turn to one conversation.
    pub fn append(&self, agent_id: &str, conversation_id: &str, turn: &Turn) -> Result<()> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        conn.execute(
            "INSERT INTO turns (agent_id, conversation_id, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent_id,
                conversation_id,
                turn.role.as_str(),
                turn.content,
                turn.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Full ordered history for one conversation.
    pub fn history(&self, agent_id: &str, conversation_id: &str) -> Result<Vec<Turn>> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT role, content, timestamp FROM turns
             WHERE agent_id = ?1 AND conversation_id = ?2 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![agent_id, conversation_id], |row| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            let timestamp: String = row.get(2)?;
            Ok((role, content, timestamp))
        })?;

        // A row that fails to decode is corruption, never skipped.
        let mut turns = Vec::new();
        for row in rows {
            let (role, content, timestamp) = row?;
            let role = match role.as_str() {
                "user" => TurnRole::User,
                "assistant" => TurnRole::Assistant,
                other => bail!("corrupt turn row: unknown role '{other}'"),
            };
            let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
                .with_context(|| format!("corrupt turn row: bad timestamp '{timestamp}'"))?
                .with_timezone(&chrono::Utc);
            turns.push(Turn {
                role,
                content,
                timestamp,
            });
        }

        Ok(turns)
    }

    /// Remove every turn of one conversation.
    pub fn clear(&self, agent_id: &str, conversation_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("session store mutex poisoned");
        conn.execute(
            "DELETE FROM turns WHERE agent_id = ?1 AND conversation_id = ?2",
            params![agent_id, conversation_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_history_ordered() {
        let store = DurableStore::in_memory().unwrap();
        store.append("echo", "c-1", &Turn::user("hi")).unwrap();
        store
            .append("echo", "c-1", &Turn::assistant("hello"))
            .unwrap();

        let history = store.history("echo", "c-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].content, "hello");
    }

    #[test]
    fn test_agents_isolated_in_shared_store() {
        let store = DurableStore::in_memory().unwrap();
        store.append("echo", "c-1", &Turn::user("hi")).unwrap();
        assert!(store.history("other", "c-1").unwrap().is_empty());
    }

    fn insert_raw(store: &DurableStore, role: &str, timestamp: &str) {
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO turns (agent_id, conversation_id, role, content, timestamp)
                 VALUES ('echo', 'c-1', ?1, 'x', ?2)",
                params![role, timestamp],
            )
            .unwrap();
    }

    #[test]
    fn test_unknown_role_is_an_error_not_a_skip() {
        let store = DurableStore::in_memory().unwrap();
        store.append("echo", "c-1", &Turn::user("ok")).unwrap();
        insert_raw(&store, "system", "2026-01-01T00:00:00Z");

        let err = store.history("echo", "c-1").unwrap_err();
        assert!(err.to_string().contains("unknown role 'system'"));
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let store = DurableStore::in_memory().unwrap();
        insert_raw(&store, "user", "not-a-timestamp");

        let err = store.history("echo", "c-1").unwrap_err();
        assert!(err.to_string().contains("bad timestamp"));
    }

    #[test]
    fn test_clear_removes_only_target_conversation() {
        let store = DurableStore::in_memory().unwrap();
        store.append("echo", "c-1", &Turn::user("a")).unwrap();
        store.append("echo", "c-2", &Turn::user("b")).unwrap();
        store.clear("echo", "c-1").unwrap();
        assert!(store.history("echo", "c-1").unwrap().is_empty());
        assert_eq!(store.history("echo", "c-2").unwrap().len(), 1);
    }
}
