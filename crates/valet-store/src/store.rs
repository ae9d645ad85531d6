use libsql::{Builder, Connection, Database};
use valet_core::error::{Result, ValetError};
use valet_core::types::*;

pub struct AssistantStore {
    db: Database,
}

fn db_err(e: libsql::Error) -> ValetError {
    ValetError::Database(e.to_string())
}

/// Read a nullable TEXT column as Option<String>.
fn get_optional_string(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    let val = row.get::<libsql::Value>(idx).map_err(db_err)?;
    match val {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(ValetError::Database(format!(
            "expected text or null at column {idx}, got: {other:?}"
        ))),
    }
}

/// Read a nullable INTEGER column as Option<i64>.
fn get_optional_i64(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
    let val = row.get::<libsql::Value>(idx).map_err(db_err)?;
    match val {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(i) => Ok(Some(i)),
        other => Err(ValetError::Database(format!(
            "expected integer or null at column {idx}, got: {other:?}"
        ))),
    }
}

impl AssistantStore {
    /// Open a local libsql database at the given file path.
    pub async fn new(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(db_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Open a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(db_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Get a fresh database connection. For remote databases this creates
    /// a new Hrana stream, avoiding STREAM_EXPIRED errors.
    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(db_err)
    }

    async fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                intent TEXT,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                remind_at INTEGER NOT NULL,
                is_recurring INTEGER NOT NULL DEFAULT 0,
                recurrence_rule TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                is_sent INTEGER NOT NULL DEFAULT 0,
                sent_at INTEGER,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                description TEXT,
                location TEXT,
                status TEXT NOT NULL DEFAULT 'confirmed',
                external_id TEXT,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                chat_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                confidence REAL NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (chat_id, key)
            )",
            (),
        )
        .await
        .map_err(db_err)?;

        Ok(())
    }

    // ---- conversations ----

    pub async fn save_conversation(
        &self,
        chat_id: i64,
        role: &str,
        content: &str,
        intent: Option<&str>,
    ) -> Result<ConversationRow> {
        let id = new_id();
        let now = now_unix();

        self.conn()?
            .execute(
                "INSERT INTO conversations (id, chat_id, role, content, intent, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    id.clone(),
                    chat_id,
                    role.to_string(),
                    content.to_string(),
                    intent.map(|s| s.to_string()),
                    now
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(ConversationRow {
            id,
            chat_id,
            role: role.to_string(),
            content: content.to_string(),
            intent: intent.map(|s| s.to_string()),
            created_at: now,
        })
    }

    /// Most recent `limit` rows for a chat, oldest first.
    pub async fn recent_conversations(&self, chat_id: i64, limit: u32) -> Result<Vec<ConversationRow>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, chat_id, role, content, intent, created_at FROM conversations
                 WHERE chat_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                libsql::params![chat_id, limit as i64],
            )
            .await
            .map_err(db_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(ConversationRow {
                id: row.get::<String>(0).map_err(db_err)?,
                chat_id: row.get::<i64>(1).map_err(db_err)?,
                role: row.get::<String>(2).map_err(db_err)?,
                content: row.get::<String>(3).map_err(db_err)?,
                intent: get_optional_string(&row, 4)?,
                created_at: row.get::<i64>(5).map_err(db_err)?,
            });
        }

        out.reverse();
        Ok(out)
    }

    // ---- reminders ----

    pub async fn create_reminder(
        &self,
        chat_id: i64,
        title: &str,
        description: Option<&str>,
        remind_at: i64,
        is_recurring: bool,
        recurrence_rule: Option<&str>,
    ) -> Result<Reminder> {
        let id = new_id();
        let now = now_unix();
        let status = "active".to_string();

        self.conn()?
            .execute(
                "INSERT INTO reminders (id, chat_id, title, description, remind_at, is_recurring, recurrence_rule, status, is_sent, sent_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, ?9)",
                libsql::params![
                    id.clone(),
                    chat_id,
                    title.to_string(),
                    description.map(|s| s.to_string()),
                    remind_at,
                    is_recurring as i64,
                    recurrence_rule.map(|s| s.to_string()),
                    status.clone(),
                    now
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(Reminder {
            id,
            chat_id,
            title: title.to_string(),
            description: description.map(|s| s.to_string()),
            remind_at,
            is_recurring,
            recurrence_rule: recurrence_rule.map(|s| s.to_string()),
            status,
            is_sent: false,
            sent_at: None,
            created_at: now,
        })
    }

    pub async fn get_reminder(&self, id: &str) -> Result<Option<Reminder>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, chat_id, title, description, remind_at, is_recurring, recurrence_rule, status, is_sent, sent_at, created_at
                 FROM reminders WHERE id = ?1",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_reminder(&row)?)),
            None => Ok(None),
        }
    }

    /// Active reminders for a chat, soonest first.
    pub async fn active_reminders(&self, chat_id: i64) -> Result<Vec<Reminder>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, chat_id, title, description, remind_at, is_recurring, recurrence_rule, status, is_sent, sent_at, created_at
                 FROM reminders WHERE chat_id = ?1 AND status = 'active' ORDER BY remind_at ASC",
                libsql::params![chat_id],
            )
            .await
            .map_err(db_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_reminder(&row)?);
        }
        Ok(out)
    }

    /// Active, unsent reminders due at or before `before`.
    pub async fn pending_reminders(&self, before: i64) -> Result<Vec<Reminder>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, chat_id, title, description, remind_at, is_recurring, recurrence_rule, status, is_sent, sent_at, created_at
                 FROM reminders WHERE status = 'active' AND is_sent = 0 AND remind_at <= ?1 ORDER BY remind_at ASC",
                libsql::params![before],
            )
            .await
            .map_err(db_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_reminder(&row)?);
        }
        Ok(out)
    }

    /// Mark a reminder sent. Idempotent: a reminder already sent is left
    /// untouched, keeping its original sent_at.
    pub async fn mark_reminder_sent(&self, id: &str) -> Result<()> {
        let now = now_unix();
        self.conn()?
            .execute(
                "UPDATE reminders SET is_sent = 1, sent_at = ?1, status = 'sent'
                 WHERE id = ?2 AND is_sent = 0",
                libsql::params![now, id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Cancel a reminder. Returns false when no active reminder matched.
    pub async fn cancel_reminder(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()?
            .execute(
                "UPDATE reminders SET status = 'cancelled' WHERE id = ?1 AND status = 'active'",
                libsql::params![id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    /// Advance a recurring reminder to its next fire time, clearing the
    /// sent flag so the next occurrence can deliver.
    pub async fn reset_reminder(&self, id: &str, next_remind_at: i64) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE reminders SET remind_at = ?1, is_sent = 0, sent_at = NULL, status = 'active' WHERE id = ?2",
                libsql::params![next_remind_at, id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ---- events ----

    #[allow(clippy::too_many_arguments)]
    pub async fn create_event(
        &self,
        chat_id: i64,
        title: &str,
        start_time: i64,
        end_time: Option<i64>,
        description: Option<&str>,
        location: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<Event> {
        let id = new_id();
        let now = now_unix();
        let status = "confirmed".to_string();

        self.conn()?
            .execute(
                "INSERT INTO events (id, chat_id, title, start_time, end_time, description, location, status, external_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                libsql::params![
                    id.clone(),
                    chat_id,
                    title.to_string(),
                    start_time,
                    end_time,
                    description.map(|s| s.to_string()),
                    location.map(|s| s.to_string()),
                    status.clone(),
                    external_id.map(|s| s.to_string()),
                    now
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(Event {
            id,
            chat_id,
            title: title.to_string(),
            start_time,
            end_time,
            description: description.map(|s| s.to_string()),
            location: location.map(|s| s.to_string()),
            status,
            external_id: external_id.map(|s| s.to_string()),
            created_at: now,
        })
    }

    /// Confirmed events starting at or after `from`, soonest first.
    pub async fn upcoming_events(&self, chat_id: i64, from: i64) -> Result<Vec<Event>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, chat_id, title, start_time, end_time, description, location, status, external_id, created_at
                 FROM events WHERE chat_id = ?1 AND status = 'confirmed' AND start_time >= ?2 ORDER BY start_time ASC",
                libsql::params![chat_id, from],
            )
            .await
            .map_err(db_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_event(&row)?);
        }
        Ok(out)
    }

    /// Update an event's status. Valid: "confirmed", "tentative", "cancelled".
    pub async fn update_event_status(&self, id: &str, status: &str) -> Result<()> {
        match status {
            "confirmed" | "tentative" | "cancelled" => {}
            _ => {
                return Err(ValetError::Database(format!(
                    "invalid event status: '{status}'. Must be one of: confirmed, tentative, cancelled"
                )));
            }
        }

        let affected = self
            .conn()?
            .execute(
                "UPDATE events SET status = ?1 WHERE id = ?2",
                libsql::params![status.to_string(), id.to_string()],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(ValetError::Database(format!("event not found: {id}")));
        }

        Ok(())
    }

    // ---- preferences ----

    pub async fn save_preference(
        &self,
        chat_id: i64,
        key: &str,
        value: &str,
        confidence: f64,
    ) -> Result<()> {
        let now = now_unix();
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO preferences (chat_id, key, value, confidence, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![chat_id, key.to_string(), value.to_string(), confidence, now],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_preference(&self, chat_id: i64, key: &str) -> Result<Option<Preference>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT chat_id, key, value, confidence, updated_at FROM preferences
                 WHERE chat_id = ?1 AND key = ?2",
                libsql::params![chat_id, key.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(Preference {
                chat_id: row.get::<i64>(0).map_err(db_err)?,
                key: row.get::<String>(1).map_err(db_err)?,
                value: row.get::<String>(2).map_err(db_err)?,
                confidence: row.get::<f64>(3).map_err(db_err)?,
                updated_at: row.get::<i64>(4).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }
}

/// Extract a Reminder from a libsql Row. Expects columns in the standard
/// order: id, chat_id, title, description, remind_at, is_recurring,
/// recurrence_rule, status, is_sent, sent_at, created_at
fn row_to_reminder(row: &libsql::Row) -> Result<Reminder> {
    Ok(Reminder {
        id: row.get::<String>(0).map_err(db_err)?,
        chat_id: row.get::<i64>(1).map_err(db_err)?,
        title: row.get::<String>(2).map_err(db_err)?,
        description: get_optional_string(row, 3)?,
        remind_at: row.get::<i64>(4).map_err(db_err)?,
        is_recurring: row.get::<i64>(5).map_err(db_err)? != 0,
        recurrence_rule: get_optional_string(row, 6)?,
        status: row.get::<String>(7).map_err(db_err)?,
        is_sent: row.get::<i64>(8).map_err(db_err)? != 0,
        sent_at: get_optional_i64(row, 9)?,
        created_at: row.get::<i64>(10).map_err(db_err)?,
    })
}

fn row_to_event(row: &libsql::Row) -> Result<Event> {
    Ok(Event {
        id: row.get::<String>(0).map_err(db_err)?,
        chat_id: row.get::<i64>(1).map_err(db_err)?,
        title: row.get::<String>(2).map_err(db_err)?,
        start_time: row.get::<i64>(3).map_err(db_err)?,
        end_time: get_optional_i64(row, 4)?,
        description: get_optional_string(row, 5)?,
        location: get_optional_string(row, 6)?,
        status: row.get::<String>(7).map_err(db_err)?,
        external_id: get_optional_string(row, 8)?,
        created_at: row.get::<i64>(9).map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // libsql's local `:memory:` databases are per-connection, and the
    // store opens a fresh connection per call, so tests need a real
    // scratch file to share state across calls.
    fn temp_db_path() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("valet_store_test_{}_{n}.db", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    async fn memory_store() -> AssistantStore {
        AssistantStore::new(&temp_db_path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_reminder_round_trip() {
        let store = memory_store().await;

        let created = store
            .create_reminder(42, "call mom", None, 1_900_000_000, false, None)
            .await
            .unwrap();

        let active = store.active_reminders(42).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, created.id);
        assert_eq!(active[0].title, "call mom");
        assert!(!active[0].is_sent);
    }

    #[tokio::test]
    async fn test_mark_reminder_sent_idempotent() {
        let store = memory_store().await;

        let r = store
            .create_reminder(1, "water plants", None, 1_900_000_000, false, None)
            .await
            .unwrap();

        store.mark_reminder_sent(&r.id).await.unwrap();
        let first = store.get_reminder(&r.id).await.unwrap().unwrap();
        assert!(first.is_sent);
        let first_sent_at = first.sent_at.unwrap();

        // Second call must not touch the row
        store.mark_reminder_sent(&r.id).await.unwrap();
        let second = store.get_reminder(&r.id).await.unwrap().unwrap();
        assert_eq!(second.sent_at.unwrap(), first_sent_at);
        assert_eq!(second.status, "sent");
    }

    #[tokio::test]
    async fn test_cancel_reminder() {
        let store = memory_store().await;

        let r = store
            .create_reminder(1, "dentist", None, 1_900_000_000, false, None)
            .await
            .unwrap();

        assert!(store.cancel_reminder(&r.id).await.unwrap());
        // Already cancelled: reported as not found
        assert!(!store.cancel_reminder(&r.id).await.unwrap());
        assert!(store.active_reminders(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_reminders_window() {
        let store = memory_store().await;

        store
            .create_reminder(1, "due", None, 100, false, None)
            .await
            .unwrap();
        store
            .create_reminder(1, "not yet", None, 10_000, false, None)
            .await
            .unwrap();

        let due = store.pending_reminders(500).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].title, "due");
    }

    #[tokio::test]
    async fn test_conversation_order_and_limit() {
        let store = memory_store().await;

        store
            .save_conversation(7, "user", "first", Some("general_query"))
            .await
            .unwrap();
        store
            .save_conversation(7, "assistant", "second", None)
            .await
            .unwrap();

        let rows = store.recent_conversations(7, 5).await.unwrap();
        assert_eq!(rows.len(), 2);
        // Oldest first
        assert_eq!(rows[0].content, "first");
        assert_eq!(rows[0].intent.as_deref(), Some("general_query"));
    }

    #[tokio::test]
    async fn test_preference_upsert() {
        let store = memory_store().await;

        store
            .save_preference(3, "default_reminder_before", "600", 0.8)
            .await
            .unwrap();
        store
            .save_preference(3, "default_reminder_before", "900", 0.8)
            .await
            .unwrap();

        let pref = store
            .get_preference(3, "default_reminder_before")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pref.value, "900");
    }

    #[tokio::test]
    async fn test_event_status_validation() {
        let store = memory_store().await;

        let e = store
            .create_event(1, "standup", 1_900_000_000, None, None, None, None)
            .await
            .unwrap();

        assert!(store.update_event_status(&e.id, "cancelled").await.is_ok());
        assert!(store.update_event_status(&e.id, "bogus").await.is_err());
        assert!(store.upcoming_events(1, 0).await.unwrap().is_empty());
    }
}
