//! # Actor Store
//!
//! SQLite persistence for actors, their raw message history, rolling
//! summaries, response links, and per-channel webhook credentials.
//! This layer owns all durable state; everything above it works on
//! request-scoped copies.
//!
//! Actor-record mutations (register/update/delete/transfer) are
//! serialized through an internal async lock so a duplicate name can
//! never slip between the existence check and the insert. History-turn
//! writes and compaction deliberately run outside that lock.

use anyhow::Result;
use chrono::Utc;
use log::debug;
use sqlite::{Connection, ConnectionWithFullMutex, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A registered actor, as stored.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    pub role_id: String,
    pub context: String,
    pub extended_context: Option<String>,
    pub trigger_words: Option<String>,
    pub emoji_trigger_words: Option<String>,
    pub emoji_context: Option<String>,
    pub avatar_url: Option<String>,
    pub owner_id: Option<String>,
    pub summary: Option<String>,
    pub summary_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for registering a new actor.
#[derive(Debug)]
pub struct NewActor<'a> {
    pub name: &'a str,
    pub role_id: &'a str,
    pub context: &'a str,
    pub trigger_words: Option<&'a str>,
    pub extended_context: Option<&'a str>,
    pub emoji_trigger_words: Option<&'a str>,
    pub emoji_context: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub owner_id: Option<&'a str>,
}

/// Partial update for an existing actor. `None` fields are left untouched.
#[derive(Debug, Default)]
pub struct ActorUpdate<'a> {
    pub context: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub trigger_words: Option<&'a str>,
    pub extended_context: Option<&'a str>,
    pub emoji_trigger_words: Option<&'a str>,
    pub emoji_context: Option<&'a str>,
}

impl ActorUpdate<'_> {
    pub fn is_empty(&self) -> bool {
        self.context.is_none()
            && self.avatar_url.is_none()
            && self.trigger_words.is_none()
            && self.extended_context.is_none()
            && self.emoji_trigger_words.is_none()
            && self.emoji_context.is_none()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    NameTaken,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
    NoChanges,
}

/// One raw history turn belonging to an actor.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub id: i64,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<ConnectionWithFullMutex>,
    actor_write_lock: Arc<Mutex<()>>,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open_with_full_mutex(path)?;
        conn.execute("PRAGMA foreign_keys = ON")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS actors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                role_id TEXT NOT NULL,
                context TEXT NOT NULL,
                extended_context TEXT,
                trigger_words TEXT,
                emoji_trigger_words TEXT,
                emoji_context TEXT,
                avatar_url TEXT,
                owner_id TEXT,
                summary TEXT,
                summary_updated_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )?;
        conn.execute("CREATE UNIQUE INDEX IF NOT EXISTS idx_actors_name ON actors(name)")?;
        conn.execute("CREATE UNIQUE INDEX IF NOT EXISTS idx_actors_role ON actors(role_id)")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS history_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id INTEGER NOT NULL,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(actor_id) REFERENCES actors(id) ON DELETE CASCADE
            )",
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_turns_actor_time
             ON history_turns(actor_id, created_at)",
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS response_links (
                message_id TEXT PRIMARY KEY,
                actor_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(actor_id) REFERENCES actors(id) ON DELETE CASCADE
            )",
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS webhooks (
                channel_id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL,
                webhook_token TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )?;

        Ok(Database {
            conn: Arc::new(conn),
            actor_write_lock: Arc::new(Mutex::new(())),
        })
    }

    // --- actor records ---

    pub async fn register_actor(&self, new: &NewActor<'_>) -> Result<RegisterOutcome> {
        let _guard = self.actor_write_lock.lock().await;

        let mut existing = self.conn.prepare("SELECT id FROM actors WHERE name = ?")?;
        existing.bind((1, new.name))?;
        if let State::Row = existing.next()? {
            return Ok(RegisterOutcome::NameTaken);
        }
        drop(existing);

        let now = Utc::now().to_rfc3339();
        let mut insert = self.conn.prepare(
            "INSERT INTO actors (
                name, role_id, context, extended_context, trigger_words,
                emoji_trigger_words, emoji_context, avatar_url, owner_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        insert.bind((1, new.name))?;
        insert.bind((2, new.role_id))?;
        insert.bind((3, new.context))?;
        insert.bind((4, new.extended_context))?;
        insert.bind((5, new.trigger_words))?;
        insert.bind((6, new.emoji_trigger_words))?;
        insert.bind((7, new.emoji_context))?;
        insert.bind((8, new.avatar_url))?;
        insert.bind((9, new.owner_id))?;
        insert.bind((10, now.as_str()))?;
        insert.bind((11, now.as_str()))?;
        insert.next()?;

        debug!("Registered actor '{}'", new.name);
        Ok(RegisterOutcome::Created)
    }

    pub async fn update_actor(&self, name: &str, update: &ActorUpdate<'_>) -> Result<UpdateOutcome> {
        let _guard = self.actor_write_lock.lock().await;

        let mut existing = self.conn.prepare("SELECT id FROM actors WHERE name = ?")?;
        existing.bind((1, name))?;
        if existing.next()? != State::Row {
            return Ok(UpdateOutcome::NotFound);
        }
        drop(existing);

        if update.is_empty() {
            return Ok(UpdateOutcome::NoChanges);
        }

        let mut columns: Vec<(&str, &str)> = Vec::new();
        if let Some(v) = update.context {
            columns.push(("context", v));
        }
        if let Some(v) = update.avatar_url {
            columns.push(("avatar_url", v));
        }
        if let Some(v) = update.trigger_words {
            columns.push(("trigger_words", v));
        }
        if let Some(v) = update.extended_context {
            columns.push(("extended_context", v));
        }
        if let Some(v) = update.emoji_trigger_words {
            columns.push(("emoji_trigger_words", v));
        }
        if let Some(v) = update.emoji_context {
            columns.push(("emoji_context", v));
        }

        let now = Utc::now().to_rfc3339();
        let assignments: Vec<String> = columns
            .iter()
            .map(|(col, _)| format!("{col} = ?"))
            .chain(std::iter::once("updated_at = ?".to_string()))
            .collect();
        let sql = format!(
            "UPDATE actors SET {} WHERE name = ?",
            assignments.join(", ")
        );

        let mut statement = self.conn.prepare(&sql)?;
        let mut index = 1;
        for (_, value) in &columns {
            statement.bind((index, *value))?;
            index += 1;
        }
        statement.bind((index, now.as_str()))?;
        statement.bind((index + 1, name))?;
        statement.next()?;

        Ok(UpdateOutcome::Updated)
    }

    pub async fn transfer_actor(&self, name: &str, owner_id: &str) -> Result<bool> {
        let _guard = self.actor_write_lock.lock().await;

        let now = Utc::now().to_rfc3339();
        let mut statement = self
            .conn
            .prepare("UPDATE actors SET owner_id = ?, updated_at = ? WHERE name = ?")?;
        statement.bind((1, owner_id))?;
        statement.bind((2, now.as_str()))?;
        statement.bind((3, name))?;
        statement.next()?;

        Ok(self.conn.change_count() > 0)
    }

    /// Delete an actor by name. Cascades to its turns and response links.
    pub async fn delete_actor(&self, name: &str) -> Result<bool> {
        let _guard = self.actor_write_lock.lock().await;

        let mut statement = self.conn.prepare("DELETE FROM actors WHERE name = ?")?;
        statement.bind((1, name))?;
        statement.next()?;

        Ok(self.conn.change_count() > 0)
    }

    pub async fn actor_by_name(&self, name: &str) -> Result<Option<Actor>> {
        let mut statement = self.conn.prepare("SELECT * FROM actors WHERE name = ?")?;
        statement.bind((1, name))?;
        Self::read_optional_actor(&mut statement)
    }

    pub async fn actor_by_role(&self, role_id: &str) -> Result<Option<Actor>> {
        let mut statement = self.conn.prepare("SELECT * FROM actors WHERE role_id = ?")?;
        statement.bind((1, role_id))?;
        Self::read_optional_actor(&mut statement)
    }

    pub async fn actor_by_id(&self, id: i64) -> Result<Option<Actor>> {
        let mut statement = self.conn.prepare("SELECT * FROM actors WHERE id = ?")?;
        statement.bind((1, id))?;
        Self::read_optional_actor(&mut statement)
    }

    pub async fn list_actors(&self) -> Result<Vec<Actor>> {
        let mut statement = self.conn.prepare("SELECT * FROM actors ORDER BY name")?;
        let mut actors = Vec::new();
        while let State::Row = statement.next()? {
            actors.push(Self::read_actor(&statement)?);
        }
        Ok(actors)
    }

    // --- history turns ---

    pub async fn record_turn(
        &self,
        actor_id: i64,
        author_id: &str,
        author_name: &str,
        content: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut statement = self.conn.prepare(
            "INSERT INTO history_turns (actor_id, author_id, author_name, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, actor_id))?;
        statement.bind((2, author_id))?;
        statement.bind((3, author_name))?;
        statement.bind((4, content))?;
        statement.bind((5, now.as_str()))?;
        statement.next()?;
        Ok(())
    }

    pub async fn turn_count(&self, actor_id: i64) -> Result<i64> {
        let mut statement = self
            .conn
            .prepare("SELECT COUNT(*) AS cnt FROM history_turns WHERE actor_id = ?")?;
        statement.bind((1, actor_id))?;
        statement.next()?;
        Ok(statement.read::<i64, _>("cnt")?)
    }

    /// The oldest `limit` turns for an actor, oldest first.
    pub async fn oldest_turns(&self, actor_id: i64, limit: i64) -> Result<Vec<HistoryTurn>> {
        let mut statement = self.conn.prepare(
            "SELECT id, author_id, author_name, content, created_at
             FROM history_turns
             WHERE actor_id = ?
             ORDER BY created_at ASC, id ASC
             LIMIT ?",
        )?;
        statement.bind((1, actor_id))?;
        statement.bind((2, limit))?;
        Self::read_turns(&mut statement)
    }

    /// The newest `limit` turns not older than `cutoff`, newest first.
    pub async fn recent_turns(
        &self,
        actor_id: i64,
        cutoff: &str,
        limit: i64,
    ) -> Result<Vec<HistoryTurn>> {
        let mut statement = self.conn.prepare(
            "SELECT id, author_id, author_name, content, created_at
             FROM history_turns
             WHERE actor_id = ? AND created_at >= ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )?;
        statement.bind((1, actor_id))?;
        statement.bind((2, cutoff))?;
        statement.bind((3, limit))?;
        Self::read_turns(&mut statement)
    }

    /// Delete turns by identity. The compactor uses this instead of a
    /// count-based delete so turns inserted concurrently with a
    /// summarization pass are never lost.
    pub async fn delete_turns(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM history_turns WHERE id IN ({placeholders})");
        let mut statement = self.conn.prepare(&sql)?;
        for (i, id) in ids.iter().enumerate() {
            statement.bind((i + 1, *id))?;
        }
        statement.next()?;
        Ok(())
    }

    // --- rolling summaries ---

    pub async fn set_summary(&self, actor_id: i64, summary: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut statement = self.conn.prepare(
            "UPDATE actors SET summary = ?, summary_updated_at = ?, updated_at = ?
             WHERE id = ?",
        )?;
        statement.bind((1, summary))?;
        statement.bind((2, now.as_str()))?;
        statement.bind((3, now.as_str()))?;
        statement.bind((4, actor_id))?;
        statement.next()?;
        Ok(())
    }

    // --- response links ---

    /// Map a delivered message id back to the actor that produced it.
    /// Last write wins if a message id is reused.
    pub async fn link_response(&self, message_id: u64, actor_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut statement = self.conn.prepare(
            "INSERT OR REPLACE INTO response_links (message_id, actor_id, created_at)
             VALUES (?, ?, ?)",
        )?;
        statement.bind((1, message_id.to_string().as_str()))?;
        statement.bind((2, actor_id))?;
        statement.bind((3, now.as_str()))?;
        statement.next()?;
        Ok(())
    }

    pub async fn response_actor(&self, message_id: u64) -> Result<Option<i64>> {
        let mut statement = self
            .conn
            .prepare("SELECT actor_id FROM response_links WHERE message_id = ?")?;
        statement.bind((1, message_id.to_string().as_str()))?;
        if let State::Row = statement.next()? {
            Ok(Some(statement.read::<i64, _>("actor_id")?))
        } else {
            Ok(None)
        }
    }

    // --- channel webhooks ---

    pub async fn webhook_for_channel(&self, channel_id: u64) -> Result<Option<(u64, String)>> {
        let mut statement = self
            .conn
            .prepare("SELECT webhook_id, webhook_token FROM webhooks WHERE channel_id = ?")?;
        statement.bind((1, channel_id.to_string().as_str()))?;
        if let State::Row = statement.next()? {
            let id: String = statement.read::<String, _>("webhook_id")?;
            let token: String = statement.read::<String, _>("webhook_token")?;
            Ok(Some((id.parse()?, token)))
        } else {
            Ok(None)
        }
    }

    pub async fn save_webhook(&self, channel_id: u64, webhook_id: u64, token: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut statement = self.conn.prepare(
            "INSERT INTO webhooks (channel_id, webhook_id, webhook_token, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(channel_id) DO UPDATE SET
                 webhook_id = excluded.webhook_id,
                 webhook_token = excluded.webhook_token,
                 updated_at = excluded.updated_at",
        )?;
        statement.bind((1, channel_id.to_string().as_str()))?;
        statement.bind((2, webhook_id.to_string().as_str()))?;
        statement.bind((3, token))?;
        statement.bind((4, now.as_str()))?;
        statement.next()?;
        Ok(())
    }

    // --- row mapping ---

    fn read_optional_actor(statement: &mut Statement) -> Result<Option<Actor>> {
        if let State::Row = statement.next()? {
            Ok(Some(Self::read_actor(statement)?))
        } else {
            Ok(None)
        }
    }

    fn read_actor(statement: &Statement) -> Result<Actor> {
        Ok(Actor {
            id: statement.read::<i64, _>("id")?,
            name: statement.read::<String, _>("name")?,
            role_id: statement.read::<String, _>("role_id")?,
            context: statement.read::<String, _>("context")?,
            extended_context: statement.read::<Option<String>, _>("extended_context")?,
            trigger_words: statement.read::<Option<String>, _>("trigger_words")?,
            emoji_trigger_words: statement.read::<Option<String>, _>("emoji_trigger_words")?,
            emoji_context: statement.read::<Option<String>, _>("emoji_context")?,
            avatar_url: statement.read::<Option<String>, _>("avatar_url")?,
            owner_id: statement.read::<Option<String>, _>("owner_id")?,
            summary: statement.read::<Option<String>, _>("summary")?,
            summary_updated_at: statement.read::<Option<String>, _>("summary_updated_at")?,
            created_at: statement.read::<String, _>("created_at")?,
            updated_at: statement.read::<String, _>("updated_at")?,
        })
    }

    fn read_turns(statement: &mut Statement) -> Result<Vec<HistoryTurn>> {
        let mut turns = Vec::new();
        while let State::Row = statement.next()? {
            turns.push(HistoryTurn {
                id: statement.read::<i64, _>("id")?,
                author_id: statement.read::<String, _>("author_id")?,
                author_name: statement.read::<String, _>("author_name")?,
                content: statement.read::<String, _>("content")?,
                created_at: statement.read::<String, _>("created_at")?,
            });
        }
        Ok(turns)
    }
}
