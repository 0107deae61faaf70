//! SQLite-backed conversation history.
//!
//! Conversations and their messages live in a separate database from the
//! chunk index so clearing one never touches the other. Message order is
//! insertion order (autoincrement id), which also serves as the stable
//! sort key.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct ConversationStore {
    pool: SqlitePool,
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

impl ConversationStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = now_iso();

        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Conversation {
            id,
            title: title.map(str::to_string),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Conversation {
            id: r.get("id"),
            title: r.get("title"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Most recently updated conversations first.
    pub async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations \
             ORDER BY updated_at DESC, id ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Conversation {
                id: r.get("id"),
                title: r.get("title"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
                .bind(title)
                .bind(now_iso())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append a message and touch the conversation's `updated_at`.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<i64> {
        let now = now_iso();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    /// Messages in insertion order; `limit` keeps only the most recent N.
    pub async fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows
            .into_iter()
            .map(|r| Message {
                id: r.get("id"),
                conversation_id: r.get("conversation_id"),
                role: r.get("role"),
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect();

        if let Some(limit) = limit {
            if messages.len() > limit {
                messages.drain(..messages.len() - limit);
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir) -> ConversationStore {
        ConversationStore::connect(&dir.path().join("conversations.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let conv = store.create_conversation(Some("Proxy setup")).await.unwrap();
        let fetched = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Proxy setup"));
        assert!(store.get_conversation("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_kept_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let conv = store.create_conversation(None).await.unwrap();

        store.append_message(&conv.id, "user", "first").await.unwrap();
        store.append_message(&conv.id, "assistant", "second").await.unwrap();
        store.append_message(&conv.id, "user", "third").await.unwrap();

        let messages = store.get_messages(&conv.id, None).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);

        let recent = store.get_messages(&conv.id, Some(2)).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn listing_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let mut ids = Vec::new();
        for title in ["first", "second", "third"] {
            ids.push(store.create_conversation(Some(title)).await.unwrap().id);
        }

        let all = store.list_conversations(10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|c| ids.contains(&c.id)));

        let limited = store.list_conversations(2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let conv = store.create_conversation(None).await.unwrap();

        assert!(store.rename_conversation(&conv.id, "Renamed").await.unwrap());
        assert!(!store.rename_conversation("missing", "x").await.unwrap());

        store.append_message(&conv.id, "user", "hello").await.unwrap();
        assert!(store.delete_conversation(&conv.id).await.unwrap());
        assert!(store.get_conversation(&conv.id).await.unwrap().is_none());
        assert!(store.get_messages(&conv.id, None).await.unwrap().is_empty());
    }
}
