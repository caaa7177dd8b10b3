//! SQLite-backed chat log and document records.
//!
//! One shared database file holds the append-only conversation log and one
//! row per ingested task. Schema creation is lazy and idempotent
//! (`CREATE TABLE IF NOT EXISTS`), so ingestion and session processes can
//! all call [`init_schema`] without coordination. Cross-process safety
//! relies on SQLite's own locking; nothing here assumes atomicity beyond
//! single-statement inserts.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::StorageError;
use crate::models::{ChatTurn, DocumentRecord, Role};

/// Open (creating if missing) the shared store.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, StorageError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the schema. Safe to call repeatedly and from multiple processes.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            task_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chats_task_id ON chats(task_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert or replace the document record for a task.
pub async fn upsert_document(
    pool: &SqlitePool,
    task_id: &str,
    file_path: &str,
    chunk_count: i64,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO documents (task_id, file_path, chunk_count)
        VALUES (?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            file_path = excluded.file_path,
            chunk_count = excluded.chunk_count
        "#,
    )
    .bind(task_id)
    .bind(file_path)
    .bind(chunk_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the document record for a task, if one exists.
pub async fn fetch_document(
    pool: &SqlitePool,
    task_id: &str,
) -> Result<Option<DocumentRecord>, StorageError> {
    let row = sqlx::query("SELECT task_id, file_path, chunk_count FROM documents WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| DocumentRecord {
        task_id: r.get("task_id"),
        file_path: r.get("file_path"),
        chunk_count: r.get("chunk_count"),
    }))
}

/// Append one turn to a task's conversation log.
pub async fn append_turn(
    pool: &SqlitePool,
    task_id: &str,
    role: Role,
    content: &str,
) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO chats (task_id, role, content) VALUES (?, ?, ?)")
        .bind(task_id)
        .bind(role.as_str())
        .bind(content)
        .execute(pool)
        .await?;

    Ok(())
}

/// Log one exchange: the user turn, then the assistant turn.
pub async fn log_exchange(
    pool: &SqlitePool,
    task_id: &str,
    query: &str,
    answer: &str,
) -> Result<(), StorageError> {
    append_turn(pool, task_id, Role::User, query).await?;
    append_turn(pool, task_id, Role::Assistant, answer).await?;
    Ok(())
}

/// The last `limit` turns for a task, oldest-first. An unknown or empty
/// task yields an empty sequence.
pub async fn recent_turns(
    pool: &SqlitePool,
    task_id: &str,
    limit: usize,
) -> Result<Vec<ChatTurn>, StorageError> {
    let rows = sqlx::query("SELECT role, content FROM chats WHERE task_id = ? ORDER BY id DESC LIMIT ?")
        .bind(task_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    let mut turns: Vec<ChatTurn> = rows
        .into_iter()
        .map(|r| ChatTurn {
            role: Role::from_db(r.get("role")),
            content: r.get("content"),
        })
        .collect();
    turns.reverse();
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = connect(&dir.path().join("store.db")).await.unwrap();
        init_schema(&pool).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let (_dir, pool) = test_pool().await;
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_replaces_document_record() {
        let (_dir, pool) = test_pool().await;
        upsert_document(&pool, "t1", "/tmp/a.pdf", 10).await.unwrap();
        upsert_document(&pool, "t1", "/tmp/b.pdf", 7).await.unwrap();

        let doc = fetch_document(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(doc.file_path, "/tmp/b.pdf");
        assert_eq!(doc.chunk_count, 7);
    }

    #[tokio::test]
    async fn fetch_unknown_document_is_none() {
        let (_dir, pool) = test_pool().await;
        assert!(fetch_document(&pool, "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_returns_last_n_oldest_first() {
        let (_dir, pool) = test_pool().await;
        for i in 0..3 {
            log_exchange(&pool, "t1", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        // 6 turns appended, keep the trailing 4.
        let turns = recent_turns(&pool, "t1", 4).await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "q1");
        assert_eq!(turns[1].content, "a1");
        assert_eq!(turns[2].content, "q2");
        assert_eq!(turns[3].content, "a2");
    }

    #[tokio::test]
    async fn recent_on_empty_task_is_empty() {
        let (_dir, pool) = test_pool().await;
        assert!(recent_turns(&pool, "nobody", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn turns_are_scoped_by_task() {
        let (_dir, pool) = test_pool().await;
        log_exchange(&pool, "t1", "q-one", "a-one").await.unwrap();
        log_exchange(&pool, "t2", "q-two", "a-two").await.unwrap();

        let turns = recent_turns(&pool, "t1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "q-one");
    }
}
