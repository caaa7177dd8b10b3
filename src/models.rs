//! Core data models and wire protocol types.
//!
//! These types flow through the ingestion and retrieval pipeline and across
//! the newline-delimited JSON protocol spoken by `aura serve`.

use serde::{Deserialize, Serialize};

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Storage form (`chats.role` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Prompt rendering form (`User:` / `Assistant:` lines).
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    /// Parse the storage form. Unknown values map to `Assistant` so a
    /// mangled row degrades the prompt instead of failing the request.
    pub fn from_db(s: &str) -> Role {
        if s == "user" {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

/// One message in a task's conversation log, ordered by insertion.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// One row per ingested task: `documents(task_id PRIMARY KEY, file_path, chunk_count)`.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub task_id: String,
    pub file_path: String,
    pub chunk_count: i64,
}

/// A bounded span of document text prepared for embedding.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub text: String,
    /// 1-indexed source page.
    pub page: u32,
    pub index: usize,
}

/// Request record read from stdin by the session loop.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub task_id: String,
    pub query: String,
}

/// Response record emitted on stdout, one line per valid request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<u32>,
}

/// Result of one ingestion run, printed once as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub summary: String,
    pub tokens_per_sec: f64,
}
