//! Long-lived chat session loop.
//!
//! Speaks newline-delimited JSON over stdin/stdout: one `READY` line once
//! the models are loaded, then exactly one response line per valid request
//! line, in order. stdout is the protocol channel and carries nothing else;
//! all diagnostics go to stderr via tracing. Malformed input lines are
//! logged and skipped without producing output, so the stream never
//! desynchronizes. EOF on stdin is the shutdown signal.
//!
//! Model load failures are fatal before `READY`; after that, per-request
//! inference failures become error-shaped answers and the loop keeps
//! serving.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embedding::{Embedder, OnnxEmbedder};
use crate::generate::{Generator, OnnxGenerator};
use crate::models::{ChatRequest, ChatResponse};
use crate::prompt::build_prompt;
use crate::retrieve::retrieve;
use crate::store;

/// Lifecycle of a serving process. Transitions are logged; `Ready` is the
/// moment the `READY` line is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready,
    Serving,
    Shutdown,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Serving => "serving",
            SessionState::Shutdown => "shutdown",
        }
    }
}

/// Per-process request handler: owns the models, the store handle, and the
/// retrieval settings. Models are loaded once; requests borrow them.
pub struct SessionEngine {
    pool: SqlitePool,
    embedder: Box<dyn Embedder>,
    generator: Box<dyn Generator>,
    index_dir: PathBuf,
    top_k: usize,
    history_turns: usize,
    state: SessionState,
}

impl SessionEngine {
    pub fn new(
        config: &Config,
        pool: SqlitePool,
        embedder: Box<dyn Embedder>,
        generator: Box<dyn Generator>,
    ) -> Self {
        Self {
            pool,
            embedder,
            generator,
            index_dir: config.storage.index_dir.clone(),
            top_k: config.retrieval.top_k,
            history_turns: config.retrieval.history_turns,
            state: SessionState::Loading,
        }
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = self.state.name(), to = next.name(), "session state");
        self.state = next;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Answer one request. Retrieval and history failures degrade; only
    /// generation failure produces an error-shaped answer, and even that
    /// keeps the loop alive.
    pub async fn handle(&mut self, request: &ChatRequest) -> ChatResponse {
        let retrieved = retrieve(
            &self.index_dir,
            self.embedder.as_ref(),
            &request.task_id,
            &request.query,
            self.top_k,
        );

        let history = match store::recent_turns(&self.pool, &request.task_id, self.history_turns)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                warn!(task_id = %request.task_id, error = %e, "history unavailable, continuing without it");
                Vec::new()
            }
        };

        let prompt = build_prompt(&retrieved.context, &history, &request.query);

        match self.generator.generate(&prompt) {
            Ok(answer) => {
                // The response still goes out if the log write fails; a full
                // disk must not break an otherwise working chat.
                if let Err(e) =
                    store::log_exchange(&self.pool, &request.task_id, &request.query, &answer).await
                {
                    error!(task_id = %request.task_id, error = %e, "failed to log exchange");
                }
                ChatResponse {
                    answer,
                    sources: retrieved.sources,
                }
            }
            Err(e) => {
                error!(task_id = %request.task_id, error = %e, "generation failed");
                ChatResponse {
                    answer: format!("Inference error: {}", e),
                    sources: Vec::new(),
                }
            }
        }
    }

    /// Drive the request/response loop until EOF on the reader.
    pub async fn serve<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> Result<()> {
        self.transition(SessionState::Ready);
        writeln!(writer, "READY")?;
        writer.flush()?;
        self.transition(SessionState::Serving);

        for line in reader.lines() {
            let line = line.context("failed to read request line")?;
            if line.trim().is_empty() {
                continue;
            }

            let request: ChatRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "skipping malformed request line");
                    continue;
                }
            };

            let response = self.handle(&request).await;
            writeln!(writer, "{}", serde_json::to_string(&response)?)?;
            writer.flush()?;
        }

        self.transition(SessionState::Shutdown);
        Ok(())
    }
}

/// Load models and serve stdin/stdout until EOF. Model load failures are
/// fatal here, before the readiness line is ever written.
pub async fn run(config: &Config) -> Result<()> {
    let embedder = OnnxEmbedder::load(&config.embedding).context("failed to load embedding model")?;
    let generator = OnnxGenerator::load(&config.generation).context("failed to load generation model")?;

    let pool = store::connect(&config.storage.db_path).await?;
    store::init_schema(&pool).await?;

    let mut engine = SessionEngine::new(config, pool, Box::new(embedder), Box::new(generator));

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    engine.serve(stdin.lock(), stdout.lock()).await
}

/// One-shot query outside the session loop: answer a single question for a
/// task and print the response JSON.
pub async fn ask(config: &Config, task_id: &str, query: &str) -> Result<()> {
    let embedder = OnnxEmbedder::load(&config.embedding).context("failed to load embedding model")?;
    let generator = OnnxGenerator::load(&config.generation).context("failed to load generation model")?;

    let pool = store::connect(&config.storage.db_path).await?;
    store::init_schema(&pool).await?;

    let mut engine = SessionEngine::new(config, pool, Box::new(embedder), Box::new(generator));
    let response = engine
        .handle(&ChatRequest {
            task_id: task_id.to_string(),
            query: query.to_string(),
        })
        .await;

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
