use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aura_rag::config::load_config;
use aura_rag::{ingest, session, store};

#[derive(Parser)]
#[command(name = "aura")]
#[command(about = "Local document Q&A: ingest PDFs, chat over them offline", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/aura.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite store and schema.
    Init,
    /// Ingest a document for a task: extract, chunk, embed, index.
    Ingest {
        /// Source document (PDF, or plain text).
        file: PathBuf,
        /// Task the document belongs to. Defaults to the file stem.
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Serve the chat session loop over stdin/stdout.
    Serve,
    /// Answer a single question for a task and exit.
    Ask {
        /// Task whose index and history to use.
        task_id: String,
        /// The question.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is the protocol channel for `serve`; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = store::connect(&config.storage.db_path).await?;
            store::init_schema(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, task_id } => {
            let task_id = task_id.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "default".to_string())
            });
            let report = ingest::run_ingest(&config, &task_id, &file).await;
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::Serve => {
            session::run(&config).await?;
        }
        Commands::Ask { task_id, query } => {
            session::ask(&config, &task_id, &query).await?;
        }
    }

    Ok(())
}
