//! # ragwatch CLI
//!
//! ## Usage
//!
//! ```bash
//! ragwatch --config ./config/ragwatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragwatch init` | Create the SQLite database, schema, and collection |
//! | `ragwatch watch` | Ingest new files from the watch root until Ctrl-C |
//! | `ragwatch serve` | Start the HTTP query server |
//! | `ragwatch status` | Print the file status ledger |
//! | `ragwatch ask "<query>"` | Answer one question and exit |
//! | `ragwatch probe` | Smoke-test a running server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragwatch::{config, ingest, logging, migrate, probe, server, status, store};

/// ragwatch: watch a folder, embed what lands in it, answer questions about it.
#[derive(Parser)]
#[command(name = "ragwatch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and collection. Idempotent.
    Init,

    /// Watch the upload folder and ingest new files until Ctrl-C.
    Watch,

    /// Start the HTTP query server.
    Serve,

    /// Print the processing status of every detected file.
    Status,

    /// Answer a single question from the stored documents.
    Ask {
        /// The question.
        query: String,
    },

    /// Check a running server's health and send it test questions.
    ///
    /// Does not read the config file.
    Probe {
        /// Server base URL.
        #[arg(long, default_value = "http://127.0.0.1:5050")]
        url: String,

        /// Questions to send. Defaults to a couple of generic ones.
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Probe { url, messages } = &cli.command {
        logging::init();
        return run_probe(url, messages).await;
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!(
                "Database initialized successfully (collection '{}').",
                cfg.store.collection
            );
        }
        Commands::Watch => {
            ingest::run_watch(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Status => {
            print_status(&cfg).await?;
        }
        Commands::Ask { query } => {
            let state = server::AppState::from_config(&cfg).await?;
            let answer = state.query.answer(&query, None).await?;
            println!("{}", answer);
        }
        Commands::Probe { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

async fn print_status(cfg: &config::Config) -> anyhow::Result<()> {
    let ledger = status::StatusLedger::new(&cfg.status.path);
    let records = ledger.read_all()?;

    if records.is_empty() {
        println!("No files processed yet ({}).", cfg.status.path.display());
        return Ok(());
    }

    let backend = store::sqlite::SqliteStore::open(cfg).await?;
    let backend: Arc<dyn store::Store> = Arc::new(backend);

    println!("{:<40} {:<11} {:>7} {:>7}  UPDATED", "FILE", "STATUS", "CHUNKS", "STORED");
    for (filename, rec) in &records {
        let stored = backend
            .count(&cfg.store.collection, Some(filename))
            .await?;
        println!(
            "{:<40} {:<11} {:>7} {:>7}  {}",
            filename,
            rec.status.to_string(),
            rec.chunks_count,
            stored,
            rec.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn run_probe(url: &str, messages: &[String]) -> anyhow::Result<()> {
    let messages: Vec<String> = if messages.is_empty() {
        probe::DEFAULT_MESSAGES.iter().map(|m| m.to_string()).collect()
    } else {
        messages.to_vec()
    };

    let report = probe::run_probe(url, &messages).await?;

    match &report.version {
        Some(v) => println!("health: ok (version {})", v),
        None => println!("health: unreachable"),
    }
    for answer in &report.answers {
        println!("\n> {}", answer.message);
        match &answer.outcome {
            Ok(text) => println!("{}", text),
            Err(e) => println!("error: {}", e),
        }
    }

    if !report.all_ok() {
        anyhow::bail!("probe failed");
    }
    Ok(())
}
