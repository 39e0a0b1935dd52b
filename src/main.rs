//! # ragbot CLI
//!
//! ```bash
//! ragbot --config ./ragbot.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragbot init` | Create the SQLite database and run schema migrations |
//! | `ragbot serve` | Start the HTTP API |
//! | `ragbot train text\|qa\|url\|file\|dir` | Add training data to a tenant |
//! | `ragbot sources` | List a tenant's training sources |
//! | `ragbot delete <id>` | Delete one training source |
//! | `ragbot ask "<message>"` | Ask a tenant's bot a question |
//! | `ragbot search "<query>"` | Show the chunks retrieval would use |
//! | `ragbot tags "<text>"` | Classify text into topic tags |
//! | `ragbot purge` | Delete all of a tenant's data |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragbot::chat::{self, ChatRequest};
use ragbot::config::{load_config, Config};
use ragbot::ingest::{self, FileUpload};
use ragbot::services::Services;
use ragbot::{db, migrate, server};
use ragbot_core::tags::classify_tags;

/// ragbot: train website chatbots and serve cited answers.
#[derive(Parser)]
#[command(name = "ragbot", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ragbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Add training data to a tenant.
    Train {
        #[command(subcommand)]
        input: TrainInput,
    },

    /// List a tenant's training sources, newest first.
    Sources {
        #[arg(long)]
        tenant: String,
    },

    /// Delete one training source and its chunks.
    Delete {
        #[arg(long)]
        tenant: String,
        id: String,
    },

    /// Ask a tenant's bot a question.
    Ask {
        #[arg(long)]
        tenant: String,
        message: String,
        /// Override `[chat].system_prompt`.
        #[arg(long)]
        system: Option<String>,
    },

    /// Rank a tenant's chunks against a query.
    Search {
        #[arg(long)]
        tenant: String,
        query: String,
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Classify text into topic tags.
    Tags { text: String },

    /// Delete every source and chunk of a tenant.
    Purge {
        #[arg(long)]
        tenant: String,
        /// Required: confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TrainInput {
    /// Train on literal text or a text file.
    Text {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        title: Option<String>,
        /// The text itself.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// Read the text from this file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Train on a Q&A file with one `question | answer` pair per line.
    Qa {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        title: Option<String>,
        path: PathBuf,
    },
    /// Crawl a web page and train on its content.
    Url {
        #[arg(long)]
        tenant: String,
        url: String,
    },
    /// Train on a document (PDF, DOCX, PPTX, XLSX, or text).
    File {
        #[arg(long)]
        tenant: String,
        path: PathBuf,
    },
    /// Train on every matching file under a directory.
    Dir {
        #[arg(long)]
        tenant: String,
        path: PathBuf,
        /// Include globs, relative to the directory.
        #[arg(long, default_values_t = default_includes())]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
    },
}

fn default_includes() -> Vec<String> {
    ["**/*.md", "**/*.txt", "**/*.pdf", "**/*.docx", "**/*.pptx", "**/*.xlsx", "**/*.csv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Serve => {
            let svc = Arc::new(Services::from_config(config).await?);
            server::run_server(svc).await?;
        }
        Commands::Train { input } => run_train(config, input).await?,
        Commands::Sources { tenant } => {
            let svc = Services::from_config(config).await?;
            let sources = ingest::list_sources(&svc, &tenant).await?;
            if sources.is_empty() {
                println!("No training sources for tenant '{}'.", tenant);
            }
            for s in sources {
                println!(
                    "{}  {:<4}  {:>4} chunks  [{}]  {}",
                    s.id,
                    s.kind.as_str(),
                    s.chunk_count,
                    s.tags.join(", "),
                    s.title
                );
            }
        }
        Commands::Delete { tenant, id } => {
            let svc = Services::from_config(config).await?;
            ingest::delete_source(&svc, &tenant, &id).await?;
            println!("Deleted source {}", id);
        }
        Commands::Ask {
            tenant,
            message,
            system,
        } => {
            let svc = Services::from_config(config).await?;
            let request = ChatRequest {
                system_prompt: system,
                ..ChatRequest::new(message)
            };
            let answer = chat::answer(&svc, &tenant, "cli", &request).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                for s in &answer.sources {
                    println!(
                        "[{}] {} {} (similarity {:.3})",
                        s.index,
                        s.source_url.as_deref().unwrap_or("training data"),
                        s.heading.as_deref().unwrap_or(""),
                        s.similarity
                    );
                }
            }
        }
        Commands::Search {
            tenant,
            query,
            top_n,
        } => {
            let svc = Services::from_config(config).await?;
            let results = chat::search(&svc, &tenant, &query, top_n).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({})",
                    i + 1,
                    r.similarity,
                    r.chunk.source_url.as_deref().unwrap_or("training data"),
                    r.chunk.source_id
                );
                println!("    {}", snippet(&r.chunk.text, 160));
            }
        }
        Commands::Tags { text } => {
            if text.trim().is_empty() {
                bail!("text must not be empty");
            }
            let svc = Services::from_config(config).await?;
            let tags = classify_tags(&*svc.completer, &text).await;
            println!("{}", tags.join(", "));
        }
        Commands::Purge { tenant, yes } => {
            if !yes {
                bail!("refusing to purge tenant '{}' without --yes", tenant);
            }
            let svc = Services::from_config(config).await?;
            let removed = ingest::purge_tenant(&svc, &tenant).await?;
            println!("Deleted {} sources from tenant '{}'", removed, tenant);
        }
    }

    Ok(())
}

async fn run_train(config: Config, input: TrainInput) -> Result<()> {
    let svc = Services::from_config(config).await?;
    let source = match input {
        TrainInput::Text {
            tenant,
            title,
            text,
            file,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("either --text or --file is required"),
            };
            ingest::train_text(&svc, &tenant, title.as_deref(), &text).await?
        }
        TrainInput::Qa {
            tenant,
            title,
            path,
        } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ingest::train_qa(&svc, &tenant, title.as_deref(), &content).await?
        }
        TrainInput::Url { tenant, url } => ingest::train_url(&svc, &tenant, &url).await?,
        TrainInput::File { tenant, path } => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let upload = FileUpload {
                filename,
                bytes,
                content_type: None,
            };
            ingest::train_file(&svc, &tenant, &upload).await?
        }
        TrainInput::Dir {
            tenant,
            path,
            include,
            exclude,
        } => {
            let report = ingest::train_dir(&svc, &tenant, &path, &include, &exclude).await?;
            for s in &report.trained {
                println!("trained  {}  {} chunks  {}", s.id, s.chunk_count, s.title);
            }
            for (file, reason) in &report.skipped {
                println!("skipped  {}: {}", file, reason);
            }
            println!(
                "{} trained, {} skipped",
                report.trained.len(),
                report.skipped.len()
            );
            return Ok(());
        }
    };

    println!(
        "Trained source {} ({}): {} chunks, tags [{}]",
        source.id,
        source.title,
        source.chunk_count,
        source.tags.join(", ")
    );
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}
