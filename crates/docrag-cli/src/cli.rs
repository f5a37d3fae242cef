//! CLI definition and command dispatch for docrag.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--config`, `--device`)
//! 2. Environment variables (`DOCRAG_CONFIG`, `DOCRAG_DEVICE`, `DOCRAG_MODELS_DIR`, ...)
//! 3. Config file (`~/.docrag/config.yaml`)
//! 4. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use docrag_core::{
    hash_file, list_models, AppConfig, DevicePreference, DocragEngine, IngestOutcome,
};

use crate::store::JsonDocumentStore;
use crate::ui::{render_matches_table, render_models_table, ColorMode, MessageType, Style};

// ============================================================================
// CLI Definition
// ============================================================================

/// Document ingestion and question answering over local models
#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "DOCRAG_VERBOSE")]
    pub verbose: bool,

    /// Path to configuration file (default: ~/.docrag/config.yaml)
    #[arg(long, global = true, env = "DOCRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device preference for inference (auto/gpu/cpu)
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "DOCRAG_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the SHA-256 content hash of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },

    /// Parse, embed and index a document
    #[command(after_help = r#"EXAMPLES:
    # Ingest a PDF
    docrag ingest report.pdf

    # Force the file type when the extension is missing or wrong
    docrag ingest notes --type md
"#)]
    Ingest {
        /// Document to ingest
        file: PathBuf,

        /// File type override (extension without the dot)
        #[arg(long = "type", value_name = "EXT")]
        file_type: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from an ingested document
    #[command(after_help = r#"EXAMPLES:
    docrag ask $(docrag hash report.pdf) "What was the revenue in 2023?"
"#)]
    Ask {
        /// Content hash of the document
        document: String,

        /// Question to answer
        question: String,
    },

    /// Show the passages a question retrieves, with scores
    Search {
        /// Content hash of the document
        document: String,

        /// Query text
        query: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove a document and its vector collection
    Delete {
        /// Content hash of the document
        document: String,
    },

    /// List ingested documents
    Documents {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List known models and whether they are installed
    Models {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Entry point
// ============================================================================

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!(
        "docrag_core={level},docrag_model={level},docrag_db={level},docrag_cli={level}",
        level = log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .init();

    let style = Style::new(ColorMode::parse(&cli.color).unwrap_or_default());

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your config at ~/.docrag/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context("Failed to load configuration", Some(&format!("{e:#}")), Some(&hint))
            );
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", style.error_with_context("Failed to start runtime", Some(&e.to_string()), None));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli.command, config, &style)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style.message(MessageType::Err, &format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(device) = &cli.device {
        config.models.session.device = device
            .parse::<DevicePreference>()
            .map_err(|e| anyhow!(e))?;
    }
    Ok(config)
}

async fn dispatch(command: Command, config: AppConfig, style: &Style) -> Result<ExitCode> {
    match command {
        Command::Hash { file } => cmd_hash(&file),
        Command::Models { json } => cmd_models(&config, json, style),
        Command::Documents { json } => cmd_documents(&config, json, style).await,
        Command::Ingest { file, file_type, json } => {
            let (engine, _) = open_engine(config)?;
            cmd_ingest(&engine, &file, file_type.as_deref(), json, style).await
        }
        Command::Ask { document, question } => {
            let (engine, _) = open_engine(config)?;
            cmd_ask(&engine, &document, &question, style).await
        }
        Command::Search { document, query, json } => {
            let (engine, _) = open_engine(config)?;
            cmd_search(&engine, &document, &query, json, style).await
        }
        Command::Delete { document } => {
            let (engine, documents) = open_engine(config)?;
            cmd_delete(&engine, &documents, &document, style).await
        }
    }
}

fn document_store(config: &AppConfig) -> Result<JsonDocumentStore> {
    let upload_dir = config
        .upload_dir()
        .ok_or_else(|| anyhow!("Could not determine the upload directory; set DOCRAG_UPLOAD_DIR"))?;
    Ok(JsonDocumentStore::new(&upload_dir))
}

fn open_engine(config: AppConfig) -> Result<(DocragEngine, Arc<JsonDocumentStore>)> {
    let documents = Arc::new(document_store(&config)?);
    let engine = DocragEngine::from_config(config, documents.clone()).context("Failed to initialize engine")?;
    Ok((engine, documents))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_hash(file: &Path) -> Result<ExitCode> {
    let hash = hash_file(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{hash}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_models(config: &AppConfig, json: bool, style: &Style) -> Result<ExitCode> {
    let models = list_models(config);
    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", render_models_table(&models));
    if models.iter().any(|m| m.default && !m.installed) {
        println!();
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                "Some default models are missing; download them into the models directory"
            )
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_documents(config: &AppConfig, json: bool, style: &Style) -> Result<ExitCode> {
    let documents = document_store(config)?.list().await?;

    if json {
        let map: BTreeMap<_, _> = documents.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(ExitCode::SUCCESS);
    }

    if documents.is_empty() {
        println!("{}", style.message(MessageType::Info, "No documents ingested yet"));
        return Ok(ExitCode::SUCCESS);
    }
    for (hash, doc) in documents {
        println!("{}", style.message(MessageType::Info, &hash));
        println!("{}", style.detail("Title", &doc.meta.title));
        println!("{}", style.detail("Ingested", &doc.ingested_at.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_ingest(
    engine: &DocragEngine,
    file: &Path,
    file_type: Option<&str>,
    json: bool,
    style: &Style,
) -> Result<ExitCode> {
    let outcome = engine
        .ingest_path(file, file_type)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(match outcome {
            IngestOutcome::Failed { .. } => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        });
    }

    match outcome {
        IngestOutcome::Ingested {
            content_hash,
            collection,
            segments,
            meta,
        } => {
            println!("{}", style.message(MessageType::Ok, &format!("Ingested {}", file.display())));
            println!("{}", style.detail("Hash", &content_hash));
            println!("{}", style.detail("Title", &meta.title));
            println!("{}", style.detail("Segments", &segments.to_string()));
            println!("{}", style.detail("Collection", &collection));
            Ok(ExitCode::SUCCESS)
        }
        IngestOutcome::Duplicate { content_hash } => {
            println!("{}", style.message(MessageType::Info, &format!("Already ingested ({content_hash})")));
            Ok(ExitCode::SUCCESS)
        }
        IngestOutcome::Failed { content_hash, reason } => {
            eprintln!(
                "{}",
                style.error_with_context(
                    &format!("Failed to ingest {}", file.display()),
                    Some(&reason),
                    Some(&format!("Content hash {content_hash}; run with --verbose for details")),
                )
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_ask(engine: &DocragEngine, document: &str, question: &str, style: &Style) -> Result<ExitCode> {
    let answer = engine.answer(question, document).await;
    if answer.is_empty() {
        println!("{}", style.message(MessageType::Warn, "No answer found in this document"));
    } else {
        println!("{answer}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_search(
    engine: &DocragEngine,
    document: &str,
    query: &str,
    json: bool,
    style: &Style,
) -> Result<ExitCode> {
    let outcome = engine.search(query, document).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(ExitCode::SUCCESS);
    }

    if outcome.data.is_empty() {
        println!("{}", style.message(MessageType::Info, "No passages found"));
        return Ok(ExitCode::SUCCESS);
    }
    let confident: Vec<i64> = outcome.matched.iter().map(|m| m.id).collect();
    println!("{}", render_matches_table(&outcome.data, &confident));
    Ok(ExitCode::SUCCESS)
}

async fn cmd_delete(
    engine: &DocragEngine,
    documents: &JsonDocumentStore,
    document: &str,
    style: &Style,
) -> Result<ExitCode> {
    if !engine.delete_document(document).await {
        eprintln!(
            "{}",
            style.error_with_context(
                &format!("Failed to delete {document}"),
                None,
                Some("Check that the vector store is reachable and allows deletion in this environment"),
            )
        );
        return Ok(ExitCode::FAILURE);
    }
    documents.remove(document).await?;
    println!("{}", style.message(MessageType::Ok, &format!("Deleted {document}")));
    Ok(ExitCode::SUCCESS)
}
