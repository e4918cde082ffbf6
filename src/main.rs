use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use sqlagent_agent::init_agent;
use sqlagent_core::{AppConfig, Content};
use sqlagent_database_tools::{save_uploaded_file, IngestConfig, SavedSource, SqlDatabase};
use sqlagent_model::{fetch_remote_models, get_llm_list, init_llm, model_id_from_selection};
use sqlagent_runner::{Runner, CANCELLED_ERROR_CODE};
use sqlagent_server::{serve, AppState};
use sqlagent_session::{InMemorySessionService, GREETING};
use sqlagent_telemetry::{init_telemetry_with, LogFormat};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sqlagent")]
#[command(author, version, about = "Chat with a CSV or SQLite dataset through a SQL agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: config.toml searched upward)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,
    },

    /// List selectable models
    Models {
        /// Ask the provider instead of using the built-in list
        #[arg(long)]
        remote: bool,
    },

    /// Convert or copy a dataset into the assets directory
    Ingest { file: PathBuf },

    /// Interactive chat over a dataset
    Chat {
        file: PathBuf,

        /// Model id (default: the configured default model)
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_telemetry_with(format, "info");

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Commands::Serve { port, host } => run_server(config, port, host).await,
        Commands::Models { remote } => list_models(&config, remote).await,
        Commands::Ingest { file } => ingest(&config, &file).await.map(|_| ()),
        Commands::Chat { file, model } => chat(&config, &file, model).await,
    }
}

async fn run_server(mut config: AppConfig, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        tracing::info!("Shutting down");
    };

    serve(AppState::new(config), shutdown).await
}

async fn list_models(config: &AppConfig, remote: bool) -> Result<()> {
    let models = if remote {
        fetch_remote_models(&config.model)
            .await
            .context("Failed to fetch models from provider")?
    } else {
        get_llm_list()
    };

    for model in models {
        let marker = if model_id_from_selection(&model) == config.model.default_model {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, model);
    }
    Ok(())
}

/// Store `file` like an upload and open the resulting database
async fn ingest(config: &AppConfig, file: &Path) -> Result<SqlDatabase> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("File path has no file name")?;

    let saved = save_uploaded_file(file_name, &bytes, &IngestConfig::from(&config.storage)).await?;
    if saved.source == SavedSource::Fallback {
        println!("Unsupported file type, using {}", saved.path.display());
    }

    let db = SqlDatabase::open(&saved.path).await?;
    let tables = db.usable_table_names().await?;
    println!("Database: {}", saved.path.display());
    println!("Tables: {}", tables.join(", "));
    if let Some(rows) = saved.rows {
        println!("Rows: {}", rows);
    }
    Ok(db)
}

async fn chat(config: &AppConfig, file: &Path, model: Option<String>) -> Result<()> {
    let db = Arc::new(ingest(config, file).await?);
    let model = model
        .as_deref()
        .map(model_id_from_selection)
        .unwrap_or(config.model.default_model.as_str())
        .to_string();

    let llm = init_llm(&model, &config.model)?;
    let agent = init_agent(db.clone(), llm, &config.agent)?;
    let runner = Runner::builder()
        .app_name("sqlagent")
        .agent(Arc::new(agent))
        .session_service(Arc::new(InMemorySessionService::new()))
        .build()?;

    let session_id = uuid::Uuid::new_v4().to_string();
    println!(
        "\nThe Agent is currently working on {} database. Model: {}",
        db.name(),
        model
    );
    println!("{}\n", GREETING);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == "exit" || prompt == "quit" {
            break;
        }

        if let Err(e) = answer(&runner, &session_id, prompt).await {
            println!(
                "Facing issues with SQL Agent. Try using a different Base LLM. Error: {}",
                e
            );
        }
        println!();
    }

    db.close().await;
    Ok(())
}

/// Stream one answer to stdout; Ctrl-C cancels it
async fn answer(runner: &Runner, session_id: &str, prompt: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut events = runner
        .run_with_cancellation(
            "user".to_string(),
            session_id.to_string(),
            Content::new_user_text(prompt),
            Some(cancel.clone()),
        )
        .await?;

    let mut streamed = false;
    loop {
        let next = tokio::select! {
            next = events.next() => next,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                continue;
            }
        };
        let Some(event) = next else {
            break;
        };
        let event = event?;

        if event.error_code == CANCELLED_ERROR_CODE {
            println!("\n[cancelled]");
            break;
        }

        let final_text = event
            .content
            .as_ref()
            .is_some_and(|c| c.function_calls().is_empty());
        match event.model_text() {
            Some(text) if event.partial => {
                print!("{}", text);
                std::io::stdout().flush()?;
                streamed = true;
            }
            Some(text) if final_text && !streamed => println!("{}", text),
            _ if event.partial => {}
            _ => {
                if streamed {
                    println!();
                }
                streamed = false;
            }
        }
    }
    Ok(())
}
