mod config;
mod session;

use agent_host::conversation;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use services::knowledge::{format_matches, KnowledgeBase};
use services::storage::{default_store_path, JsonFileStore, KeyValueStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "npc-helper")]
#[command(about = "NPC Helper - chat assistant for designing game NPCs", long_about = None)]
#[command(version)]
struct Cli {
    /// Path of the JSON store holding settings, history and documents
    #[arg(long, global = true, env = "NPC_HELPER_STORE")]
    store: Option<PathBuf>,

    /// Send requests through the proxy even when an API key is configured
    #[arg(long, global = true)]
    via_proxy: bool,

    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat
    Chat,

    /// Ask a single question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Stored conversation
    #[command(subcommand)]
    History(HistoryCommands),

    /// Search the built-in NPC design notes
    Docs {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 3)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the current settings
    Show,
    /// Store an API key (enables tools)
    SetKey { key: String },
    /// Forget the stored API key
    ClearKey,
    /// Proxy used when no key is configured
    SetProxy { url: String },
    /// Model name sent with every request
    SetModel { model: String },
    /// WebSocket that receives game actions; omit to deliver them to this terminal
    SetGameWs { url: Option<String> },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Print the stored conversation
    Show,
    /// Delete the stored conversation
    Clear,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    let path = match path {
        Some(p) => p,
        None => default_store_path()
            .context("could not determine a data directory; pass --store")?,
    };
    let store = JsonFileStore::open(&path)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = open_store(cli.store)?;
    let (mut settings, _) = config::load_settings_or_default(store.as_ref())?;

    match cli.command {
        Commands::Chat => {
            let agent = session::build_agent(settings, store, cli.via_proxy)?;
            repl(agent).await?;
        }
        Commands::Ask { text } => {
            let agent = session::build_agent(settings, store, cli.via_proxy)?;
            session::run_turn(&agent, &text.join(" ")).await?;
        }
        Commands::Config(cmd) => {
            match cmd {
                ConfigCommands::Show => {
                    println!("{}", config::describe(&settings));
                    return Ok(());
                }
                ConfigCommands::SetKey { key } => {
                    let key = key.trim().to_string();
                    anyhow::ensure!(!key.is_empty(), "API key is empty");
                    settings.model.openai_auth.api_key = Some(key);
                }
                ConfigCommands::ClearKey => settings.model.openai_auth.api_key = None,
                ConfigCommands::SetProxy { url } => {
                    settings.model.proxy_url = Some(config::check_url(&url, &["http", "https"])?);
                }
                ConfigCommands::SetModel { model } => {
                    let model = model.trim().to_string();
                    anyhow::ensure!(!model.is_empty(), "model name is empty");
                    settings.model.openai_model = model;
                }
                ConfigCommands::SetGameWs { url } => {
                    settings.game.websocket_url = url
                        .map(|u| config::check_url(&u, &["ws", "wss"]))
                        .transpose()?;
                }
            }
            config::save_settings(store.as_ref(), &settings)?;
            println!("{}", config::describe(&settings));
        }
        Commands::History(HistoryCommands::Show) => print_history(store.as_ref())?,
        Commands::History(HistoryCommands::Clear) => {
            conversation::clear_history(store.as_ref())?;
            println!("History cleared.");
        }
        Commands::Docs { query, limit } => {
            let knowledge = KnowledgeBase::new(store);
            knowledge.seed()?;
            let query = query.join(" ");
            let matches = knowledge.search(&query, limit)?;
            println!("{}", format_matches(&query, &matches));
        }
    }
    Ok(())
}

fn print_history(store: &dyn KeyValueStore) -> Result<()> {
    let history = conversation::load_history(store)?;
    if history.is_empty() {
        println!("No conversation yet.");
    }
    for message in history {
        println!(
            "[{}] {}: {}\n",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            message.role,
            message.content
        );
    }
    Ok(())
}

async fn repl(agent: agent_host::AgentHost) -> Result<()> {
    eprintln!(
        "NPC Helper ({} route, model {}). /clear, /history, /quit",
        agent.route().label(),
        agent.settings.model.openai_model
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                conversation::clear_history(agent.store().as_ref())?;
                eprintln!("History cleared.");
            }
            "/history" => print_history(agent.store().as_ref())?,
            text => {
                // Keep the session going after a failed turn
                if let Err(e) = session::run_turn(&agent, text).await {
                    warn!(error = %format!("{:#}", e), "chat turn failed");
                }
            }
        }
    }
    Ok(())
}
