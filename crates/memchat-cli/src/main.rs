// ============================================================================
// memchat - terminal chat assistant with semantic memory and tools
// ============================================================================
// Usage:
//   memchat                         Interactive chat (same as `memchat chat`)
//   memchat ask "weather in Tokyo"  One message through a fresh session
//   memchat tool weather "Paris"    Call a tool directly, no model involved
//
// Settings come from the environment (and `.env`); flags override them.
// ============================================================================

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use memchat_core::{ChatConfig, ChatSession, ConversationTurn, ToolRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Chat assistant that remembers the conversation and calls tools
#[derive(Parser)]
#[command(name = "memchat", version, about = "Chat assistant with semantic memory and tools")]
struct Cli {
    /// Chat model name (overrides LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible API base URL (overrides LLM_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Maximum tool rounds per message (overrides MEMCHAT_MAX_TOOL_ROUNDS)
    #[arg(long, global = true)]
    max_tool_rounds: Option<usize>,

    /// Per-call tool timeout in seconds (overrides MEMCHAT_TOOL_TIMEOUT_SECS)
    #[arg(long, global = true)]
    tool_timeout_secs: Option<u64>,

    /// Recall distance threshold (overrides MEMCHAT_RECALL_THRESHOLD)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat. Commands: /history, /memory, /quit
    Chat,

    /// Send one message and print the reply
    Ask {
        /// Message text
        message: String,
    },

    /// Invoke a tool directly and print its outcome
    Tool {
        /// Tool name: weather, stock_price, web_search
        name: String,

        /// Free-text tool input
        input: String,
    },
}

impl Cli {
    /// Environment config with flag overrides applied
    fn config(&self) -> Result<ChatConfig> {
        let mut config = ChatConfig::from_env()?;
        if let Some(model) = &self.model {
            config.llm_model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.llm_base_url = base_url.clone();
        }
        if let Some(rounds) = self.max_tool_rounds {
            config.max_tool_rounds = rounds;
        }
        if let Some(secs) = self.tool_timeout_secs {
            config.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(threshold) = self.threshold {
            config.recall_threshold = threshold;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal; the environment may already be set
        eprintln!("Note: no .env loaded ({})", e);
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("memchat=info,memchat_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => cmd_chat(&config).await,
        Commands::Ask { message } => cmd_ask(&config, &message).await,
        Commands::Tool { name, input } => cmd_tool(&config, &name, &input).await,
    }
}

async fn cmd_chat(config: &ChatConfig) -> Result<()> {
    let mut session = ChatSession::from_config(config)
        .await
        .context("Failed to start chat session")?;
    info!(
        "Session {} ready (model {}, tools: {})",
        session.id(),
        config.llm_model,
        session.tools().names().join(", ")
    );

    println!("memchat - type /history, /memory or /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/history" => {
                print_history(session.history());
                continue;
            }
            "/memory" => {
                let stats = session.memory().stats();
                println!(
                    "Memory: {} record(s), {} dimensions, embedder {}",
                    stats.records, stats.dimension, stats.model
                );
                continue;
            }
            _ if input.starts_with('/') => {
                println!("Unknown command: {}", input);
                continue;
            }
            _ => {}
        }

        match session.handle(input).await {
            Ok(reply) => println!("Assistant: {}", reply),
            Err(e) => {
                warn!("Message failed: {}", e);
                eprintln!("Error: {}", e);
            }
        }
    }

    let state = session.state();
    info!(
        "Session {} (started {}) ended after {} turn(s)",
        state.id,
        format_timestamp(state.started_at),
        state.history.len()
    );
    Ok(())
}

async fn cmd_ask(config: &ChatConfig, message: &str) -> Result<()> {
    let mut session = ChatSession::from_config(config)
        .await
        .context("Failed to start chat session")?;
    let reply = session.handle(message).await?;
    println!("{}", reply);
    Ok(())
}

async fn cmd_tool(config: &ChatConfig, name: &str, input: &str) -> Result<()> {
    let registry = ToolRegistry::from_config(config);
    let text = run_tool(&registry, name, input).await?;
    println!("{}", text);
    Ok(())
}

/// Tool output on success; failures become the command's error
async fn run_tool(registry: &ToolRegistry, name: &str, input: &str) -> Result<String> {
    if registry.get(name).is_none() {
        anyhow::bail!(
            "Unknown tool '{}'. Available: {}",
            name,
            registry.names().join(", ")
        );
    }

    let outcome = registry.invoke(name, input).await;
    if !outcome.is_success() {
        anyhow::bail!("{}", outcome.text());
    }
    Ok(outcome.into_text())
}

fn format_timestamp(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn print_history(turns: &[ConversationTurn]) {
    if turns.is_empty() {
        println!("No messages yet.");
        return;
    }
    for turn in turns {
        println!("[{}] {}: {}", format_timestamp(turn.timestamp), turn.role, turn.content);
    }
}
