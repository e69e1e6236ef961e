//! Ragchat - Terminal client for a streaming RAG backend
//!
//! Sends a query to the backend and prints the answer as it streams in.
//! Reasoning tokens can be shown (dimmed, on stderr) with `--show-thinking`.
//!
//! # Usage
//!
//! ```bash
//! # One question
//! ragchat --dataset handbook "How do I rotate the signing key?"
//!
//! # Interactive: one query per line on stdin
//! ragchat --dataset handbook
//!
//! # Verbose logging
//! RUST_LOG=ragchat_core=debug ragchat "..."
//! ```
//!
//! # Interactive commands
//!
//! - `/debug` prints the recent engine event trail
//! - `/clear` forgets messages and the conversation
//! - `/quit` exits
//!
//! # Environment Variables
//!
//! - `RAGCHAT_API_URL`: Backend base URL (default: `http://localhost:8000`)
//! - `RAGCHAT_DATASET`: Dataset to query
//! - `RAGCHAT_TIMEOUT_SECS`: Timeout for non-streaming calls
//! - `RUST_LOG`: Log filter (overrides `--log-level`)

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use ragchat_core::{
    load_config, load_config_from_path, Channel, ChatStore, ChatUpdate, ConfigOverrides,
    ConversationId, Dataset, FinalizedStream, PerformanceMetrics, RagClient, StreamEngine,
    StreamSource,
};

const NO_DATASET_NOTICE: &str =
    "No dataset selected. Pass --dataset <NAME> or set default_dataset in the config file.";

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Ragchat - ask questions against a retrieval-augmented backend
#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Question to ask; reads questions from stdin when omitted
    query: Option<String>,

    /// Backend base URL
    #[arg(long, env = "RAGCHAT_API_URL", value_name = "URL")]
    api_url: Option<String>,

    /// Dataset (index name) to search
    #[arg(short = 'd', long, env = "RAGCHAT_DATASET", value_name = "NAME")]
    dataset: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "RAGCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Continue an existing conversation
    #[arg(long, value_name = "ID")]
    conversation_id: Option<String>,

    /// Print reasoning tokens (dimmed, to stderr)
    #[arg(short = 't', long)]
    show_thinking: bool,

    /// Documents retrieved per query
    #[arg(short = 'k', long, value_name = "N")]
    top_k: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "RAGCHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("ragchat={level},ragchat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Pick the dataset to query: explicit choice first, then the backend's first
fn resolve_dataset(preferred: Option<&str>, available: &[Dataset]) -> Option<String> {
    preferred
        .map(str::to_owned)
        .or_else(|| available.first().map(|d| d.index_name.clone()))
}

/// One-line summary printed after each answer
fn format_metrics(finalized: &FinalizedStream, metrics: Option<&PerformanceMetrics>) -> String {
    let mut parts = Vec::new();
    if let Some(ttft) = finalized.time_to_first_token_ms {
        parts.push(format!("first token {ttft}ms"));
    }
    parts.push(format!("total {}ms", finalized.total_response_time_ms));
    if let Some(m) = metrics {
        if let Some(tokens) = m.token_count {
            parts.push(format!("~{tokens} tokens"));
        }
        if let Some(sources) = m.sources {
            parts.push(format!("{sources} sources"));
        }
        if let Some(ref dataset) = m.dataset {
            parts.push(format!("dataset {dataset}"));
        }
    }
    parts.join(" | ")
}

/// Print updates until the stream finalizes
async fn render_updates(updates: &mut UnboundedReceiver<ChatUpdate>, show_thinking: bool) {
    let mut thinking_open = false;
    while let Some(update) = updates.recv().await {
        match update {
            ChatUpdate::ContentAppended {
                channel: Channel::Thinking,
                text,
                ..
            } => {
                if show_thinking {
                    eprint!("{DIM}{text}{RESET}");
                    thinking_open = true;
                }
            }
            ChatUpdate::ContentAppended {
                channel: Channel::Response,
                text,
                ..
            } => {
                if thinking_open {
                    eprintln!();
                    thinking_open = false;
                }
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            ChatUpdate::ConversationAssigned(id) => info!(conversation_id = %id, "Conversation assigned"),
            ChatUpdate::StreamFinalized(_) => {
                if thinking_open {
                    eprintln!();
                }
                println!();
                return;
            }
            _ => {}
        }
    }
}

/// Drive the engine, finalizing early on Ctrl-C
async fn run_until_interrupted<S>(
    engine: &mut StreamEngine,
    store: &mut ChatStore,
    source: &mut S,
) -> Option<FinalizedStream>
where
    S: StreamSource + ?Sized,
{
    tokio::select! {
        finalized = engine.run(store, source) => finalized,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, finalizing partial answer");
            engine.complete(store)
        }
    }
}

/// Send one query and stream the answer to the terminal
async fn ask(
    client: &RagClient,
    store: &mut ChatStore,
    updates: &mut UnboundedReceiver<ChatUpdate>,
    query: &str,
    dataset: &str,
    show_thinking: bool,
) -> Option<FinalizedStream> {
    store.add_user_message(query);
    let request = client
        .request(query, dataset)
        .with_conversation_id(store.conversation_id().cloned());

    let mut engine = StreamEngine::begin(store, None);
    let finalized = match client.stream_chat(&request).await {
        Ok(mut source) => {
            let (finalized, ()) = tokio::join!(
                run_until_interrupted(&mut engine, store, &mut source),
                render_updates(updates, show_thinking),
            );
            finalized
        }
        Err(e) => {
            let finalized = engine.fail(store, &e);
            render_updates(updates, show_thinking).await;
            finalized
        }
    };

    if let Some(ref done) = finalized {
        let metrics = done
            .response_message_id
            .as_ref()
            .and_then(|id| store.message(id))
            .and_then(|m| m.metrics());
        eprintln!("{DIM}{}{RESET}", format_metrics(done, metrics));
    }
    finalized
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let loaded = match args.config.clone() {
        Some(path) => load_config_from_path(Some(path)),
        None => load_config(),
    };
    let mut config = loaded.context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.api_url.clone() {
        overrides = overrides.with_api_url(url);
    }
    if let Some(dataset) = args.dataset.clone() {
        overrides = overrides.with_dataset(dataset);
    }
    if let Some(top_k) = args.top_k {
        overrides = overrides.with_top_k(top_k);
    }
    if args.show_thinking {
        overrides = overrides.with_include_thinking(true);
    }
    overrides.apply(&mut config).context("Invalid command-line option")?;

    info!(api_url = %config.api_url, source = %config.source(), "Configuration resolved");

    let client = RagClient::new(config.clone()).context("Failed to create HTTP client")?;
    if !client.health_check().await {
        warn!(api_url = %config.api_url, "Backend health check failed");
    }

    let mut store = ChatStore::new();
    let mut updates = store.subscribe();
    store.set_conversation_id(args.conversation_id.clone().map(ConversationId));

    match client.list_datasets().await {
        Ok(datasets) => store.set_datasets(datasets),
        Err(e) => warn!(error = %e, "Could not list datasets"),
    }
    store.set_selected_dataset(resolve_dataset(
        config.default_dataset.as_deref(),
        store.datasets(),
    ));

    let Some(dataset) = store.selected_dataset().map(str::to_owned) else {
        store.add_assistant_notice(NO_DATASET_NOTICE);
        eprintln!("{NO_DATASET_NOTICE}");
        anyhow::bail!("no dataset available");
    };
    info!(%dataset, "Using dataset");

    if let Some(ref query) = args.query {
        let finalized = ask(&client, &mut store, &mut updates, query, &dataset, args.show_thinking).await;
        if let Some(error) = finalized.and_then(|f| f.error) {
            anyhow::bail!("stream failed: {error}");
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/debug" => {
                for event in store.debug_events() {
                    eprintln!("{DIM}{event}{RESET}");
                }
            }
            "/clear" => {
                store.clear_messages();
                store.set_conversation_id(None);
                // drain the clear notification
                while updates.try_recv().is_ok() {}
            }
            query => {
                ask(&client, &mut store, &mut updates, query, &dataset, args.show_thinking).await;
            }
        }
    }

    Ok(())
}
