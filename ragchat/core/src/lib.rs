//! Ragchat Core - Stream Reconciliation for a RAG Chat Client
//!
//! This crate turns the chunked event stream of a retrieval-augmented
//! generation backend into two chat messages: a *thinking* trace and a final
//! *response*, plus their performance telemetry. It has no terminal or UI
//! dependencies; surfaces observe the [`ChatStore`] through its accessors and
//! its [`ChatUpdate`] feed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Surface (CLI, ...)                        │
//! │        reads ChatStore accessors / receives ChatUpdate            │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                        RAGCHAT CORE                               │
//! │                                                                   │
//! │  RagClient ──► StreamSource ──► StreamEngine                      │
//! │  (reqwest)     (byte chunks)     │                                │
//! │                                  ├─ Utf8ChunkDecoder              │
//! │                                  ├─ FrameSplitter                 │
//! │                                  ├─ decode_frame                  │
//! │                                  ├─ extract                       │
//! │                                  └─ Reconciler ──► ChatStore      │
//! │                                                   (messages,      │
//! │                                                    session)       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use ragchat_core::{load_config, ChatStore, RagClient, StreamEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RagClient::new(load_config()?)?;
//!     let mut store = ChatStore::new();
//!
//!     store.add_user_message("What is a watermark?");
//!     let request = client.request("What is a watermark?", "handbook");
//!
//!     let mut engine = StreamEngine::begin(&mut store, None);
//!     match client.stream_chat(&request).await {
//!         Ok(mut source) => { engine.run(&mut store, &mut source).await; }
//!         Err(e) => { engine.fail(&mut store, &e); }
//!     }
//!
//!     for message in store.messages() {
//!         println!("{:?}: {}", message.role, message.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`stream`]: UTF-8 decoding, frame splitting, event decoding, token extraction
//! - [`reconcile`]: Per-channel watermarks and accept/drop policy
//! - [`store`]: Message lifecycle and stream session state
//! - [`engine`]: The sequential read loop tying the pipeline together
//! - [`source`]: Byte source abstraction
//! - [`client`]: HTTP client for the RAG backend
//! - [`messages`]: Chat message data model
//! - [`config`]: TOML/env configuration
//! - [`debug_log`]: Bounded in-memory event trail

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod debug_log;
pub mod engine;
pub mod messages;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod stream;

pub use client::{ChatRequest, ClientError, HistoryEntry, HttpStreamSource, RagClient};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ClientConfig,
    ConfigError, ConfigOverrides, ConfigSource, ConfigToml,
};
pub use debug_log::{DebugLog, DEFAULT_DEBUG_CAPACITY};
pub use engine::StreamEngine;
pub use messages::{
    approximate_tokens, ChatMessage, ConversationId, Dataset, MessageId, MessageRole,
    PerformanceMetrics, ThinkingState,
};
pub use reconcile::{ReconcileStats, Reconciler, TokenOutcome, Watermark, Watermarks};
pub use source::{ByteStreamSource, SourceError, StreamSource};
pub use store::{
    ChatStore, ChatUpdate, FinalizedStream, SessionTicket, StreamPhase, StreamSession,
    DEFAULT_DATASET_LABEL,
};
pub use stream::{Channel, ControlRecord, Extracted, Sequence, TokenRecord};
