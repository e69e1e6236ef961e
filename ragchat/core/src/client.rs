//! RAG Backend Client
//!
//! Thin `reqwest` wrapper around the three backend endpoints the chat client
//! uses:
//!
//! - `POST {stream_path}` - start a streaming query, body is consumed by the engine
//! - `GET {datasets_path}` - list searchable datasets
//! - `GET {health_path}` - liveness probe
//!
//! The streaming call returns as soon as response headers arrive; the body is
//! handed out as an [`HttpStreamSource`] and read chunk by chunk by
//! [`StreamEngine::run`](crate::engine::StreamEngine::run).

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClientConfig;
use crate::messages::{ConversationId, Dataset, MessageRole};
use crate::source::{ByteStreamSource, SourceError};

/// Stream source over an HTTP response body
pub type HttpStreamSource = ByteStreamSource<BoxStream<'static, Result<Vec<u8>, reqwest::Error>>>;

/// Errors from non-streaming backend calls
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout or protocol failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// One prior turn forwarded with a query
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Sender
    pub role: MessageRole,
    /// Text
    pub content: String,
}

/// Body of a streaming query
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// User query
    pub query: String,
    /// Dataset to search
    pub index_name: String,
    /// Documents retrieved
    pub top_k: u32,
    /// Conversation turns
    pub messages: Vec<HistoryEntry>,
    /// Conversation to continue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Ask for reasoning tokens
    pub include_thinking: bool,
}

impl ChatRequest {
    /// Query against a dataset, with the query as the only history entry
    pub fn new(query: impl Into<String>, index_name: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            messages: vec![HistoryEntry {
                role: MessageRole::User,
                content: query.clone(),
            }],
            query,
            index_name: index_name.into(),
            top_k: 3,
            conversation_id: None,
            include_thinking: false,
        }
    }

    /// Set retrieval depth
    #[must_use]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Continue an existing conversation
    #[must_use]
    pub fn with_conversation_id(mut self, id: Option<ConversationId>) -> Self {
        self.conversation_id = id;
        self
    }

    /// Request reasoning tokens
    #[must_use]
    pub fn with_include_thinking(mut self, include: bool) -> Self {
        self.include_thinking = include;
        self
    }
}

#[derive(Debug, Deserialize)]
struct DatasetsResponse {
    #[serde(default)]
    datasets: Vec<Dataset>,
}

/// Backend client
#[derive(Clone, Debug)]
pub struct RagClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl RagClient {
    /// Build a client from resolved configuration
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a query from configured defaults
    #[must_use]
    pub fn request(&self, query: &str, dataset: &str) -> ChatRequest {
        ChatRequest::new(query, dataset)
            .with_top_k(self.config.top_k)
            .with_include_thinking(self.config.include_thinking)
    }

    /// Send a streaming query and hand back its body
    ///
    /// No overall timeout is applied; the stream lasts as long as the backend
    /// keeps it open.
    ///
    /// # Errors
    ///
    /// [`SourceError::Request`] if the request could not be sent,
    /// [`SourceError::Status`] on a non-success status.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<HttpStreamSource, SourceError> {
        let url = self.config.endpoint(&self.config.stream_path);
        tracing::debug!(
            %url,
            index_name = %request.index_name,
            top_k = request.top_k,
            conversation_id = ?request.conversation_id,
            "Sending streaming query"
        );

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(ByteStreamSource::new(body))
    }

    /// List datasets offered by the backend
    ///
    /// # Errors
    ///
    /// Transport failures, non-success statuses and undecodable bodies.
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>, ClientError> {
        let url = self.config.endpoint(&self.config.datasets_path);
        let response = self
            .http_client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let text = response.text().await?;
        let datasets = parse_datasets(&text)?;
        tracing::debug!(count = datasets.len(), "Datasets listed");
        Ok(datasets)
    }

    /// Whether the backend answers its health endpoint with a 2xx
    pub async fn health_check(&self) -> bool {
        let url = self.config.endpoint(&self.config.health_path);
        match self
            .http_client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }
}

fn parse_datasets(body: &str) -> Result<Vec<Dataset>, ClientError> {
    serde_json::from_str::<DatasetsResponse>(body)
        .map(|r| r.datasets)
        .map_err(|e| ClientError::Decode(e.to_string()))
}
