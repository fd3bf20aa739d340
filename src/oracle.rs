//! Oracle - the language model behind the agent
//!
//! Two fallible operations: chat completion under a system prompt and text
//! embedding. The Ollama implementation talks to `/api/chat` and
//! `/api/embeddings` with a hard request deadline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Oracle failures. Callers always absorb these into a neutral outcome.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Request(String),

    #[error("Oracle returned error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle response could not be parsed: {0}")]
    Parse(String),
}

/// Fallible prompt -> text / text -> vector service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Chat completion with an explicit system prompt
    async fn chat(&self, system: &str, user: &str) -> Result<String, OracleError>;

    /// Embedding vector for a piece of text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError>;
}

/// Ollama oracle configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Ollama chat response
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    #[serde(default)]
    content: String,
}

/// Ollama embedding response
#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Oracle backed by a local Ollama server
pub struct OllamaOracle {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaOracle {
    /// Create a new oracle; the timeout applies to every request
    pub fn new(config: OllamaConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Check if Ollama is reachable
    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.config.ollama_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, OracleError>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.config.ollama_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn chat(&self, system: &str, user: &str) -> Result<String, OracleError> {
        debug!("🔮 Sending message to oracle ({} chars)", user.len());

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            stream: false,
        };

        let result: OllamaChatResponse = self.post_json("/api/chat", &request).await?;
        debug!("🔮 Oracle response: {}", result.message.content);
        Ok(result.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        let request = serde_json::json!({
            "model": self.config.embedding_model,
            "prompt": text,
        });

        let result: OllamaEmbeddingResponse = self.post_json("/api/embeddings", &request).await?;
        if result.embedding.is_empty() {
            return Err(OracleError::Parse("empty embedding".to_string()));
        }
        Ok(result.embedding)
    }
}
