//! HTTP knowledge query client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use call_bridge_config::KnowledgeConfig;
use call_bridge_core::{KnowledgeAnswer, KnowledgeQuery, KnowledgeRequest};
use reqwest::Client;
use serde::Deserialize;

use crate::RagError;

/// Knowledge client configuration
#[derive(Debug, Clone)]
pub struct KnowledgeClientConfig {
    /// Full URL of the query endpoint
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for KnowledgeClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5001/rag_query".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&KnowledgeConfig> for KnowledgeClientConfig {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Response body of the query endpoint
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Knowledge query over HTTP POST + JSON
pub struct HttpKnowledgeClient {
    client: Client,
    config: KnowledgeClientConfig,
}

impl HttpKnowledgeClient {
    pub fn new(config: KnowledgeClientConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Run one query
    pub async fn ask(&self, request: &KnowledgeRequest) -> Result<KnowledgeAnswer, RagError> {
        if request.user_id.trim().is_empty() {
            return Err(RagError::Config("user_id is not set".to_string()));
        }

        let started = Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| RagError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| RagError::Decode(e.to_string()))?;

        metrics::histogram!("call_bridge_knowledge_query_seconds")
            .record(started.elapsed().as_secs_f64());

        match body.response {
            Some(text) if !text.trim().is_empty() => {
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    history = request.conversation_history.len(),
                    "Knowledge query answered"
                );
                Ok(KnowledgeAnswer { response: text })
            }
            _ => Err(RagError::MissingAnswer),
        }
    }
}

#[async_trait]
impl KnowledgeQuery for HttpKnowledgeClient {
    async fn query(&self, request: &KnowledgeRequest) -> call_bridge_core::Result<KnowledgeAnswer> {
        self.ask(request).await.map_err(Into::into)
    }

    fn name(&self) -> &str {
        "http"
    }
}
