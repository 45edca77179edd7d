//! Knowledge base tools: thin HTTP callers of a retrieval service.
//!
//! The service exposes `POST /search` (hybrid dense + sparse retrieval with
//! optional reranking) and `GET /documents/{id}`. Ranking is entirely the
//! service's business; these tools only shape requests and results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hintloop_core::error::ToolError;
use hintloop_core::state::SessionState;
use hintloop_core::tool::{required_str, Tool, ToolResult};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Results handed back to the model per search.
const MAX_RESULTS: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client for the retrieval service.
pub struct KnowledgeBaseClient {
    base_url: String,
    top_k: u32,
    client: reqwest::Client,
}

impl KnowledgeBaseClient {
    pub fn new(base_url: impl Into<String>, top_k: u32) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "knowledge_base_search".into(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            top_k,
            client,
        })
    }

    /// Run a hybrid, reranked search and keep the best [`MAX_RESULTS`] hits.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        const TOOL: &str = "knowledge_base_search";
        let url = format!("{}/search", self.base_url);
        debug!(url = %url, query = %query, "Knowledge base search");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "query": query,
                "mode": "hybrid",
                "top_k": self.top_k,
                "rerank": true,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Self::request_failed(TOOL, e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::request_failed(TOOL, e))?;

        let mut hits = parse_search_results(&body);
        info!(results = hits.len(), "Knowledge base search returned");
        hits.truncate(MAX_RESULTS);
        Ok(hits)
    }

    fn request_failed(tool: &str, err: reqwest::Error) -> ToolError {
        if err.is_timeout() {
            ToolError::timeout(tool, REQUEST_TIMEOUT.as_secs(), "Knowledge base request")
        } else {
            ToolError::ExecutionFailed {
                tool_name: tool.into(),
                reason: format!("Error connecting to retrieval service: {err}"),
            }
        }
    }
}

/// One ranked chunk as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub chunk_id: String,
    pub text: String,
    pub score: f64,
    pub metadata: Value,
}

/// Pick the best available result list and normalize it: reranked results
/// first, then dense, then sparse.
pub fn parse_search_results(body: &Value) -> Vec<SearchHit> {
    let list = ["reranked_results", "dense_results", "sparse_results"]
        .iter()
        .filter_map(|key| body[key].as_array())
        .find(|items| !items.is_empty());

    let Some(items) = list else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let doc_id = item["doc_id"].as_str().unwrap_or_default().to_string();
            let chunk_id = item["chunk_id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{doc_id}_chunk_{i}"));
            SearchHit {
                chunk_id,
                text: item["text"].as_str().unwrap_or_default().to_string(),
                score: item["rerank_score"]
                    .as_f64()
                    .or_else(|| item["score"].as_f64())
                    .unwrap_or(0.0),
                metadata: match &item["metadata"] {
                    Value::Null => json!({}),
                    other => other.clone(),
                },
                doc_id,
            }
        })
        .collect()
}

pub struct KnowledgeBaseSearchTool {
    client: Arc<KnowledgeBaseClient>,
}

impl KnowledgeBaseSearchTool {
    pub fn new(client: Arc<KnowledgeBaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseSearchTool {
    fn name(&self) -> &str {
        "knowledge_base_search"
    }

    fn description(&self) -> &str {
        "Search the knowledge base with a natural language query. Returns the most relevant document chunks with doc_id, chunk_id, text and score."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let query = required_str(&arguments, "query")?;
        let hits = self.client.search(query).await?;
        if hits.is_empty() {
            return Ok(ToolResult::ok(json!({
                "status": "no_results",
                "message": "No relevant documents found",
            })));
        }

        Ok(ToolResult::ok(json!({
            "status": "success",
            "total_found": hits.len(),
            "results": hits,
        })))
    }
}

pub struct GetDocumentTool {
    client: Arc<KnowledgeBaseClient>,
}

impl GetDocumentTool {
    pub fn new(client: Arc<KnowledgeBaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetDocumentTool {
    fn name(&self) -> &str {
        "get_document"
    }

    fn description(&self) -> &str {
        "Fetch the full text and metadata of a document by its doc_id"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "doc_id": {
                    "type": "string",
                    "description": "Document identifier returned by knowledge_base_search"
                }
            },
            "required": ["doc_id"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _state: &mut SessionState,
    ) -> Result<ToolResult, ToolError> {
        let doc_id = required_str(&arguments, "doc_id")?;
        let url = format!("{}/documents/{doc_id}", self.client.base_url);

        let response = self
            .client
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KnowledgeBaseClient::request_failed(self.name(), e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ToolResult::rejected(json!({
                "status": "error",
                "message": format!("Document {doc_id} not found"),
            })));
        }

        let document: Value = response
            .error_for_status()
            .map_err(|e| KnowledgeBaseClient::request_failed(self.name(), e))?
            .json()
            .await
            .map_err(|e| KnowledgeBaseClient::request_failed(self.name(), e))?;

        Ok(ToolResult::ok(json!({
            "status": "success",
            "document": document,
        })))
    }
}
