//! OpenAI chat completions and embeddings over the REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::{ChatMessage, ChatModel, CompletionRequest};
use crate::error::{ServiceError, ServiceResult};
use crate::retrieval::Embedder;

use super::{http_agent, upstream_error};

/// Embedding requests are sent in batches of this many inputs.
const EMBEDDING_BATCH: usize = 512;

#[derive(Clone)]
pub struct OpenAiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            agent: http_agent(Duration::from_secs(60)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            chat_model: config.chat_model,
            embedding_model: config.embedding_model,
        }
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<ureq::Response, ureq::Error> {
        self.agent
            .post(&format!("{}/{}", self.base_url, path))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
    }

    fn embed_batch(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
        let response = self
            .post(
                "embeddings",
                json!({ "model": self.embedding_model, "input": texts }),
            )
            .map_err(|e| upstream_error("OpenAI embeddings", e))?;
        let parsed: EmbeddingResponse = response
            .into_json()
            .map_err(|e| ServiceError::Upstream(format!("Failed to read embeddings: {e}")))?;
        order_embeddings(parsed.data, texts.len())
    }
}

/// Entries come back tagged with their input index; put them in input order
/// and make sure none is missing.
fn order_embeddings(data: Vec<EmbeddingData>, expected: usize) -> ServiceResult<Vec<Vec<f32>>> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for entry in data {
        if let Some(slot) = slots.get_mut(entry.index) {
            *slot = Some(entry.embedding);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| ServiceError::Upstream(format!("Missing embedding for input {i}")))
        })
        .collect()
}

impl Embedder for OpenAiClient {
    fn embed_documents(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH) {
            out.extend(self.embed_batch(batch)?);
        }
        Ok(out)
    }
}

impl ChatModel for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> ServiceResult<String> {
        tracing::debug!(
            model = %self.chat_model,
            messages = %describe_messages(&request.messages),
            "chat completion request"
        );
        let response = self
            .post(
                "chat/completions",
                json!({
                    "model": self.chat_model,
                    "messages": request.messages,
                    "temperature": request.temperature,
                    "max_tokens": request.max_tokens,
                }),
            )
            .map_err(|e| upstream_error("OpenAI chat completion", e))?;
        let parsed: ChatCompletionResponse = response
            .into_json()
            .map_err(|e| ServiceError::Upstream(format!("Failed to read completion: {e}")))?;
        first_choice(parsed)
    }
}

fn first_choice(parsed: ChatCompletionResponse) -> ServiceResult<String> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ServiceError::upstream("No response generated"))
}

/// Convenience for logging what was sent without dumping whole prompts.
pub fn describe_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}({})", m.role.as_str(), m.content.chars().count()))
        .collect::<Vec<_>>()
        .join(", ")
}
