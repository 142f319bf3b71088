//! Retrieval-augmented chat for the ICT support bubble.

use std::sync::Arc;

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ServiceError;
use crate::integrations::run_blocking;
use crate::retrieval::{DEFAULT_TOP_K, Retriever};

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 500;

const ASSISTANT_PREAMBLE: &str = "You are a helpful ICT support assistant for PPD Johor Bahru.
Your responses should be clear, professional, and based on available information.
When using information from documents, try to be specific about what you found.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat completion backend. Implementations may block.
pub trait ChatModel: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("OpenAI API key is not configured")]
    NotConfigured,
    #[error("document search failed: {0}")]
    Retrieval(ServiceError),
    #[error("completion failed: {0}")]
    Generation(ServiceError),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            ChatError::InvalidRequest(msg) => *msg,
            ChatError::NotConfigured => "OpenAI API configuration error",
            ChatError::Retrieval(_) => "Document search error",
            ChatError::Generation(_) => "Failed to generate response",
        }
    }
}

/// Validate a raw `{ "messages": [...] }` body.
pub fn parse_messages(body: &serde_json::Value) -> Result<Vec<ChatMessage>, ChatError> {
    let raw = body
        .get("messages")
        .filter(|m| m.is_array())
        .ok_or(ChatError::InvalidRequest("Invalid messages format"))?;
    let messages: Vec<ChatMessage> = serde_json::from_value(raw.clone())
        .map_err(|_| ChatError::InvalidRequest("Invalid messages format"))?;
    match messages.last() {
        Some(last) if !last.content.trim().is_empty() => Ok(messages),
        _ => Err(ChatError::InvalidRequest("Invalid message content")),
    }
}

/// System prompt with the retrieved passages numbered in rank order.
pub fn system_prompt(passages: &[String]) -> String {
    if passages.is_empty() {
        return ASSISTANT_PREAMBLE.to_string();
    }
    let documents = passages
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[Document {}]: {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "{ASSISTANT_PREAMBLE}\n\nHere is some relevant information from our knowledge base:\n{documents}\n\n\
         Please use this information to help answer the question. If the information is relevant, \
         incorporate it into your response naturally. If the information isn't relevant to the \
         question, you can ignore it and answer based on your general knowledge."
    )
}

#[derive(Clone)]
pub struct ChatAssistant {
    retriever: Retriever,
    model: Option<Arc<dyn ChatModel>>,
}

impl ChatAssistant {
    pub fn new(retriever: Retriever, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { retriever, model }
    }

    pub async fn respond(&self, messages: Vec<ChatMessage>) -> Result<String, ChatError> {
        let model = self.model.clone().ok_or(ChatError::NotConfigured)?;
        let question = messages
            .last()
            .map(|m| m.content.clone())
            .ok_or(ChatError::InvalidRequest("Invalid message content"))?;
        tracing::info!(chars = question.chars().count(), history = messages.len(), "chat request");

        let hits = self
            .retriever
            .search(&question, DEFAULT_TOP_K)
            .await
            .map_err(|e| match e {
                ServiceError::Config(_) => ChatError::NotConfigured,
                other => ChatError::Retrieval(other),
            })?;
        tracing::info!(found = hits.len(), "retrieved context");
        let passages: Vec<String> = hits.into_iter().map(|h| h.text).collect();

        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(ChatMessage {
            role: Role::System,
            content: system_prompt(&passages),
        });
        prompt.extend(messages);
        let request = CompletionRequest {
            messages: prompt,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        run_blocking(move || model.complete(&request))
            .await
            .map_err(ChatError::Generation)
    }
}
