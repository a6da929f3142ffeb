//! AI-generation transport.
//!
//! Providers stream assistant output as an ordered sequence of [`AiChunk`]s;
//! the generation session consumes them without knowing which backend is
//! active.

use crate::config::ProviderConfig;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub mod ollama;
pub mod openai_compat;

use crate::api::ollama::OllamaProvider;
use crate::api::openai_compat::OpenAiCompatibleProvider;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("API response error: {0}")]
    Response(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

pub type AiStream = Pin<Box<dyn Stream<Item = Result<AiChunk, ApiError>> + Send>>;

/// One increment of streamed assistant output.
#[derive(Debug, Clone)]
pub enum AiChunk {
    Content(String),
    /// Chain-of-thought text from reasoning models; shown but never inserted
    /// into the document.
    Reasoning(String),
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn check_availability(&self) -> Result<(), ApiError>;
    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError>;
}

pub fn create_provider(config: &ProviderConfig) -> Arc<dyn AiProvider> {
    match config.name.as_str() {
        "Ollama" => Arc::new(OllamaProvider::new(
            config.active_model.clone(),
            config.base_url.clone(),
        )),
        _ => Arc::new(OpenAiCompatibleProvider::new(
            config.name.clone(),
            config.active_model.clone(),
            config.base_url.clone(),
            config.api_key.clone(),
        )),
    }
}
