use crate::api::{AiChunk, AiProvider, AiStream, ApiError, Message};
use crate::constants::{AI_REQUEST_TIMEOUT, AI_SEED, AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Provider for any OpenAI-compatible chat completions endpoint
/// (OpenAI, DeepSeek, local gateways).
pub struct OpenAiCompatibleProvider {
    client: Client,
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: String, model: String, base_url: String, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(AI_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            name,
            model,
            base_url,
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenAiDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// Parses complete `data:` lines out of `buffer`, returning emitted chunks.
/// Partial trailing lines stay in the buffer for the next network read.
fn drain_sse_lines(buffer: &mut String) -> Vec<Result<AiChunk, ApiError>> {
    let mut chunks = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim().to_string();
        buffer.drain(..=pos);
        if line.is_empty() || line == "data: [DONE]" {
            continue;
        }
        let Some(json_str) = line.strip_prefix("data: ") else {
            continue;
        };
        match serde_json::from_str::<OpenAiStreamResponse>(json_str) {
            Ok(parsed) => {
                if let Some(choice) = parsed.choices.first() {
                    if let Some(content) = &choice.delta.content {
                        chunks.push(Ok(AiChunk::Content(content.clone())));
                    }
                    if let Some(reasoning) = &choice.delta.reasoning_content {
                        chunks.push(Ok(AiChunk::Reasoning(reasoning.clone())));
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Skipping unparseable SSE line: {}", e);
            }
        }
    }
    chunks
}

#[async_trait]
impl AiProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_availability(&self) -> Result<(), ApiError> {
        if self.api_key.is_none() {
            return Err(ApiError::Config("API Key is missing".to_string()));
        }

        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(url);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Response(format!(
                "API returned status {}",
                response.status()
            )))
        }
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(url);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
                "temperature": AI_TEMPERATURE,
                "top_p": AI_TOP_P,
                "seed": AI_SEED
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Response(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(ApiError::HttpClient))
            .scan(String::new(), |buffer, item| {
                let out = match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_lines(buffer)
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(futures::stream::iter(out)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_sse_lines_content_and_reasoning() {
        let mut buffer = String::from(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\
             data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n",
        );
        let chunks = drain_sse_lines(&mut buffer);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[0], Ok(AiChunk::Content(ref c)) if c == "Hi"));
        assert!(matches!(chunks[1], Ok(AiChunk::Reasoning(ref r)) if r == "hmm"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_sse_lines_keeps_partial_line() {
        let mut buffer = String::from(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {\"choi",
        );
        let chunks = drain_sse_lines(&mut buffer);
        assert_eq!(chunks.len(), 1);
        assert_eq!(buffer, "data: {\"choi");

        buffer.push_str("ces\":[{\"delta\":{\"content\":\"b\"}}]}\n");
        let chunks = drain_sse_lines(&mut buffer);
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Ok(AiChunk::Content(ref c)) if c == "b"));
    }

    #[test]
    fn test_drain_sse_lines_skips_done_marker() {
        let mut buffer = String::from("data: [DONE]\n");
        assert!(drain_sse_lines(&mut buffer).is_empty());
    }

    #[test]
    fn test_availability_requires_api_key() {
        let provider = OpenAiCompatibleProvider::new(
            "OpenAI".to_string(),
            "gpt-4o".to_string(),
            "https://api.openai.com/v1".to_string(),
            None,
        );
        let err = futures::executor::block_on(provider.check_availability()).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
