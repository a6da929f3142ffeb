use crate::api::{AiChunk, AiProvider, AiStream, ApiError, Message};
use crate::constants::{AI_REQUEST_TIMEOUT, AI_SEED, AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub struct OllamaProvider {
    client: Client,
    pub model: String,
    pub base_url: String,
}

impl OllamaProvider {
    pub fn new(model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(AI_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            model,
            base_url,
        }
    }
}

/// One NDJSON object from the /api/chat stream.
#[derive(Deserialize)]
struct OllamaChatChunk {
    message: Option<Message>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaTags {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn check_availability(&self) -> Result<(), ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::Response(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let tags: OllamaTags = response.json().await?;
        if tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", self.model)))
        {
            Ok(())
        } else {
            Err(ApiError::Response(format!(
                "Model {} not found in Ollama",
                self.model
            )))
        }
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<AiStream, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
                "options": {
                    "temperature": AI_TEMPERATURE,
                    "top_p": AI_TOP_P,
                    "seed": AI_SEED
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Response(format!(
                "Ollama chat error ({}): {}",
                status, body
            )));
        }

        // One network read may carry several NDJSON objects, or end mid-line,
        // so buffer across reads and emit per complete line.
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(ApiError::HttpClient))
            .scan(String::new(), |buffer, item| {
                let out = match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        let mut chunks = Vec::new();
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer.drain(..=pos);
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<OllamaChatChunk>(&line) {
                                Ok(chunk) => {
                                    if chunk.done {
                                        continue;
                                    }
                                    if let Some(message) = chunk.message {
                                        if !message.content.is_empty() {
                                            chunks.push(Ok(AiChunk::Content(message.content)));
                                        }
                                    }
                                }
                                Err(e) => chunks.push(Err(ApiError::Stream(format!(
                                    "Failed to parse Ollama chunk: {}",
                                    e
                                )))),
                            }
                        }
                        chunks
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
    fn test_chunk_parses_content() {
        let line = r#"{"model":"qwen2.5:0.5b","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let chunk: OllamaChatChunk = serde_json::from_str(line).unwrap();
        assert!(!chunk.done);
        assert_eq!(chunk.message.unwrap().content, "Hel");
    }

    #[test]
    fn test_final_chunk_parses_done() {
        let line = r#"{"model":"qwen2.5:0.5b","done":true,"total_duration":12345}"#;
        let chunk: OllamaChatChunk = serde_json::from_str(line).unwrap();
        assert!(chunk.done);
        assert!(chunk.message.is_none());
    }

    #[test]
    fn test_provider_name() {
        let provider = OllamaProvider::new(
            "qwen2.5:0.5b".to_string(),
            "http://localhost:11434".to_string(),
        );
        assert_eq!(provider.name(), "Ollama");
    }
}
