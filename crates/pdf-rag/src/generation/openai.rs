//! OpenAI-compatible chat completions client (LM Studio, vLLM, OpenAI)

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::provider::{LlmProvider, TokenStream};
use super::retry::send_with_retry;

/// Streams `/chat/completions` over server-sent events
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        // No overall timeout: a streamed answer may legitimately take minutes.
        // Idle time between fragments is bounded by the generation service.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.generate_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// One SSE `data:` payload to a text fragment. `[DONE]` and empty deltas
/// yield nothing.
fn parse_chunk(data: &str) -> Option<Result<String>> {
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|content| !content.is_empty())
            .map(Ok),
        Err(e) => Some(Err(Error::model_unavailable(format!(
            "failed to parse stream chunk: {}",
            e
        )))),
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleClient {
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream: true,
        };

        let response = send_with_retry(self.name(), self.max_retries, || {
            self.request(&url).json(&body).send()
        })
        .await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => parse_chunk(&event.data),
                    Err(e) => Some(Err(Error::model_unavailable(format!(
                        "stream interrupted: {}",
                        e
                    )))),
                }
            });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{response::IntoResponse, routing::post, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        url
    }

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_parse_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_chunk(data).unwrap().unwrap(), "Hi");
        assert!(parse_chunk("[DONE]").is_none());
        assert!(parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(parse_chunk(r#"{"choices":[]}"#).is_none());
        assert!(parse_chunk("not json").unwrap().is_err());
    }

    #[tokio::test]
    async fn test_streams_sse_deltas() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Downward \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Dog\\n\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || async move { ([("content-type", "text/event-stream")], body).into_response() }),
        );
        let client = OpenAiCompatibleClient::new(&config(serve(router).await)).unwrap();

        let fragments: Vec<String> = client
            .stream("prompt")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["Downward ", "Dog\n"]);
    }

    #[tokio::test]
    async fn test_bad_request_is_rejected() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "no such model") }),
        );
        let client = OpenAiCompatibleClient::new(&config(serve(router).await)).unwrap();

        let err = client.stream("prompt").await.err().unwrap();
        assert!(matches!(err, Error::ModelRejected(ref m) if m.contains("no such model")));
        assert!(!err.is_retryable());
    }
}
