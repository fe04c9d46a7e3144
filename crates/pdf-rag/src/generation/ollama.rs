//! Ollama LLM client for streamed answer generation

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::provider::{LlmProvider, TokenStream};
use super::retry::send_with_retry;

/// Ollama API client with automatic retry on connect
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    /// Maximum retries
    max_retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    /// Create a new Ollama client with retry support
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.generate_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

/// Parse one NDJSON line. `Ok(None)` means nothing to emit.
fn parse_line(line: &[u8]) -> Result<Option<(String, bool)>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_slice(line)
        .map_err(|e| Error::model_unavailable(format!("failed to parse stream chunk: {}", e)))?;
    if let Some(error) = chunk.error {
        return Err(Error::model_unavailable(error));
    }
    Ok(Some((chunk.response, chunk.done)))
}

/// Split a byte stream into NDJSON records regardless of how the transport
/// fragmented them, ending after the record with `done: true`.
fn ndjson_fragments<S, E>(bytes: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    struct State<S> {
        bytes: S,
        buf: BytesMut,
        finished: bool,
    }

    let state = State {
        bytes,
        buf: BytesMut::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(pos) = state.buf.iter().position(|b| *b == b'\n') {
                let line = state.buf.split_to(pos + 1);
                match parse_line(&line) {
                    Ok(Some((text, done))) => {
                        state.finished = done;
                        if !text.is_empty() {
                            return Some((Ok(text), state));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
                continue;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(Error::model_unavailable(format!("stream interrupted: {}", e))),
                        state,
                    ));
                }
                None => {
                    // Tolerate a final record without a trailing newline.
                    state.finished = true;
                    let tail = state.buf.split();
                    return match parse_line(&tail) {
                        Ok(Some((text, _))) if !text.is_empty() => Some((Ok(text), state)),
                        Ok(_) => None,
                        Err(e) => Some((Err(e), state)),
                    };
                }
            }
        }
    })
}

#[async_trait]
impl LlmProvider for OllamaClient {
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        tracing::info!("Generating answer with model: {}", self.model);

        let response = send_with_retry(self.name(), self.max_retries, || {
            self.client.post(&url).json(&body).send()
        })
        .await?;

        Ok(Box::pin(ndjson_fragments(response.bytes_stream().boxed())))
    }

    /// Check if Ollama is available
    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
