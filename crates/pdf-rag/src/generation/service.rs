//! Grounded answer generation streamed as whole lines

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{GenerationConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::types::PageDocument;

use super::line_buffer::LineBuffer;
use super::prompt::PromptBuilder;
use super::provider::{LlmProvider, TokenStream};

/// Sent instead of an answer when retrieval found nothing
pub const NO_CONTEXT_FALLBACK: &str = "No relevant information found in the document index.\n";

/// One unit pushed to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A complete line (or the final partial line) of the answer
    Text(String),
    /// The model stream broke after output had started; always the last item
    Failed(String),
}

/// Receiving end of a generation. Dropping it cancels the upstream model call.
pub type FragmentStream = ReceiverStream<Fragment>;

/// Turns a question plus its retrieved page into a stream of answer lines
pub struct GenerationService {
    llm: Arc<dyn LlmProvider>,
    prompt: PromptBuilder,
    /// Bound on connecting and on the wait for every subsequent token
    timeout: Duration,
    channel_capacity: usize,
}

impl GenerationService {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompt: PromptBuilder,
        timeout: Duration,
        channel_capacity: usize,
    ) -> Self {
        Self {
            llm,
            prompt,
            timeout,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn from_config(
        llm: Arc<dyn LlmProvider>,
        llm_config: &LlmConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self::new(
            llm,
            PromptBuilder::new(generation.corpus_description.clone()),
            Duration::from_secs(llm_config.timeout_secs),
            generation.channel_capacity,
        )
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Start answering `query` from the retrieved `context` pages, nearest
    /// first. Their text is joined into the prompt's context passage.
    ///
    /// With no context the stream carries only [`NO_CONTEXT_FALLBACK`] and the
    /// model is never called. Errors before the first token (unreachable
    /// backend, connect timeout) are returned here; later failures arrive as a
    /// final [`Fragment::Failed`].
    pub async fn generate(&self, query: &str, context: &[PageDocument]) -> Result<FragmentStream> {
        if query.trim().is_empty() {
            return Err(Error::validation("Query is required"));
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let Some(nearest) = context.first() else {
            tracing::info!("No matching page, answering with fallback");
            // Fresh channel with capacity >= 1; cannot be full or closed.
            let _ = tx.try_send(Fragment::Text(NO_CONTEXT_FALLBACK.to_string()));
            return Ok(ReceiverStream::new(rx));
        };

        tracing::info!(
            "Generating answer from {} page(s), nearest {}, with {}",
            context.len(),
            nearest,
            self.llm.model()
        );
        let passage = context
            .iter()
            .map(|page| page.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.prompt.build(query, &passage);

        let upstream = tokio::time::timeout(self.timeout, self.llm.stream(&prompt))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} did not accept the request within {}s",
                    self.llm.name(),
                    self.timeout.as_secs()
                ))
            })??;

        tokio::spawn(pump(upstream, tx, self.timeout));

        Ok(ReceiverStream::new(rx))
    }
}

/// Forward model output to `tx` line by line until the model finishes, fails,
/// stalls for longer than `idle`, or the receiver goes away.
async fn pump(mut upstream: TokenStream, tx: mpsc::Sender<Fragment>, idle: Duration) {
    let mut lines = LineBuffer::new();
    let mut emitted = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("Client disconnected after {} fragment(s), aborting model stream", emitted);
                return;
            }
            next = tokio::time::timeout(idle, upstream.next()) => next,
        };

        let failure = match next {
            Ok(Some(Ok(text))) => {
                for line in lines.push(&text) {
                    if tx.send(Fragment::Text(line)).await.is_err() {
                        return;
                    }
                    emitted += 1;
                }
                continue;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => e.to_string(),
            Err(_) => format!("Model produced no output for {}s", idle.as_secs()),
        };

        tracing::warn!("Generation stream failed: {}", failure);
        if let Some(rest) = lines.finish() {
            let _ = tx.send(Fragment::Text(rest)).await;
        }
        let _ = tx.send(Fragment::Failed(failure)).await;
        return;
    }

    if let Some(rest) = lines.finish() {
        let _ = tx.send(Fragment::Text(rest)).await;
        emitted += 1;
    }
    tracing::info!("Generation finished ({} fragment(s))", emitted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;

    fn service(llm: Arc<ScriptedLlm>, timeout: Duration) -> GenerationService {
        GenerationService::new(llm, PromptBuilder::default(), timeout, 4)
    }

    fn spine_page() -> PageDocument {
        PageDocument::new("Downward Dog stretches the spine.", "uploads/yoga.pdf", 0)
    }

    async fn drain(stream: FragmentStream) -> Vec<Fragment> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_no_context_emits_fallback_without_model_call() {
        let llm = Arc::new(ScriptedLlm::new(&["never"]));
        let svc = service(Arc::clone(&llm), Duration::from_secs(5));

        let fragments = drain(svc.generate("anything?", &[]).await.unwrap()).await;

        assert_eq!(fragments, vec![Fragment::Text(NO_CONTEXT_FALLBACK.to_string())]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_tokens_rechunked_into_lines() {
        let llm = Arc::new(ScriptedLlm::new(&["Hel", "lo\nWor", "ld"]));
        let svc = service(Arc::clone(&llm), Duration::from_secs(5));

        let fragments = drain(svc.generate("q", &[spine_page()]).await.unwrap()).await;

        assert_eq!(
            fragments,
            vec![
                Fragment::Text("Hello\n".into()),
                Fragment::Text("World".into())
            ]
        );
        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("Context: Downward Dog stretches the spine."));
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let llm = Arc::new(ScriptedLlm::new(&["x"]));
        let svc = service(Arc::clone(&llm), Duration::from_secs(5));

        let err = svc.generate("  ", &[spine_page()]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_flushes_then_fails() {
        let llm = Arc::new(ScriptedLlm::new(&["Step 1\nSte"]).failing_after("connection reset"));
        let svc = service(llm, Duration::from_secs(5));

        let fragments = drain(svc.generate("q", &[spine_page()]).await.unwrap()).await;

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], Fragment::Text("Step 1\n".into()));
        assert_eq!(fragments[1], Fragment::Text("Ste".into()));
        assert!(matches!(&fragments[2], Fragment::Failed(m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_connect_timeout_is_error_not_stream() {
        let llm = Arc::new(ScriptedLlm::new(&["late"]).with_connect_delay(Duration::from_secs(5)));
        let svc = service(llm, Duration::from_millis(50));

        let err = svc.generate("q", &[spine_page()]).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let llm = Arc::new(
            ScriptedLlm::new(&["first\n", "second\n"]).with_fragment_delay(Duration::from_secs(5)),
        );
        let svc = service(llm, Duration::from_millis(50));

        let fragments = drain(svc.generate("q", &[spine_page()]).await.unwrap()).await;
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], Fragment::Failed(m) if m.contains("no output")));
    }

    #[tokio::test]
    async fn test_dropping_receiver_cancels_upstream() {
        let tokens: Vec<&str> = std::iter::repeat("tok\n").take(1000).collect();
        let llm = Arc::new(ScriptedLlm::new(&tokens).with_fragment_delay(Duration::from_millis(5)));
        let svc = service(Arc::clone(&llm), Duration::from_secs(5));

        let mut stream = svc.generate("q", &[spine_page()]).await.unwrap();
        assert_eq!(stream.next().await, Some(Fragment::Text("tok\n".into())));
        drop(stream);

        let released = async {
            while !llm.stream_dropped() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), released)
            .await
            .expect("upstream stream was not released after disconnect");
    }
}
