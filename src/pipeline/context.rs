use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::retry::RetryPolicy;
use super::state::TranscriptMessage;
use crate::error::{AppError, Result};
use crate::evidence::EvidenceGatherer;
use crate::synthesis::Synthesizer;

/// External collaborators plus the call policy stages use to reach them.
pub struct Services {
    gatherer: Arc<dyn EvidenceGatherer>,
    synthesizer: Arc<dyn Synthesizer>,
    search_timeout: Duration,
    synthesis_timeout: Duration,
    retry: RetryPolicy,
}

impl Services {
    pub fn new(gatherer: Arc<dyn EvidenceGatherer>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            gatherer,
            synthesizer,
            search_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(120),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_timeouts(mut self, search: Duration, synthesis: Duration) -> Self {
        self.search_timeout = search;
        self.synthesis_timeout = synthesis;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// What one stage invocation sees: the shared services and its item's cancellation token.
#[derive(Clone)]
pub struct StageContext {
    services: Arc<Services>,
    cancel: CancellationToken,
}

impl StageContext {
    pub fn new(services: Arc<Services>, cancel: CancellationToken) -> Self {
        Self { services, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Query the search service under timeout, retry and cancellation.
    pub async fn fetch(&self, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("search query is empty".to_string()));
        }
        let gatherer = &self.services.gatherer;
        self.call("search", self.services.search_timeout, move || gatherer.fetch(query))
            .await
    }

    /// Ask the completion service for text. An empty completion is an error.
    pub async fn complete(
        &self,
        instructions: &str,
        context: &str,
        transcript: &[TranscriptMessage],
    ) -> Result<String> {
        let synthesizer = &self.services.synthesizer;
        let text = self
            .call("synthesis", self.services.synthesis_timeout, move || {
                synthesizer.complete(instructions, context, transcript)
            })
            .await?;

        if text.trim().is_empty() {
            return Err(AppError::LlmApi("completion contained no text".to_string()));
        }
        Ok(text)
    }

    async fn call<T, F, Fut>(&self, service: &'static str, timeout: Duration, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry = self.services.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                outcome = tokio::time::timeout(timeout, op()) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout(format!("{service} call exceeded {timeout:?}"))),
                },
            };

            match result {
                Err(e) if e.is_transient() && retry.should_retry(attempt) => {
                    let delay = retry.delay_for(attempt);
                    tracing::warn!(
                        service,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}
