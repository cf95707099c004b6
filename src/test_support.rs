//! Test doubles for the external services and for stages.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::evidence::EvidenceGatherer;
use crate::pipeline::state::{PipelineState, TranscriptMessage, WorkItem};
use crate::pipeline::{Services, Stage, StageContext, StageResult};
use crate::scheduler::{ItemOutcome, ProgressReporter};
use crate::server::AppState;
use crate::synthesis::Synthesizer;

pub fn item(index: usize, fields: &[(&str, &str)]) -> WorkItem {
    let fields: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    WorkItem::new(index, fields, &[]).unwrap()
}

pub fn state_for(item: WorkItem) -> PipelineState {
    PipelineState::new(item)
}

pub fn services(gatherer: ScriptedGatherer, synthesizer: EchoSynthesizer) -> Services {
    Services::new(Arc::new(gatherer), Arc::new(synthesizer))
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
}

/// Defaults everywhere except the required API key.
pub fn app_config() -> AppConfig {
    serde_json::from_value(serde_json::json!({ "llm": { "api_key": "test-key" } })).unwrap()
}

pub fn app_state(gatherer: ScriptedGatherer, synthesizer: EchoSynthesizer) -> Arc<AppState> {
    Arc::new(AppState::with_services(app_config(), services(gatherer, synthesizer)).unwrap())
}

/// Search double answering `evidence for <query>`.
#[derive(Default)]
pub struct ScriptedGatherer {
    delay: Duration,
    staggered: bool,
    fail_on: Option<String>,
    reject: Option<String>,
    flaky: usize,
    calls: AtomicUsize,
}

impl ScriptedGatherer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Each call waits less than the one before it, so later queries finish first.
    pub fn with_staggered_delays(mut self) -> Self {
        self.staggered = true;
        self
    }

    /// Queries containing `needle` fail with a transient search error.
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Queries containing `needle` fail with a validation error.
    pub fn reject(mut self, needle: &str) -> Self {
        self.reject = Some(needle.to_string());
        self
    }

    /// The first `failures` calls fail transiently.
    pub fn flaky(mut self, failures: usize) -> Self {
        self.flaky = failures;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceGatherer for ScriptedGatherer {
    async fn fetch(&self, query: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = if self.staggered {
            Duration::from_millis(60u64.saturating_sub(10 * call as u64))
        } else {
            self.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if call < self.flaky {
            return Err(AppError::Transient(format!("flaky call {call}")));
        }
        if self.reject.as_deref().is_some_and(|n| query.contains(n)) {
            return Err(AppError::Validation(format!("rejected query: {query}")));
        }
        if self.fail_on.as_deref().is_some_and(|n| query.contains(n)) {
            return Err(AppError::SearchApi(format!("search returned 503 for {query}")));
        }
        Ok(format!("evidence for {query}"))
    }
}

/// Completion double that echoes its context and records every context it sees.
#[derive(Default)]
pub struct EchoSynthesizer {
    blank: bool,
    contexts: Arc<Mutex<Vec<String>>>,
}

impl EchoSynthesizer {
    pub fn blank() -> Self {
        Self {
            blank: true,
            ..Self::default()
        }
    }

    pub fn contexts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.contexts)
    }
}

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn complete(
        &self,
        _instructions: &str,
        context: &str,
        transcript: &[TranscriptMessage],
    ) -> Result<String> {
        self.contexts.lock().unwrap().push(context.to_string());
        if self.blank {
            return Ok("  ".to_string());
        }
        Ok(format!(
            "Synthesis after {} messages:\n{context}",
            transcript.len()
        ))
    }
}

/// Stage double that records which items reached it and how many ran at once.
pub struct ProbeStage {
    name: &'static str,
    delay: Duration,
    descending: Option<(usize, Duration)>,
    failing_for: Option<String>,
    panicking_for: Option<String>,
    log: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ProbeStage {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            delay: Duration::ZERO,
            descending: None,
            failing_for: None,
            panicking_for: None,
            log: Arc::default(),
            active: Arc::default(),
            max_active: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Item `i` of `total` waits `(total - i) * step`.
    pub fn with_descending_delays(mut self, total: usize, step: Duration) -> Self {
        self.descending = Some((total, step));
        self
    }

    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing_for = Some(name.to_string());
        self
    }

    pub fn panicking_for(mut self, name: &str) -> Self {
        self.panicking_for = Some(name.to_string());
        self
    }

    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    pub fn max_active(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_active)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Stage for ProbeStage {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, mut state: PipelineState, _ctx: &StageContext) -> StageResult {
        let name = state.item().name().to_string();
        self.log.lock().unwrap().push(name.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(Arc::clone(&self.active));
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let delay = match self.descending {
            Some((total, step)) => step * (total.saturating_sub(state.item().key().index)) as u32,
            None => self.delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.panicking_for.as_deref() == Some(name.as_str()) {
            panic!("probe exploded for {name}");
        }
        if self.failing_for.as_deref() == Some(name.as_str()) {
            return StageResult::Fail(AppError::Transient(format!("probe failed for {name}")));
        }

        state.set_synthesis(format!("{} done for {name}", self.name));
        StageResult::Continue(state)
    }
}

/// Reporter that keeps every outcome in arrival order.
#[derive(Default)]
pub struct RecordingReporter {
    outcomes: Mutex<Vec<ItemOutcome>>,
}

impl RecordingReporter {
    pub fn outcomes(&self) -> Vec<ItemOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_item_complete(&self, outcome: &ItemOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}
