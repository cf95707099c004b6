pub mod outcome;
pub mod progress;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::pipeline::state::ItemKey;
use crate::pipeline::{PipelineDefinition, Services, StageRunner, WorkItem};

pub use outcome::{BatchResult, ErrorDetail, ItemOutcome};
pub use progress::{ChannelReporter, ProgressEvent, ProgressReporter, SilentReporter};

/// Runs batches of items through a pipeline with at most `limit` items in flight.
///
/// The gate is owned by the scheduler, so every batch submitted to the same
/// scheduler shares one budget.
pub struct BoundedScheduler {
    limit: usize,
    gate: Arc<Semaphore>,
    services: Arc<Services>,
}

impl BoundedScheduler {
    pub fn new(limit: usize, services: Services) -> Result<Self> {
        if limit == 0 {
            return Err(AppError::Config(
                "concurrency limit must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            limit,
            gate: Arc::new(Semaphore::new(limit)),
            services: Arc::new(services),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots not currently held by a running item.
    pub fn available_capacity(&self) -> usize {
        self.gate.available_permits()
    }

    /// Validate loosely-typed records against the pipeline and run the valid ones.
    ///
    /// Records that fail validation still get an outcome, without using capacity.
    pub async fn run_records(
        &self,
        pipeline: Arc<PipelineDefinition>,
        records: Vec<serde_json::Map<String, serde_json::Value>>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        let entries = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                WorkItem::from_record(index, record, pipeline.required_fields()).map_err(|e| {
                    tracing::warn!(index, error = %e, "Rejected record");
                    ItemOutcome::failure(ItemKey::for_record(index, record), &e, None)
                })
            })
            .collect();

        self.run_entries(pipeline, entries, reporter, cancel).await
    }

    pub async fn run_batch(
        &self,
        pipeline: Arc<PipelineDefinition>,
        items: Vec<WorkItem>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        let entries = items.into_iter().map(Ok).collect();
        self.run_entries(pipeline, entries, reporter, cancel).await
    }

    async fn run_entries(
        &self,
        pipeline: Arc<PipelineDefinition>,
        entries: Vec<std::result::Result<WorkItem, ItemOutcome>>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        let total = entries.len();
        let pipeline_name = pipeline.name();
        tracing::info!(
            pipeline = pipeline_name,
            items = total,
            limit = self.limit,
            available = self.available_capacity(),
            "Starting batch"
        );

        let runner = Arc::new(StageRunner::new(pipeline, Arc::clone(&self.services)));
        let mut slots: Vec<Option<ItemOutcome>> = vec![None; total];
        let mut keys: Vec<ItemKey> = Vec::with_capacity(total);
        let mut tasks = JoinSet::new();

        // Every item is spawned up front; the gate decides who actually runs.
        for (position, entry) in entries.into_iter().enumerate() {
            match entry {
                Err(rejected) => {
                    keys.push(rejected.key().clone());
                    notify(reporter.as_ref(), &rejected);
                    slots[position] = Some(rejected);
                }
                Ok(item) => {
                    keys.push(item.key().clone());
                    let gate = Arc::clone(&self.gate);
                    let runner = Arc::clone(&runner);
                    let reporter = Arc::clone(&reporter);
                    let cancel = cancel.clone();
                    tasks.spawn(async move {
                        let outcome = run_item(gate, runner, item, cancel).await;
                        notify(reporter.as_ref(), &outcome);
                        (position, outcome)
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => {
                    let slot = slots.get_mut(position).ok_or_else(|| {
                        AppError::Internal(format!("outcome for unknown position {position}"))
                    })?;
                    if slot.replace(outcome).is_some() {
                        return Err(AppError::Internal(format!(
                            "duplicate outcome for position {position}"
                        )));
                    }
                }
                Err(e) => {
                    // The slot is filled below.
                    tracing::error!(error = %e, "Item task terminated abnormally");
                }
            }
        }

        let outcomes: Vec<ItemOutcome> = slots
            .into_iter()
            .zip(keys)
            .map(|(slot, key)| {
                slot.unwrap_or_else(|| {
                    ItemOutcome::failure(
                        key,
                        &AppError::Internal("item task terminated without an outcome".to_string()),
                        None,
                    )
                })
            })
            .collect();

        let result = BatchResult::new(outcomes);
        tracing::info!(
            pipeline = pipeline_name,
            items = total,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "Batch finished"
        );
        Ok(result)
    }
}

/// Acquire a slot, run the item and release the slot on every exit path.
///
/// Panics inside the pipeline are turned into an internal failure for this item only.
async fn run_item(
    gate: Arc<Semaphore>,
    runner: Arc<StageRunner>,
    item: WorkItem,
    cancel: CancellationToken,
) -> ItemOutcome {
    let key = item.key().clone();

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return ItemOutcome::failure(key, &AppError::Cancelled, None);
        }
        permit = gate.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return ItemOutcome::failure(
                    key,
                    &AppError::Internal("concurrency gate closed".to_string()),
                    None,
                );
            }
        },
    };

    tracing::debug!(item = %key, "Item admitted");
    let result = AssertUnwindSafe(runner.run(item, cancel))
        .catch_unwind()
        .await;
    drop(permit);

    result.unwrap_or_else(|panic| {
        let message = panic_message(panic.as_ref());
        tracing::error!(item = %key, panic = %message, "Item pipeline panicked");
        ItemOutcome::failure(
            key,
            &AppError::Internal(format!("item pipeline panicked: {message}")),
            None,
        )
    })
}

/// Hand an outcome to the reporter. A panicking reporter loses its event,
/// never the outcome.
fn notify(reporter: &dyn ProgressReporter, outcome: &ItemOutcome) {
    let reported = std::panic::catch_unwind(AssertUnwindSafe(|| reporter.on_item_complete(outcome)));
    if let Err(panic) = reported {
        tracing::error!(
            item = %outcome.key(),
            panic = %panic_message(panic.as_ref()),
            "Progress reporter panicked"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
