use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::context::{Services, StageContext};
use super::state::{PipelineState, WorkItem};
use super::{PipelineDefinition, StageResult};
use crate::error::AppError;
use crate::scheduler::outcome::ItemOutcome;

/// Runs one item through a pipeline's stages in order.
///
/// Stops at the first failing stage and never retries; retries happen inside the
/// stage context around individual calls.
pub struct StageRunner {
    pipeline: Arc<PipelineDefinition>,
    services: Arc<Services>,
}

impl StageRunner {
    pub fn new(pipeline: Arc<PipelineDefinition>, services: Arc<Services>) -> Self {
        Self { pipeline, services }
    }

    pub async fn run(&self, item: WorkItem, cancel: CancellationToken) -> ItemOutcome {
        let key = item.key().clone();
        let ctx = StageContext::new(Arc::clone(&self.services), cancel);
        let mut state = PipelineState::new(item);

        for stage in self.pipeline.stages() {
            if ctx.is_cancelled() {
                tracing::info!(item = %key, stage = stage.name(), "Cancelled before stage");
                return ItemOutcome::failure(key, &AppError::Cancelled, Some(stage.name()));
            }

            tracing::debug!(item = %key, stage = stage.name(), "Starting stage");

            let result = tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => StageResult::Fail(AppError::Cancelled),
                result = stage.run(state, &ctx) => result,
            };

            state = match result {
                StageResult::Continue(next) => next,
                StageResult::Fail(e) => {
                    tracing::warn!(
                        item = %key,
                        stage = stage.name(),
                        error = %e,
                        "Stage failed"
                    );
                    return ItemOutcome::failure(key, &e, Some(stage.name()));
                }
            };
        }

        self.pipeline.finish(state)
    }
}
