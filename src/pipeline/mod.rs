pub mod context;
pub mod retry;
pub mod runner;
pub mod stages;
pub mod state;

use async_trait::async_trait;

use crate::error::AppError;
use crate::scheduler::outcome::ItemOutcome;
use crate::synthesis::IcpProfile;

pub use context::{Services, StageContext};
pub use retry::RetryPolicy;
pub use runner::StageRunner;
pub use state::{PipelineState, WorkItem};

/// Outcome of one stage. A failed stage applies nothing to the item's state.
#[derive(Debug)]
pub enum StageResult {
    Continue(PipelineState),
    Fail(AppError),
}

impl From<crate::error::Result<PipelineState>> for StageResult {
    fn from(result: crate::error::Result<PipelineState>) -> Self {
        match result {
            Ok(state) => StageResult::Continue(state),
            Err(e) => StageResult::Fail(e),
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, state: PipelineState, ctx: &StageContext) -> StageResult;
}

/// How the final state of a run is turned into a success payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// The synthesized text only.
    Text,
    /// The synthesized text plus a parsed ideal-customer-profile.
    IcpProfile,
}

/// A linear list of stages plus the fields and output they need.
pub struct PipelineDefinition {
    name: &'static str,
    stages: Vec<Box<dyn Stage>>,
    required_fields: Vec<&'static str>,
    output_field: &'static str,
    shape: OutputShape,
}

impl PipelineDefinition {
    pub fn new(name: &'static str, output_field: &'static str) -> Self {
        Self {
            name,
            stages: Vec::new(),
            required_fields: Vec::new(),
            output_field,
            shape: OutputShape::Text,
        }
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn requires(mut self, field: &'static str) -> Self {
        self.required_fields.push(field);
        self
    }

    pub fn with_shape(mut self, shape: OutputShape) -> Self {
        self.shape = shape;
        self
    }

    /// Per-company deep research: five searches plus a research brief, then an ICP document.
    pub fn deep_research() -> Self {
        Self::new("deep_research", stages::ICP_FIELD)
            .requires("product")
            .requires("territory")
            .with_stage(stages::ResearchStage::new(stages::RESEARCH_QUERIES))
            .with_stage(stages::InsightStage)
            .with_shape(OutputShape::IcpProfile)
    }

    /// High-volume enrichment: one search and one completion per company.
    pub fn light_enrich() -> Self {
        Self::new("light_enrich", stages::ENRICHED_FIELD).with_stage(stages::LightEnrichStage)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    pub fn required_fields(&self) -> &[&'static str] {
        &self.required_fields
    }

    pub fn output_field(&self) -> &'static str {
        self.output_field
    }

    /// Build the success outcome for a run that completed every stage.
    pub fn finish(&self, state: PipelineState) -> ItemOutcome {
        let (item, synthesis) = state.into_parts();
        let key = item.key().clone();

        let Some(text) = synthesis else {
            return ItemOutcome::failure(
                key,
                &AppError::Internal(format!("pipeline {} produced no synthesis", self.name)),
                None,
            );
        };

        let profile = match self.shape {
            OutputShape::Text => None,
            OutputShape::IcpProfile => Some(IcpProfile::parse(&text)),
        };

        let mut record = item.fields().clone();
        record.insert(self.output_field.to_string(), text);

        ItemOutcome::Success {
            key,
            record,
            profile,
        }
    }
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("required_fields", &self.required_fields)
            .field("output_field", &self.output_field)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pipelines() {
        let deep = PipelineDefinition::deep_research();
        let names: Vec<&str> = deep.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["research", "insights"]);
        assert_eq!(deep.required_fields(), &["product", "territory"]);

        let light = PipelineDefinition::light_enrich();
        assert_eq!(light.stages().len(), 1);
        assert_eq!(light.output_field(), "Enriched_Data");
        assert!(light.required_fields().is_empty());
    }
}
