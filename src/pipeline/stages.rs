use async_trait::async_trait;
use futures::future::join_all;

use super::state::{Evidence, PipelineState, TranscriptMessage, NAME_FIELD};
use super::{Stage, StageContext, StageResult};
use crate::error::{AppError, Result};
use crate::synthesis::prompt;

/// Output field for the light enrichment pipeline.
pub const ENRICHED_FIELD: &str = "Enriched_Data";

/// Output field for the deep research pipeline.
pub const ICP_FIELD: &str = "icp_insights";

/// Query templates for deep research. `{field}` is replaced with the item's field value.
pub const RESEARCH_QUERIES: &[&str] = &[
    "\"{name}\" customer success stories",
    "\"{name}\" {territory} market",
    "\"{product}\" benefits for businesses",
    "\"{name}\" vs competitors",
    "\"{territory}\" business challenges {product} solves",
];

/// Substitute `{field}` placeholders with the item's values. Unknown fields become empty.
pub fn render_query(template: &str, state: &PipelineState) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let field = &after[..end];
                let value = if field == NAME_FIELD {
                    Some(state.item().name())
                } else {
                    state.item().field(field)
                };
                out.push_str(value.map(str::trim).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn field<'a>(state: &'a PipelineState, name: &str) -> &'a str {
    state.item().field(name).map(str::trim).unwrap_or_default()
}

/// Runs a fixed set of searches, then asks for a research brief over the results.
pub struct ResearchStage {
    templates: Vec<String>,
}

impl ResearchStage {
    pub fn new(templates: &[&str]) -> Self {
        Self {
            templates: templates.iter().map(|t| t.to_string()).collect(),
        }
    }

    async fn gather(&self, mut state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let queries: Vec<String> = self
            .templates
            .iter()
            .map(|t| render_query(t, &state))
            .collect();

        // Issued together; join_all keeps results in template order.
        let results = join_all(queries.iter().map(|q| ctx.fetch(q))).await;

        let mut last_error = None;
        for (query, result) in queries.into_iter().zip(results) {
            match result {
                Ok(text) => state.push_evidence(Evidence { query, text }),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    tracing::warn!(item = %state.item().key(), query = %query, error = %e, "Search failed");
                    last_error = Some(e);
                }
            }
        }

        if state.evidence().is_empty() {
            return Err(last_error
                .unwrap_or_else(|| AppError::Validation("no research queries configured".to_string())));
        }

        let company = state.item().name().to_string();
        let instructions =
            prompt::market_research(&company, field(&state, "product"), field(&state, "territory"));
        let brief = ctx
            .complete(&instructions, &state.evidence_text(), state.transcript())
            .await?;

        tracing::info!(item = %state.item().key(), fragments = state.evidence().len(), "Research completed");

        state.append_transcript(TranscriptMessage::user(format!(
            "Research the market for {company}."
        )));
        state.append_transcript(TranscriptMessage::assistant(brief.clone()));
        state.set_synthesis(brief);
        Ok(state)
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &str {
        "research"
    }

    async fn run(&self, state: PipelineState, ctx: &StageContext) -> StageResult {
        self.gather(state, ctx).await.into()
    }
}

/// Turns the research brief and raw evidence into an ideal-customer-profile document.
pub struct InsightStage;

impl InsightStage {
    async fn synthesize(&self, mut state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let research = state.synthesis().unwrap_or_default();
        let context = prompt::research_context(research, &state.evidence_text());
        let instructions = prompt::ideal_customer_profile(
            state.item().name(),
            field(&state, "product"),
            field(&state, "territory"),
        );

        let insights = ctx
            .complete(&instructions, &context, state.transcript())
            .await?;

        tracing::info!(item = %state.item().key(), "Generated ICP insights");

        state.append_transcript(TranscriptMessage::user("Create the ideal customer profile."));
        state.append_transcript(TranscriptMessage::assistant(insights.clone()));
        state.set_synthesis(insights);
        Ok(state)
    }
}

#[async_trait]
impl Stage for InsightStage {
    fn name(&self) -> &str {
        "insights"
    }

    async fn run(&self, state: PipelineState, ctx: &StageContext) -> StageResult {
        self.synthesize(state, ctx).await.into()
    }
}

/// One search on the company name followed directly by one completion.
pub struct LightEnrichStage;

impl LightEnrichStage {
    async fn enrich(&self, mut state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        let query = state.item().name().to_string();
        let text = ctx.fetch(&query).await?;
        state.push_evidence(Evidence { query, text });

        let instructions = prompt::company_overview(state.item().name());
        let overview = ctx
            .complete(&instructions, &state.evidence_text(), state.transcript())
            .await?;

        state.append_transcript(TranscriptMessage::assistant(overview.clone()));
        state.set_synthesis(overview);
        Ok(state)
    }
}

#[async_trait]
impl Stage for LightEnrichStage {
    fn name(&self) -> &str {
        "enrich"
    }

    async fn run(&self, state: PipelineState, ctx: &StageContext) -> StageResult {
        self.enrich(state, ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{item, state_for};

    #[test]
    fn test_render_query_substitutes_fields() {
        let state = state_for(item(
            0,
            &[("name", "Justworks"), ("product", "Justworks Payroll"), ("territory", "Atlanta Georgia")],
        ));

        let rendered: Vec<String> = RESEARCH_QUERIES
            .iter()
            .map(|t| render_query(t, &state))
            .collect();

        assert_eq!(rendered[0], "\"Justworks\" customer success stories");
        assert_eq!(rendered[1], "\"Justworks\" Atlanta Georgia market");
        assert_eq!(
            rendered[4],
            "\"Atlanta Georgia\" business challenges Justworks Payroll solves"
        );
    }

    #[test]
    fn test_render_query_unknown_field_and_unclosed_brace() {
        let state = state_for(item(0, &[("name", "Acme")]));
        assert_eq!(render_query("{name} {missing} news", &state), "Acme  news");
        assert_eq!(render_query("{name} {oops", &state), "Acme {oops");
    }
}
