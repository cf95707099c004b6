use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::messages::{EnrichRequest, EnrichResponse, IcpRequest, IcpResponse};
use crate::scheduler::{ItemOutcome, SilentReporter};
use crate::server::AppState;

/// Light enrichment for a whole batch, answered once every company has an outcome.
///
/// If the client goes away the handler future is dropped, which aborts the
/// batch's item tasks and frees their slots.
pub async fn enrich(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnrichRequest>,
) -> Response {
    tracing::info!(companies = request.companies.len(), "Received enrichment request");

    let result = state
        .scheduler
        .run_records(
            Arc::clone(&state.light_enrich),
            request.companies,
            Arc::new(SilentReporter),
            state.shutdown.child_token(),
        )
        .await;

    match result {
        Ok(batch) => Json(EnrichResponse {
            enriched_companies: batch,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Batch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Deep research for one company.
pub async fn icp_enrich(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IcpRequest>,
) -> Json<IcpResponse> {
    tracing::info!(company = %request.company_name, "Starting ICP enrichment");

    let result = state
        .scheduler
        .run_records(
            Arc::clone(&state.deep_research),
            vec![request.into_record()],
            Arc::new(SilentReporter),
            state.shutdown.child_token(),
        )
        .await;

    let outcome = match result {
        Ok(batch) => batch.into_outcomes().into_iter().next(),
        Err(e) => {
            tracing::error!(error = %e, "ICP enrichment failed");
            return Json(IcpResponse::Error {
                error: format!("An error occurred: {e}"),
            });
        }
    };

    let output_field = state.deep_research.output_field();
    Json(match outcome {
        Some(ItemOutcome::Success {
            mut record,
            profile,
            ..
        }) => IcpResponse::Enriched {
            enriched_data: record.remove(output_field).unwrap_or_default(),
            profile,
        },
        Some(ItemOutcome::Failure { error, .. }) => IcpResponse::Error {
            error: format!("An error occurred: {}", error.message),
        },
        None => IcpResponse::Error {
            error: "Workflow completed without generating insights".to_string(),
        },
    })
}

pub async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_state, EchoSynthesizer, ScriptedGatherer};
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_enrich_returns_outcome_per_company() {
        let state = app_state(ScriptedGatherer::new().fail_on("BadCo"), EchoSynthesizer::default());
        let request: EnrichRequest = serde_json::from_value(json!({
            "companies": [
                { "name": "Apple Inc.", "website": "apple.com" },
                { "name": "BadCo" },
                { "website": "no-name.example" }
            ]
        }))
        .unwrap();

        let response = enrich(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let outcomes = body["enriched_companies"].as_array().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0]["status"], "success");
        assert_eq!(outcomes[0]["record"]["website"], "apple.com");
        assert!(outcomes[0]["record"]["Enriched_Data"].is_string());
        assert_eq!(outcomes[1]["error"]["kind"], "transient");
        assert_eq!(outcomes[2]["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_icp_enrich_returns_document() {
        let state = app_state(ScriptedGatherer::new(), EchoSynthesizer::default());
        let request: IcpRequest = serde_json::from_value(json!({
            "companyName": "Justworks",
            "website": "www.justworks.com",
            "product": "Justworks Payroll",
            "territory": "Atlanta Georgia"
        }))
        .unwrap();

        let Json(response) = icp_enrich(State(state), Json(request)).await;
        match response {
            IcpResponse::Enriched { enriched_data, profile } => {
                assert!(!enriched_data.is_empty());
                assert!(profile.is_some());
            }
            IcpResponse::Error { error } => panic!("unexpected error: {error}"),
        }
    }

    #[tokio::test]
    async fn test_icp_enrich_reports_validation_error() {
        let state = app_state(ScriptedGatherer::new(), EchoSynthesizer::default());
        let request: IcpRequest = serde_json::from_value(json!({
            "companyName": "Justworks",
            "product": "",
            "territory": "Atlanta Georgia"
        }))
        .unwrap();

        let Json(response) = icp_enrich(State(state), Json(request)).await;
        let IcpResponse::Error { error } = response else {
            panic!("blank product should be rejected");
        };
        assert!(error.contains("product"));
    }
}
