use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{handler, socket};
use crate::config::AppConfig;
use crate::error::Result;
use crate::evidence::SearxClient;
use crate::pipeline::{PipelineDefinition, Services};
use crate::scheduler::BoundedScheduler;
use crate::synthesis::ClaudeClient;

pub struct AppState {
    pub config: AppConfig,
    pub scheduler: BoundedScheduler,
    pub light_enrich: Arc<PipelineDefinition>,
    pub deep_research: Arc<PipelineDefinition>,
    /// Parent of every batch's cancellation token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let gatherer = SearxClient::new(&config.search)?;
        let synthesizer = ClaudeClient::new(&config.llm)?;
        let services = Services::new(Arc::new(gatherer), Arc::new(synthesizer))
            .with_timeouts(config.search_timeout(), config.llm_timeout())
            .with_retry(config.retry.policy());

        Self::with_services(config, services)
    }

    pub fn with_services(config: AppConfig, services: Services) -> Result<Self> {
        let scheduler = BoundedScheduler::new(config.scheduler.concurrency_limit, services)?;

        Ok(Self {
            config,
            scheduler,
            light_enrich: Arc::new(PipelineDefinition::light_enrich()),
            deep_research: Arc::new(PipelineDefinition::deep_research()),
            shutdown: CancellationToken::new(),
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/enrich", post(handler::enrich))
        .route("/icp_enrich", post(handler::icp_enrich))
        .route("/ws", get(socket::ws_handler))
        .route("/health", get(handler::health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_config, services, EchoSynthesizer, ScriptedGatherer};

    #[test]
    fn test_state_uses_configured_limit() {
        let mut config = app_config();
        config.scheduler.concurrency_limit = 7;

        let state = AppState::with_services(
            config,
            services(ScriptedGatherer::new(), EchoSynthesizer::default()),
        )
        .unwrap();

        assert_eq!(state.scheduler.limit(), 7);
        assert_eq!(state.light_enrich.output_field(), "Enriched_Data");
        assert_eq!(state.deep_research.output_field(), "icp_insights");
    }

    #[test]
    fn test_state_rejects_zero_limit() {
        let mut config = app_config();
        config.scheduler.concurrency_limit = 0;

        let result = AppState::with_services(
            config,
            services(ScriptedGatherer::new(), EchoSynthesizer::default()),
        );
        assert!(result.is_err());
    }
}
