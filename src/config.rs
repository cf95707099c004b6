use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::pipeline::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// SearXNG instance used for evidence gathering.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of item pipelines running at once, shared by all batches.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_search_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_search_timeout() -> u64 {
    30
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_concurrency_limit() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("prospector").required(false));
        }

        // Environment variable overrides with PROSPECTOR_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PROSPECTOR")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.concurrency_limit == 0 {
            return Err(AppError::Config(
                "scheduler.concurrency_limit must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(AppError::Config("llm.api_key is empty".to_string()));
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_applies_defaults() {
        let file = write_config("[llm]\napi_key = \"sk-test\"\n");
        let config = AppConfig::load(file.path().to_str()).unwrap();

        assert_eq!(config.server.port, 8501);
        assert_eq!(config.scheduler.concurrency_limit, 50);
        assert_eq!(config.search.base_url, "http://localhost:8080");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.search_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_rejects_zero_concurrency() {
        let file = write_config("[llm]\napi_key = \"sk-test\"\n\n[scheduler]\nconcurrency_limit = 0\n");
        let err = AppConfig::load(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("concurrency_limit"));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let file = write_config("[server]\nport = 9000\n");
        let err = AppConfig::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let file = write_config("[llm]\napi_key = \"sk-very-secret\"\n");
        let config = AppConfig::load(file.path().to_str()).unwrap();
        let debug = format!("{:?}", config.llm);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
