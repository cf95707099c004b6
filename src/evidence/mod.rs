pub mod searx;

use async_trait::async_trait;

use crate::error::Result;

pub use searx::SearxClient;

/// External search service that turns a query into evidence text.
#[async_trait]
pub trait EvidenceGatherer: Send + Sync {
    /// Run one query. Transport, timeout and quota failures are transient errors.
    async fn fetch(&self, query: &str) -> Result<String>;
}
