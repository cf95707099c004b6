pub mod claude;
pub mod profile;
pub mod prompt;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::state::TranscriptMessage;

pub use claude::ClaudeClient;
pub use profile::IcpProfile;

/// External completion service that turns instructions plus evidence into text.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// `transcript` is prior conversation for this item, oldest first.
    async fn complete(
        &self,
        instructions: &str,
        context: &str,
        transcript: &[TranscriptMessage],
    ) -> Result<String>;
}
