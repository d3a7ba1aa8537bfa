//! Coding-agent client: subprocess invocation and stream-json protocol

pub mod client;
pub mod cost;
pub mod events;
pub mod response;
pub mod streaming;
pub mod subprocess_client;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use client::{AgentClientConfig, AgentRequest, HEALING_TOOLS};
pub use cost::{CostTracker, UsageReport};
pub use events::{parse_line, AgentEvent, ToolInvocation};
pub use response::{AgentError, AgentResponse, FileChange};
pub use streaming::{NoopCallback, ProgressCallback};
pub use subprocess_client::SubprocessClient;

/// Trait for agent execution - allows for different implementations
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run one request, reporting each stream event to `callback`
    async fn invoke(
        &self,
        request: &AgentRequest,
        callback: Option<&dyn ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError>;
}

#[async_trait]
impl AgentExecutor for SubprocessClient {
    async fn invoke(
        &self,
        request: &AgentRequest,
        callback: Option<&dyn ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        self.execute(request, callback, cancel).await
    }
}
