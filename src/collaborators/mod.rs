//! Collaborator contracts consumed by the orchestrator.
//!
//! A collaborator is an optional external service. Instead of probing
//! method names at runtime, each collaborator publishes the list of
//! named operations it implements and dispatches on that name.

pub mod content;
pub mod ollama;
pub mod persistence;
pub mod web_data;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use content::{AiContentModule, ContentModule};
pub use ollama::{OllamaClient, OllamaConfig};
pub use persistence::{JsonlSink, NoopSink, PersistenceSink, SinkCapability};
pub use web_data::{WebDataClient, WebDataConfig};

/// A capability bound to a collaborator name.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Human-readable collaborator name used in logs.
    fn name(&self) -> &str;

    /// Operations this capability exposes.
    fn operations(&self) -> &[&'static str];

    /// Invoke `operation` with `args`.
    async fn invoke(&self, operation: &str, args: &Value) -> Result<Value>;

    fn supports(&self, operation: &str) -> bool {
        self.operations().contains(&operation)
    }
}

/// Receives a notification before each phase starts.
pub trait ProgressCallback: Send + Sync {
    fn notify(&self, phase_index: usize, message: &str) -> Result<()>;
}

/// Progress callback that logs through tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgress;

impl ProgressCallback for LoggingProgress {
    fn notify(&self, phase_index: usize, message: &str) -> Result<()> {
        tracing::info!(phase = phase_index, "{}", message);
        Ok(())
    }
}
