//! Per-run execution context.

use crate::collaborators::PersistenceSink;
use crate::guard::RecursionGuard;
use crate::models::ResearchRequest;
use crate::session::SessionTracker;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// State owned by a single top-level run.
///
/// The recursion guard lives here rather than on the orchestrator, so a
/// fresh, empty depth map exists for every run by construction.
pub struct RunContext {
    pub session_id: String,
    pub request: ResearchRequest,
    pub guard: RecursionGuard,
    pub operation_timeout: Option<Duration>,
    sessions: Arc<SessionTracker>,
    sink: Arc<dyn PersistenceSink>,
}

impl RunContext {
    pub fn new(
        session_id: &str,
        request: ResearchRequest,
        max_recursion_depth: usize,
        operation_timeout: Option<Duration>,
        sessions: Arc<SessionTracker>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            request,
            guard: RecursionGuard::new(max_recursion_depth),
            operation_timeout,
            sessions,
            sink,
        }
    }

    pub fn note_recursion_prevented(&self) {
        self.sessions.record_recursion_prevented(&self.session_id);
    }

    pub fn note_component(&self, component: &str) {
        self.sessions.record_component(&self.session_id, component);
    }

    pub fn note_error(&self, step: &str, error: &str) {
        self.sessions
            .record_error(&self.session_id, &format!("{}: {}", step, error));
        if let Err(e) = self.sink.record_error(&self.session_id, step, error) {
            debug!("Ignoring persistence failure: {:#}", e);
        }
    }

    pub fn persist_step(&self, step: &str, data: &Value) {
        if let Err(e) = self.sink.record_step(&self.session_id, step, data) {
            debug!("Ignoring persistence failure: {:#}", e);
        }
    }
}
