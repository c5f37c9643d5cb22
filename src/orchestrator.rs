//! Top-level entry point of the engine.
//!
//! One `Orchestrator` serves any number of concurrent sessions. Each call
//! to [`Orchestrator::execute`] gets its own [`RunContext`]; the only state
//! shared between runs is the session tracker.

use crate::collaborators::{NoopSink, PersistenceSink, ProgressCallback};
use crate::error::OrchestratorError;
use crate::guard::DEFAULT_MAX_DEPTH;
use crate::models::{ConsolidatedAnalysis, ExecutionResult, FinalReport, ResearchRequest};
use crate::pipeline::{
    notify_progress, Pipeline, RunContext, SOCIAL_RESULTS_PER_PLATFORM, TOTAL_STEPS,
};
use crate::registry::CollaboratorRegistry;
use crate::report::ReportConsolidator;
use crate::resolver::FallbackResolver;
use crate::session::{ProgressRecord, SessionState, SessionTracker, DEFAULT_TOTAL_ESTIMATE};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default deadline for a single collaborator operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Engine settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_recursion_depth: usize,
    /// Expected duration of a full run, used for progress estimation.
    pub progress_estimate: Duration,
    pub operation_timeout: Option<Duration>,
    /// Posts requested per platform by the social analysis phase.
    pub social_results_per_platform: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_DEPTH,
            progress_estimate: DEFAULT_TOTAL_ESTIMATE,
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            social_results_per_platform: SOCIAL_RESULTS_PER_PLATFORM,
        }
    }
}

pub struct Orchestrator {
    registry: Arc<CollaboratorRegistry>,
    pipeline: Pipeline,
    consolidator: ReportConsolidator,
    sessions: Arc<SessionTracker>,
    sink: Arc<dyn PersistenceSink>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<CollaboratorRegistry>, config: OrchestratorConfig) -> Self {
        let resolver = FallbackResolver::new(Arc::clone(&registry));
        Self {
            pipeline: Pipeline::new(resolver.clone())
                .with_social_results_per_platform(config.social_results_per_platform),
            consolidator: ReportConsolidator::new(resolver),
            sessions: Arc::new(SessionTracker::new(config.progress_estimate)),
            sink: Arc::new(NoopSink),
            registry,
            config,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &CollaboratorRegistry {
        &self.registry
    }

    /// Run the whole pipeline for `session_id`.
    ///
    /// Only invalid requests, a session id that is already running, and
    /// errors escaping the pipeline produce `success: false`. Degraded
    /// phases never do.
    pub async fn execute(
        &self,
        request: ResearchRequest,
        session_id: &str,
        progress: Option<&dyn ProgressCallback>,
    ) -> ExecutionResult {
        if let Err(e) = validate_request(&request) {
            warn!(session = %session_id, "{}", e);
            return ExecutionResult::failed(session_id, e.to_string());
        }

        if let Err(e) = self.sessions.begin(session_id) {
            warn!(session = %session_id, "{}", e);
            return ExecutionResult::failed(session_id, e.to_string());
        }

        info!(session = %session_id, "🚀 Starting market analysis");
        let started = Instant::now();

        let ctx = RunContext::new(
            session_id,
            request,
            self.config.max_recursion_depth,
            self.config.operation_timeout,
            Arc::clone(&self.sessions),
            Arc::clone(&self.sink),
        );

        let outcome = AssertUnwindSafe(self.run(&ctx, progress))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed().as_secs_f64();
        let components_executed = self
            .sessions
            .snapshot(session_id)
            .map(|s| s.components_completed.len())
            .unwrap_or(0);

        match outcome {
            Ok(report) => {
                self.sessions.complete(session_id, elapsed);
                ctx.persist_step(
                    "final_report",
                    &serde_json::to_value(&report).unwrap_or(Value::Null),
                );
                info!(
                    session = %session_id,
                    real = report.degradation.phases_with_real_data,
                    total = report.degradation.phases_total,
                    "✅ Analysis completed in {:.1}s",
                    elapsed
                );

                ExecutionResult {
                    success: true,
                    session_id: session_id.to_string(),
                    execution_time: Some(elapsed),
                    components_executed,
                    report: Some(report),
                    error: None,
                }
            }
            Err(_) => {
                let err = OrchestratorError::RunFailed("pipeline panicked".to_string());
                error!(session = %session_id, "{}", err);
                self.sessions.fail(session_id, &err.to_string());
                if let Err(e) = self.sink.record_error(session_id, "run", &err.to_string()) {
                    tracing::debug!("Ignoring persistence failure: {:#}", e);
                }

                ExecutionResult {
                    success: false,
                    session_id: session_id.to_string(),
                    execution_time: Some(elapsed),
                    components_executed,
                    report: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn run(&self, ctx: &RunContext, progress: Option<&dyn ProgressCallback>) -> FinalReport {
        let outputs = self.pipeline.run(ctx, progress).await;

        notify_progress(
            progress,
            TOTAL_STEPS,
            &format!("Consolidating final report ({}/{})", TOTAL_STEPS, TOTAL_STEPS),
        );

        let analysis = ConsolidatedAnalysis {
            session_id: ctx.session_id.clone(),
            request: ctx.request.clone(),
            outputs,
        };
        self.consolidator.consolidate(analysis, ctx).await
    }

    /// Progress of a session, `None` when the id is unknown.
    pub fn progress(&self, session_id: &str) -> Option<ProgressRecord> {
        self.sessions.progress(session_id)
    }

    pub fn session(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.snapshot(session_id)
    }
}

/// A request needs at least one non-blank subject key.
pub fn validate_request(request: &ResearchRequest) -> Result<(), OrchestratorError> {
    if request.is_empty() {
        return Err(OrchestratorError::InvalidRequest(
            "request parameters are empty".to_string(),
        ));
    }

    let has_subject = ResearchRequest::SUBJECT_KEYS
        .iter()
        .any(|key| !request.text(key).is_empty());
    if !has_subject {
        return Err(OrchestratorError::InvalidRequest(format!(
            "one of {} must be a non-empty string",
            ResearchRequest::SUBJECT_KEYS.join(", ")
        )));
    }

    Ok(())
}
