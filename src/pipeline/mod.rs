//! Sequential execution of the analysis phases.
//!
//! Phases run strictly in order; each one sees the outputs of the earlier
//! phases it declares. Whatever happens inside a phase, exactly one output is
//! recorded for it and the pipeline moves on.

pub mod context;
pub mod phases;

pub use context::RunContext;
pub use phases::{all_phases, AnalysisPhase, PhaseInputs, SOCIAL_RESULTS_PER_PLATFORM};

use crate::collaborators::ProgressCallback;
use crate::error::OrchestratorError;
use crate::models::{Phase, PhaseOutput, PhaseStatus};
use crate::resolver::{FallbackResolver, ResolveRequest};
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Total progress notifications per run: one per phase plus consolidation.
pub const TOTAL_STEPS: usize = Phase::ALL.len() + 1;

/// Deliver a progress notification. Callback errors and panics are logged
/// and otherwise ignored.
pub fn notify_progress(callback: Option<&dyn ProgressCallback>, step: usize, message: &str) {
    let Some(callback) = callback else {
        return;
    };

    match catch_unwind(AssertUnwindSafe(|| callback.notify(step, message))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(step, "Progress callback failed: {:#}", e),
        Err(_) => debug!(step, "Progress callback panicked"),
    }
}

/// Runs the phases of one session.
pub struct Pipeline {
    resolver: FallbackResolver,
    phases: Vec<Box<dyn AnalysisPhase>>,
    social_results_per_platform: usize,
}

impl Pipeline {
    pub fn new(resolver: FallbackResolver) -> Self {
        Self {
            resolver,
            phases: all_phases(),
            social_results_per_platform: SOCIAL_RESULTS_PER_PLATFORM,
        }
    }

    /// Posts requested per platform by the social analysis phase.
    pub fn with_social_results_per_platform(mut self, limit: usize) -> Self {
        self.social_results_per_platform = limit;
        self
    }

    /// Run every phase in order and return one output per phase.
    pub async fn run(
        &self,
        ctx: &RunContext,
        progress: Option<&dyn ProgressCallback>,
    ) -> BTreeMap<Phase, PhaseOutput> {
        let mut outputs = BTreeMap::new();

        for phase in &self.phases {
            let id = phase.phase();
            notify_progress(
                progress,
                id.index(),
                &format!("{} ({}/{})", id.description(), id.index(), TOTAL_STEPS),
            );

            let output = self.run_phase(phase.as_ref(), ctx, &outputs).await;

            info!(
                session = %ctx.session_id,
                phase = %id,
                status = %output.status,
                "{} Phase finished",
                output.status.emoji()
            );

            if output.status == PhaseStatus::Error {
                let reason = output.error.clone().unwrap_or_default();
                ctx.note_error(id.key(), &reason);
            }
            ctx.note_component(id.key());
            ctx.persist_step(
                id.key(),
                &serde_json::to_value(&output).unwrap_or(Value::Null),
            );

            outputs.insert(id, output);
        }

        outputs
    }

    async fn run_phase(
        &self,
        phase: &dyn AnalysisPhase,
        ctx: &RunContext,
        outputs: &BTreeMap<Phase, PhaseOutput>,
    ) -> PhaseOutput {
        let id = phase.phase();
        let inputs = PhaseInputs::new(&ctx.session_id, &ctx.request, outputs, phase.consumes())
            .with_social_results_per_platform(self.social_results_per_platform);

        let fallback = match catch_unwind(AssertUnwindSafe(|| phase.fallback(&inputs))) {
            Ok(fallback) => fallback,
            Err(_) => {
                return phase_failed(id, "fallback construction panicked", Default::default())
            }
        };

        let args = match guarded(|| phase.args(&inputs)) {
            Ok(args) => args,
            Err(e) => return phase_failed(id, &format!("{:#}", e), fallback),
        };

        let request = ResolveRequest {
            step: id.key(),
            args,
            result_key: phase.result_key(),
            fallback: fallback.clone(),
        };
        let resolved = self
            .resolver
            .resolve_chain(phase.chain(), &request, ctx)
            .await
            .into_output(id);

        match catch_unwind(AssertUnwindSafe(|| phase.finish(resolved, &inputs))) {
            Ok(output) => output,
            Err(_) => phase_failed(id, "post-processing panicked", fallback),
        }
    }
}

/// Run fallible phase logic, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("phase logic panicked")),
    }
}

fn phase_failed(
    phase: Phase,
    reason: &str,
    fallback: serde_json::Map<String, Value>,
) -> PhaseOutput {
    let err = OrchestratorError::PhaseFailed {
        phase: phase.key().to_string(),
        reason: reason.to_string(),
    };
    error!("{}", err);
    PhaseOutput::error(phase, err.to_string(), fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Capability, NoopSink};
    use crate::models::ResearchRequest;
    use crate::registry::CollaboratorRegistry;
    use crate::resolver::ChainLink;
    use crate::session::SessionTracker;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::{Arc, Mutex};

    struct Search;

    #[async_trait]
    impl Capability for Search {
        fn name(&self) -> &str {
            "search"
        }

        fn operations(&self) -> &[&'static str] {
            &["perform_search"]
        }

        async fn invoke(&self, _operation: &str, args: &Value) -> Result<Value> {
            let results: Vec<Value> = (0..5)
                .map(|i| json!({"url": format!("https://example.com/{}", i), "query": args["query"]}))
                .collect();
            Ok(Value::Array(results))
        }
    }

    fn context(sessions: Arc<SessionTracker>) -> RunContext {
        sessions.begin("run").unwrap();
        RunContext::new(
            "run",
            ResearchRequest::new()
                .with("segmento", "fitness")
                .with("produto", "app"),
            3,
            None,
            sessions,
            Arc::new(NoopSink),
        )
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<usize>>);

    impl ProgressCallback for Recorder {
        fn notify(&self, step: usize, _message: &str) -> Result<()> {
            self.0.lock().unwrap().push(step);
            Ok(())
        }
    }

    struct Exploding;

    impl ProgressCallback for Exploding {
        fn notify(&self, _step: usize, _message: &str) -> Result<()> {
            panic!("callback bug");
        }
    }

    #[tokio::test]
    async fn test_every_phase_produces_one_output() {
        let pipeline = Pipeline::new(FallbackResolver::new(Arc::new(CollaboratorRegistry::new())));
        let sessions = Arc::new(SessionTracker::default());
        let ctx = context(Arc::clone(&sessions));

        let outputs = pipeline.run(&ctx, None).await;

        assert_eq!(outputs.len(), 12);
        assert!(outputs
            .values()
            .all(|o| o.status == PhaseStatus::Unavailable));
        assert_eq!(sessions.snapshot("run").unwrap().components_completed.len(), 12);
    }

    #[tokio::test]
    async fn test_web_results_flow_into_avatar() {
        let mut registry = CollaboratorRegistry::new();
        registry.insert("search_coordinator", Arc::new(Search));
        let pipeline = Pipeline::new(FallbackResolver::new(Arc::new(registry)));
        let ctx = context(Arc::new(SessionTracker::default()));

        let outputs = pipeline.run(&ctx, None).await;

        let web = &outputs[&Phase::WebResearch];
        assert_eq!(web.status, PhaseStatus::Success);
        assert_eq!(web.count("processed_results"), 5);

        let avatar = &outputs[&Phase::Avatar];
        assert_eq!(avatar.status, PhaseStatus::Unavailable);
        assert_eq!(avatar.data["fonte_dados"]["web_sources"], 5);
        assert_eq!(outputs[&Phase::Competition].data["fontes_analisadas"], 5);
    }

    #[tokio::test]
    async fn test_callbacks_fire_before_each_phase() {
        let pipeline = Pipeline::new(FallbackResolver::new(Arc::new(CollaboratorRegistry::new())));
        let ctx = context(Arc::new(SessionTracker::default()));
        let recorder = Recorder::default();

        pipeline.run(&ctx, Some(&recorder)).await;

        let steps = recorder.0.lock().unwrap().clone();
        assert_eq!(steps, (1..=12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_callback_is_ignored() {
        let pipeline = Pipeline::new(FallbackResolver::new(Arc::new(CollaboratorRegistry::new())));
        let ctx = context(Arc::new(SessionTracker::default()));

        let outputs = pipeline.run(&ctx, Some(&Exploding)).await;
        assert_eq!(outputs.len(), 12);
    }

    struct Broken;

    impl AnalysisPhase for Broken {
        fn phase(&self) -> Phase {
            Phase::Insights
        }

        fn consumes(&self) -> &'static [Phase] {
            &[]
        }

        fn chain(&self) -> &'static [ChainLink] {
            const CHAIN: &[ChainLink] = &[ChainLink::new("ai_manager", &["extract_insights"])];
            CHAIN
        }

        fn result_key(&self) -> &'static str {
            "insights_completos"
        }

        fn args(&self, _inputs: &PhaseInputs<'_>) -> Result<Value> {
            anyhow::bail!("malformed upstream data")
        }

        fn fallback(&self, _inputs: &PhaseInputs<'_>) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("insights_completos".into(), json!("basic"));
            map
        }
    }

    #[tokio::test]
    async fn test_phase_logic_error_degrades_to_error_output() {
        let pipeline = Pipeline {
            resolver: FallbackResolver::new(Arc::new(CollaboratorRegistry::new())),
            phases: vec![Box::new(Broken)],
            social_results_per_platform: SOCIAL_RESULTS_PER_PLATFORM,
        };
        let sessions = Arc::new(SessionTracker::default());
        let ctx = context(Arc::clone(&sessions));

        let outputs = pipeline.run(&ctx, None).await;

        let output = &outputs[&Phase::Insights];
        assert_eq!(output.status, PhaseStatus::Error);
        assert_eq!(output.data["insights_completos"], "basic");
        assert!(output.error.as_deref().unwrap().contains("malformed upstream data"));

        let state = sessions.snapshot("run").unwrap();
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].starts_with("insights:"));
    }

    /// Reads web research without declaring it.
    struct Undeclared;

    impl AnalysisPhase for Undeclared {
        fn phase(&self) -> Phase {
            Phase::Competition
        }

        fn consumes(&self) -> &'static [Phase] {
            &[]
        }

        fn chain(&self) -> &'static [ChainLink] {
            const CHAIN: &[ChainLink] = &[ChainLink::new("ai_manager", &["analyze_competition"])];
            CHAIN
        }

        fn result_key(&self) -> &'static str {
            "analise_competitiva"
        }

        fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
            let web = inputs.require(Phase::WebResearch)?;
            Ok(json!({ "web_results": web.get("processed_results") }))
        }

        fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert(
                "web_visible".into(),
                json!(inputs.output(Phase::WebResearch).is_some()),
            );
            map
        }
    }

    #[tokio::test]
    async fn test_phase_only_sees_declared_upstreams() {
        let mut registry = CollaboratorRegistry::new();
        registry.insert("search_coordinator", Arc::new(Search));
        let pipeline = Pipeline {
            resolver: FallbackResolver::new(Arc::new(registry)),
            phases: vec![Box::new(phases::WebResearchPhase), Box::new(Undeclared)],
            social_results_per_platform: SOCIAL_RESULTS_PER_PLATFORM,
        };
        let ctx = context(Arc::new(SessionTracker::default()));

        let outputs = pipeline.run(&ctx, None).await;

        assert_eq!(outputs[&Phase::WebResearch].status, PhaseStatus::Success);
        let output = &outputs[&Phase::Competition];
        assert_eq!(output.status, PhaseStatus::Error);
        assert_eq!(output.data["web_visible"], false);
        assert!(output.error.as_deref().unwrap().contains("web_research"));
    }
}
