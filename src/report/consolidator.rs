//! Final report consolidation.
//!
//! The report-generation collaborator is resolved like any phase. When it
//! is missing or every candidate fails, a basic structured summary is
//! built locally. Either way the degradation summary is computed here, so
//! callers can always tell real data from substitutes.

use crate::analysis::{collected_data, generate_summary_text, summarize_degradation};
use crate::models::{ConsolidatedAnalysis, FinalReport, ReportStatus};
use crate::pipeline::RunContext;
use crate::resolver::{FallbackResolver, ResolveRequest};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;

/// Collaborator that formats the final report.
pub const REPORT_COLLABORATOR: &str = "enhanced_report";

/// Candidate operations of the report collaborator, in priority order.
pub const REPORT_CANDIDATES: &[&str] = &[
    "generate_report",
    "create_report",
    "build_report",
    "generate_enhanced_report",
    "create_enhanced_report",
    "process_report",
    "compile_report",
];

/// Generator name recorded when the basic summary is used.
pub const BASIC_GENERATOR: &str = "basic_fallback";

pub struct ReportConsolidator {
    resolver: FallbackResolver,
}

impl ReportConsolidator {
    pub fn new(resolver: FallbackResolver) -> Self {
        Self { resolver }
    }

    pub async fn consolidate(&self, analysis: ConsolidatedAnalysis, ctx: &RunContext) -> FinalReport {
        let degradation = summarize_degradation(analysis.outputs.values());

        let request = ResolveRequest {
            step: "report",
            args: json!({
                "analysis": analysis.to_value(),
                "session_id": analysis.session_id,
            }),
            result_key: "report",
            fallback: basic_summary(&analysis),
        };

        let handle = self.resolver.registry().get(REPORT_COLLABORATOR);
        let resolution = self
            .resolver
            .resolve(handle, REPORT_CANDIDATES, &request, ctx)
            .await;

        let (status, report_generator) = match (&resolution.source, resolution.is_real()) {
            (Some(source), true) => (ReportStatus::Generated, source.clone()),
            _ => (ReportStatus::Basic, BASIC_GENERATOR.to_string()),
        };

        info!(
            session = %analysis.session_id,
            generator = %report_generator,
            real = degradation.phases_with_real_data,
            total = degradation.phases_total,
            "Report consolidated"
        );

        FinalReport {
            status,
            session_id: analysis.session_id.clone(),
            generated_at: Utc::now(),
            report_generator,
            degradation,
            content: Value::Object(resolution.data),
            analysis,
        }
    }
}

/// Locally built summary used when no report collaborator answers.
pub fn basic_summary(analysis: &ConsolidatedAnalysis) -> Map<String, Value> {
    let degradation = summarize_degradation(analysis.outputs.values());
    let components: Vec<Value> = analysis
        .ordered()
        .map(|o| {
            json!({
                "phase": o.phase.key(),
                "status": o.status,
                "real_data": o.status.is_real(),
            })
        })
        .collect();

    let summary = json!({
        "status": "basic",
        "session_id": analysis.session_id,
        "resumo_executivo": generate_summary_text(&degradation),
        "componentes_analisados": components,
        "dados_coletados": collected_data(analysis),
        "report_generator": BASIC_GENERATOR,
    });

    match summary {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
