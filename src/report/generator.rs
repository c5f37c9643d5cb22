//! Markdown and JSON rendering of a run.
//!
//! This module turns an `ExecutionResult` into the document the CLI writes
//! to disk.

use crate::analysis::{collected_data, generate_summary_text, group_by_status};
use crate::models::{DegradationSummary, ExecutionResult, FinalReport, PhaseOutput, PhaseStatus};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(result: &ExecutionResult, include_payloads: bool) -> String {
    let mut output = String::new();

    output.push_str("# MarketScope Report\n\n");
    output.push_str(&generate_metadata_section(result));

    match result.report {
        Some(ref report) => {
            output.push_str(&generate_summary_section(&report.degradation));
            output.push_str(&generate_phases_section(report));
            output.push_str(&generate_collected_section(report));
            output.push_str(&generate_content_section(report));
            if include_payloads {
                output.push_str(&generate_payloads_section(report));
            }
        }
        None => output.push_str(&generate_failure_section(result)),
    }

    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(result: &ExecutionResult) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Session:** `{}`\n", result.session_id));
    section.push_str(&format!(
        "- **Outcome:** {}\n",
        if result.success { "✅ success" } else { "❌ failed" }
    ));

    if let Some(ref report) = result.report {
        section.push_str(&format!(
            "- **Generated:** {}\n",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        section.push_str(&format!(
            "- **Report:** {} (`{}`)\n",
            report.status, report.report_generator
        ));
    }
    if let Some(seconds) = result.execution_time {
        section.push_str(&format!("- **Execution Time:** {:.1}s\n", seconds));
    }
    section.push_str(&format!(
        "- **Components Executed:** {}\n",
        result.components_executed
    ));
    section.push('\n');

    section
}

fn generate_summary_section(summary: &DegradationSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    if summary.fully_degraded() {
        section.push_str("> ⚠️ No phase produced real data; every section below is a substitute.\n\n");
    } else if summary.fully_real() {
        section.push_str("> All phases produced real data.\n\n");
    }

    section.push_str(&format!(
        "| {} Real | {} Fallback | {} Unavailable | {} Error | **Total** |\n",
        PhaseStatus::Success.emoji(),
        PhaseStatus::Fallback.emoji(),
        PhaseStatus::Unavailable.emoji(),
        PhaseStatus::Error.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.phases_with_real_data,
        summary.phases_fallback,
        summary.phases_unavailable,
        summary.phases_error,
        summary.phases_total
    ));

    section
}

fn generate_phases_section(report: &FinalReport) -> String {
    let mut section = String::new();

    section.push_str("## Phases\n\n");
    section.push_str("| # | Phase | Status | Source |\n");
    section.push_str("|:---:|:---|:---|:---|\n");

    for output in report.analysis.ordered() {
        section.push_str(&format!(
            "| {} | {} | {} {} | {} |\n",
            output.phase.index(),
            output.phase.description(),
            output.status.emoji(),
            output.status,
            phase_source(output)
        ));
    }
    section.push('\n');

    let grouped = group_by_status(report.analysis.outputs.values());
    for status in [PhaseStatus::Fallback, PhaseStatus::Unavailable, PhaseStatus::Error] {
        if let Some(phases) = grouped.get(&status) {
            let keys: Vec<&str> = phases.iter().map(|p| p.key()).collect();
            section.push_str(&format!("- **{}:** {}\n", status, keys.join(", ")));
        }
    }
    if grouped.keys().any(|s| !s.is_real()) {
        section.push('\n');
    }

    section
}

fn phase_source(output: &PhaseOutput) -> String {
    match (&output.source, &output.error) {
        (Some(source), _) => format!("`{}`", source),
        (None, Some(error)) => error.replace('|', "\\|"),
        (None, None) => "-".to_string(),
    }
}

fn generate_collected_section(report: &FinalReport) -> String {
    let mut section = String::new();

    section.push_str("## Collected Data\n\n");
    section.push_str("| Item | Value |\n");
    section.push_str("|:---|:---:|\n");

    if let Value::Object(items) = collected_data(&report.analysis) {
        for (key, value) in items {
            section.push_str(&format!("| {} | {} |\n", key, value));
        }
    }
    section.push('\n');

    section
}

fn generate_content_section(report: &FinalReport) -> String {
    let mut section = String::new();

    section.push_str("## Report\n\n");

    let summary = report
        .content
        .get("resumo_executivo")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| generate_summary_text(&report.degradation));
    section.push_str(&summary);
    section.push_str("\n\n");

    if let Ok(json) = serde_json::to_string_pretty(&report.content) {
        section.push_str("<details>\n<summary>Report content</summary>\n\n```json\n");
        section.push_str(&json);
        section.push_str("\n```\n</details>\n\n");
    }

    section
}

fn generate_payloads_section(report: &FinalReport) -> String {
    let mut section = String::new();

    section.push_str("## Phase Payloads\n\n");

    for output in report.analysis.ordered() {
        section.push_str(&format!(
            "### {}. {}\n\n",
            output.phase.index(),
            output.phase.description()
        ));
        match serde_json::to_string_pretty(&output.data) {
            Ok(json) => {
                section.push_str("```json\n");
                section.push_str(&json);
                section.push_str("\n```\n\n");
            }
            Err(_) => section.push_str("*Payload could not be rendered.*\n\n"),
        }
    }

    section
}

fn generate_failure_section(result: &ExecutionResult) -> String {
    let mut section = String::new();

    section.push_str("## Error\n\n");
    section.push_str(result.error.as_deref().unwrap_or("Unknown error"));
    section.push_str("\n\n");

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by MarketScope*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(result: &ExecutionResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(Into::into)
}

/// Write rendered report content to `path`.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize_degradation;
    use crate::models::{ConsolidatedAnalysis, Phase, ReportStatus, ResearchRequest};
    use chrono::Utc;
    use serde_json::{json, Map};
    use std::collections::BTreeMap;

    fn create_test_result() -> ExecutionResult {
        let mut outputs = BTreeMap::new();
        let mut web = Map::new();
        web.insert("processed_results".into(), json!([{"url": "https://a"}]));
        outputs.insert(
            Phase::WebResearch,
            PhaseOutput::success(Phase::WebResearch, "search_coordinator.perform_search", web),
        );
        outputs.insert(
            Phase::Avatar,
            PhaseOutput::error(Phase::Avatar, "phase 'avatar' failed: bad | data", Map::new()),
        );
        outputs.insert(
            Phase::SocialAnalysis,
            PhaseOutput::new(Phase::SocialAnalysis, PhaseStatus::Unavailable, Map::new()),
        );

        let analysis = ConsolidatedAnalysis {
            session_id: "s-1".to_string(),
            request: ResearchRequest::new().with("segmento", "fitness"),
            outputs,
        };

        ExecutionResult {
            success: true,
            session_id: "s-1".to_string(),
            execution_time: Some(3.25),
            components_executed: 3,
            report: Some(FinalReport {
                status: ReportStatus::Basic,
                session_id: "s-1".to_string(),
                generated_at: Utc::now(),
                report_generator: "basic_fallback".to_string(),
                degradation: summarize_degradation(analysis.outputs.values()),
                content: json!({"status": "basic", "resumo_executivo": "One real phase."}),
                analysis,
            }),
            error: None,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_result(), false);

        assert!(markdown.contains("# MarketScope Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("## Phases"));
        assert!(markdown.contains("`search_coordinator.perform_search`"));
        assert!(markdown.contains("One real phase."));
        assert!(markdown.contains("bad \\| data"));
        assert!(!markdown.contains("## Phase Payloads"));
    }

    #[test]
    fn test_payloads_are_optional() {
        let markdown = generate_markdown_report(&create_test_result(), true);
        assert!(markdown.contains("## Phase Payloads"));
        assert!(markdown.contains("processed_results"));
    }

    #[test]
    fn test_failed_run() {
        let result = ExecutionResult::failed("s-2", "invalid request: no subject");
        let markdown = generate_markdown_report(&result, false);

        assert!(markdown.contains("❌ failed"));
        assert!(markdown.contains("## Error"));
        assert!(markdown.contains("no subject"));
        assert!(!markdown.contains("## Phases"));
    }

    #[test]
    fn test_summary_flags_full_degradation() {
        let summary = DegradationSummary {
            phases_total: 12,
            phases_unavailable: 12,
            ..Default::default()
        };
        assert!(generate_summary_section(&summary).contains("No phase produced real data"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_result()).unwrap();

        assert!(json.contains("\"success\": true"));
        assert!(json.contains("\"degradation\""));
        assert!(json.contains("\"web_research\""));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report("# hi\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# hi\n");
    }
}
