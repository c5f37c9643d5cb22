//! Phase output aggregation and statistics.
//!
//! This module provides utilities for summarizing the outputs of a run:
//! how many phases produced real data, how many degraded, and what was
//! collected along the way.

use crate::models::{ConsolidatedAnalysis, DegradationSummary, Phase, PhaseOutput, PhaseStatus};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Build the degradation summary from phase outputs (any order).
pub fn summarize_degradation<'a, I>(outputs: I) -> DegradationSummary
where
    I: IntoIterator<Item = &'a PhaseOutput>,
{
    let mut ordered: Vec<&PhaseOutput> = outputs.into_iter().collect();
    ordered.sort_by_key(|o| o.phase);

    let mut summary = DegradationSummary {
        phases_total: ordered.len(),
        ..Default::default()
    };

    for output in ordered {
        match output.status {
            PhaseStatus::Success => summary.phases_with_real_data += 1,
            PhaseStatus::Fallback => summary.phases_fallback += 1,
            PhaseStatus::Unavailable => summary.phases_unavailable += 1,
            PhaseStatus::Error => summary.phases_error += 1,
        }
        summary
            .phase_statuses
            .push((output.phase.key().to_string(), output.status));
    }

    summary
}

/// Group phases by status.
pub fn group_by_status<'a, I>(outputs: I) -> HashMap<PhaseStatus, Vec<Phase>>
where
    I: IntoIterator<Item = &'a PhaseOutput>,
{
    let mut grouped: HashMap<PhaseStatus, Vec<Phase>> = HashMap::new();

    for output in outputs {
        grouped.entry(output.status).or_default().push(output.phase);
    }

    for phases in grouped.values_mut() {
        phases.sort();
    }

    grouped
}

/// Counts of what the run actually collected, for the basic report.
pub fn collected_data(analysis: &ConsolidatedAnalysis) -> Value {
    let count = |phase: Phase, key: &str| {
        analysis
            .output(phase)
            .map(|o| o.count(key))
            .unwrap_or(0)
    };
    let has = |phase: Phase, key: &str| {
        analysis
            .output(phase)
            .map(|o| o.has(key))
            .unwrap_or(false)
    };

    json!({
        "web_sources": count(Phase::WebResearch, "processed_results"),
        "social_posts": analysis
            .output(Phase::SocialAnalysis)
            .map(|o| o.number("total_posts"))
            .unwrap_or(0),
        "avatar_created": has(Phase::Avatar, "nome_ficticio"),
        "drivers_generated": count(Phase::MentalDrivers, "drivers_customizados"),
        "visual_proofs": count(Phase::VisualProofs, "proofs"),
        "anti_objection_system": has(Phase::AntiObjection, "sistema_anti_objecao"),
        "funnel_optimized": has(Phase::SalesFunnel, "funil_otimizado"),
    })
}

/// Generate a text summary of the degradation statistics.
pub fn generate_summary_text(summary: &DegradationSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Phases with real data: {}/{}",
        summary.phases_with_real_data, summary.phases_total
    ));
    lines.push(format!(
        "- {} Fallback: {}",
        PhaseStatus::Fallback.emoji(),
        summary.phases_fallback
    ));
    lines.push(format!(
        "- {} Unavailable: {}",
        PhaseStatus::Unavailable.emoji(),
        summary.phases_unavailable
    ));
    lines.push(format!(
        "- {} Error: {}",
        PhaseStatus::Error.emoji(),
        summary.phases_error
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResearchRequest;
    use serde_json::Map;
    use std::collections::BTreeMap;

    fn output(phase: Phase, status: PhaseStatus) -> PhaseOutput {
        PhaseOutput::new(phase, status, Map::new())
    }

    #[test]
    fn test_summarize_degradation() {
        let outputs = vec![
            output(Phase::Avatar, PhaseStatus::Fallback),
            output(Phase::WebResearch, PhaseStatus::Success),
            output(Phase::SocialAnalysis, PhaseStatus::Unavailable),
            output(Phase::MentalDrivers, PhaseStatus::Error),
        ];

        let summary = summarize_degradation(&outputs);

        assert_eq!(summary.phases_total, 4);
        assert_eq!(summary.phases_with_real_data, 1);
        assert_eq!(summary.phases_fallback, 1);
        assert_eq!(summary.phases_unavailable, 1);
        assert_eq!(summary.phases_error, 1);
        assert_eq!(summary.phase_statuses[0].0, "web_research");
        assert_eq!(summary.phase_statuses[3].0, "mental_drivers");
        assert!(!summary.fully_degraded());
    }

    #[test]
    fn test_group_by_status() {
        let outputs = vec![
            output(Phase::Keywords, PhaseStatus::Unavailable),
            output(Phase::Avatar, PhaseStatus::Unavailable),
            output(Phase::WebResearch, PhaseStatus::Success),
        ];

        let grouped = group_by_status(&outputs);

        assert_eq!(
            grouped.get(&PhaseStatus::Unavailable),
            Some(&vec![Phase::Avatar, Phase::Keywords])
        );
        assert_eq!(grouped.get(&PhaseStatus::Success).map(Vec::len), Some(1));
    }

    #[test]
    fn test_collected_data() {
        let mut web = Map::new();
        web.insert("processed_results".into(), json!([{}, {}]));
        let mut social = Map::new();
        social.insert("total_posts".into(), json!(9));

        let mut outputs = BTreeMap::new();
        outputs.insert(
            Phase::WebResearch,
            PhaseOutput::success(Phase::WebResearch, "search", web),
        );
        outputs.insert(
            Phase::SocialAnalysis,
            PhaseOutput::success(Phase::SocialAnalysis, "social", social),
        );

        let analysis = ConsolidatedAnalysis {
            session_id: "s".into(),
            request: ResearchRequest::new(),
            outputs,
        };

        let data = collected_data(&analysis);
        assert_eq!(data["web_sources"], 2);
        assert_eq!(data["social_posts"], 9);
        assert_eq!(data["avatar_created"], false);
    }

    #[test]
    fn test_summary_text() {
        let summary = DegradationSummary {
            phases_total: 12,
            phases_with_real_data: 3,
            ..Default::default()
        };
        let text = generate_summary_text(&summary);
        assert!(text.contains("3/12"));
    }
}
