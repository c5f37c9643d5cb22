//! Collaborator health reporting.
//!
//! Classifies the registry into critical and optional collaborators and
//! derives an overall health level from how many of each are available.

use crate::error::OrchestratorError;
use crate::registry::CollaboratorRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collaborators without which a run is not meaningful.
pub const CRITICAL_COLLABORATORS: &[&str] = &["ai_manager", "persistence"];

/// Collaborators whose absence only degrades a run.
pub const OPTIONAL_COLLABORATORS: &[&str] = &[
    "search_coordinator",
    "websailor",
    "supadata",
    "mental_drivers",
    "visual_proofs",
    "anti_objection",
    "pre_pitch",
    "future_prediction",
    "enhanced_report",
];

/// Share of optional collaborators that must be available to stay healthy.
pub const OPTIONAL_HEALTHY_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "healthy"),
            HealthLevel::Degraded => write!(f, "degraded"),
            HealthLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Status of one collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorHealth {
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthLevel,
    pub critical: Vec<CollaboratorHealth>,
    pub optional: Vec<CollaboratorHealth>,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.overall == HealthLevel::Healthy
    }
}

/// Checks a registry against the critical and optional collaborator lists.
pub struct HealthChecker<'a> {
    registry: &'a CollaboratorRegistry,
}

impl<'a> HealthChecker<'a> {
    pub fn new(registry: &'a CollaboratorRegistry) -> Self {
        Self { registry }
    }

    pub fn check(&self) -> HealthReport {
        let critical: Vec<_> = CRITICAL_COLLABORATORS
            .iter()
            .map(|name| self.inspect(name))
            .collect();
        let optional: Vec<_> = OPTIONAL_COLLABORATORS
            .iter()
            .map(|name| self.inspect(name))
            .collect();

        let critical_ok = critical.iter().all(|c| c.available);
        let optional_ok = optional.iter().filter(|c| c.available).count();

        let mut recommendations = Vec::new();
        let overall = if !critical_ok {
            recommendations
                .push("Critical collaborators are down; reports will contain no generated content".to_string());
            HealthLevel::Critical
        } else if (optional_ok as f64) < optional.len() as f64 * OPTIONAL_HEALTHY_RATIO {
            recommendations
                .push("Many optional collaborators are unavailable; functionality is limited".to_string());
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };

        if !self.registry.is_available("search_coordinator") || !self.registry.is_available("supadata") {
            recommendations.push("Set the web-data API key to enable web and social research".to_string());
        }

        HealthReport {
            overall,
            critical,
            optional,
            recommendations,
        }
    }

    fn inspect(&self, name: &str) -> CollaboratorHealth {
        match self.registry.get(name) {
            Some(handle) if handle.available => CollaboratorHealth {
                name: name.to_string(),
                available: true,
                error: None,
            },
            Some(handle) => CollaboratorHealth {
                name: name.to_string(),
                available: false,
                error: Some(match handle.unavailable_reason {
                    Some(ref reason) => format!(
                        "{}: {}",
                        OrchestratorError::CollaboratorUnavailable(name.to_string()),
                        reason
                    ),
                    None => OrchestratorError::CollaboratorUnavailable(name.to_string()).to_string(),
                }),
            },
            None => CollaboratorHealth {
                name: name.to_string(),
                available: false,
                error: Some("not registered".to_string()),
            },
        }
    }
}

/// Plain-text rendering of a health report.
pub fn generate_health_report(report: &HealthReport) -> String {
    let rule = "=".repeat(60);
    let mut lines = Vec::new();

    lines.push(rule.clone());
    lines.push("MARKETSCOPE HEALTH REPORT".to_string());
    lines.push(rule.clone());
    lines.push(format!("Overall: {}", report.overall.to_string().to_uppercase()));
    lines.push(String::new());

    lines.push("CRITICAL COLLABORATORS:".to_string());
    for c in &report.critical {
        let icon = if c.available { "✅" } else { "❌" };
        lines.push(format!("  {} {}", icon, c.name));
        if let Some(ref error) = c.error {
            lines.push(format!("      Error: {}", error));
        }
    }
    lines.push(String::new());

    lines.push("OPTIONAL COLLABORATORS:".to_string());
    for c in &report.optional {
        let icon = if c.available { "✅" } else { "⚠️" };
        lines.push(format!("  {} {}", icon, c.name));
    }

    if !report.recommendations.is_empty() {
        lines.push(String::new());
        lines.push("RECOMMENDATIONS:".to_string());
        for rec in &report.recommendations {
            lines.push(format!("  • {}", rec));
        }
    }

    lines.push(String::new());
    lines.push(rule);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Capability;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    struct Stub;

    #[async_trait]
    impl Capability for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn operations(&self) -> &[&'static str] {
            &[]
        }

        async fn invoke(&self, _operation: &str, _args: &Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn registry(available: &[&str]) -> CollaboratorRegistry {
        let mut registry = CollaboratorRegistry::new();
        for name in available {
            registry.insert(name, Arc::new(Stub));
        }
        registry
    }

    #[test]
    fn test_missing_critical_is_critical() {
        let mut registry = registry(&["persistence"]);
        registry.register_absent("ai_manager", "ollama not reachable");

        let report = HealthChecker::new(&registry).check();

        assert_eq!(report.overall, HealthLevel::Critical);
        let ai = &report.critical[0];
        assert!(!ai.available);
        assert!(ai.error.as_deref().unwrap().contains("ollama not reachable"));
    }

    #[test]
    fn test_few_optionals_is_degraded() {
        let report = HealthChecker::new(&registry(&["ai_manager", "persistence", "supadata"])).check();
        assert_eq!(report.overall, HealthLevel::Degraded);
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn test_threshold_is_seventy_percent() {
        // 7 of 9 optional collaborators is above 70%.
        let mut names = vec!["ai_manager", "persistence"];
        names.extend_from_slice(&OPTIONAL_COLLABORATORS[..7]);

        let report = HealthChecker::new(&registry(&names)).check();
        assert_eq!(report.overall, HealthLevel::Healthy);

        // 6 of 9 is below.
        names.pop();
        let report = HealthChecker::new(&registry(&names)).check();
        assert_eq!(report.overall, HealthLevel::Degraded);
    }

    #[test]
    fn test_text_rendering() {
        let mut registry = registry(&["ai_manager"]);
        registry.register_absent("persistence", "disk full");

        let text = generate_health_report(&HealthChecker::new(&registry).check());

        assert!(text.contains("Overall: CRITICAL"));
        assert!(text.contains("❌ persistence"));
        assert!(text.contains("disk full"));
        assert!(text.contains("RECOMMENDATIONS:"));
    }
}
