//! Data models for the research orchestrator.
//!
//! This module contains the core data structures that flow through the
//! pipeline: request parameters, per-phase outputs, the consolidated
//! analysis and the final report handed back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One step of the fixed analysis sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    WebResearch,
    SocialAnalysis,
    Avatar,
    MentalDrivers,
    VisualProofs,
    AntiObjection,
    PrePitch,
    FuturePredictions,
    Competition,
    Insights,
    Keywords,
    SalesFunnel,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 12] = [
        Phase::WebResearch,
        Phase::SocialAnalysis,
        Phase::Avatar,
        Phase::MentalDrivers,
        Phase::VisualProofs,
        Phase::AntiObjection,
        Phase::PrePitch,
        Phase::FuturePredictions,
        Phase::Competition,
        Phase::Insights,
        Phase::Keywords,
        Phase::SalesFunnel,
    ];

    /// 1-based position in the pipeline.
    pub fn index(self) -> usize {
        Phase::ALL
            .iter()
            .position(|p| *p == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Key used in the consolidated analysis and in session bookkeeping.
    pub fn key(self) -> &'static str {
        match self {
            Phase::WebResearch => "web_research",
            Phase::SocialAnalysis => "social_analysis",
            Phase::Avatar => "avatar",
            Phase::MentalDrivers => "mental_drivers",
            Phase::VisualProofs => "visual_proofs",
            Phase::AntiObjection => "anti_objection",
            Phase::PrePitch => "pre_pitch",
            Phase::FuturePredictions => "future_predictions",
            Phase::Competition => "competition",
            Phase::Insights => "insights",
            Phase::Keywords => "keywords",
            Phase::SalesFunnel => "sales_funnel",
        }
    }

    /// Short message passed to the progress callback before the phase starts.
    pub fn description(self) -> &'static str {
        match self {
            Phase::WebResearch => "Running massive web research",
            Phase::SocialAnalysis => "Analyzing social networks",
            Phase::Avatar => "Building the detailed customer avatar",
            Phase::MentalDrivers => "Generating custom mental drivers",
            Phase::VisualProofs => "Creating visual proofs",
            Phase::AntiObjection => "Developing the anti-objection system",
            Phase::PrePitch => "Constructing the invisible pre-pitch",
            Phase::FuturePredictions => "Generating future predictions",
            Phase::Competition => "Analyzing the competition",
            Phase::Insights => "Extracting exclusive insights",
            Phase::Keywords => "Identifying strategic keywords",
            Phase::SalesFunnel => "Optimizing the sales funnel",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Outcome discriminant of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// A collaborator produced real data.
    Success,
    /// Collaborator present but every candidate failed.
    Fallback,
    /// Collaborator absent.
    Unavailable,
    /// The phase's own logic failed.
    Error,
}

impl PhaseStatus {
    /// Whether the output carries data produced by a real collaborator.
    pub fn is_real(self) -> bool {
        self == PhaseStatus::Success
    }

    pub fn emoji(self) -> &'static str {
        match self {
            PhaseStatus::Success => "✅",
            PhaseStatus::Fallback => "🟡",
            PhaseStatus::Unavailable => "⚪",
            PhaseStatus::Error => "🔴",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Success => write!(f, "success"),
            PhaseStatus::Fallback => write!(f, "fallback"),
            PhaseStatus::Unavailable => write!(f, "unavailable"),
            PhaseStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of one phase. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Collaborator (and operation) that produced the data, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Phase-specific fields.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PhaseOutput {
    pub fn new(phase: Phase, status: PhaseStatus, data: Map<String, Value>) -> Self {
        Self {
            phase,
            status,
            source: None,
            error: None,
            data,
        }
    }

    pub fn success(phase: Phase, source: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(phase, PhaseStatus::Success, data)
        }
    }

    /// An `error` output that still carries the phase's fallback fields.
    pub fn error(phase: Phase, reason: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(phase, PhaseStatus::Error, data)
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Length of the array stored under `key`, 0 when missing.
    pub fn count(&self, key: &str) -> usize {
        self.data
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Unsigned integer stored under `key`, 0 when missing.
    pub fn number(&self, key: &str) -> u64 {
        self.data.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    /// Whether `key` holds a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        self.data.get(key).map(is_truthy).unwrap_or(false)
    }
}

/// Truthiness of a collaborator result: `null`, `false`, `0`, `""`, `[]`
/// and `{}` are all empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Caller-supplied request parameters (e.g. `segmento`, `produto`, `query`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResearchRequest(pub Map<String, Value>);

impl ResearchRequest {
    /// Keys of which at least one must be present for a run to start.
    pub const SUBJECT_KEYS: [&'static str; 3] = ["segmento", "produto", "query"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String value of `key`, trimmed; empty string when missing.
    pub fn text(&self, key: &str) -> String {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// String value of `key`, or `default` when missing or blank.
    pub fn text_or(&self, key: &str, default: &str) -> String {
        let value = self.text(key);
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    }

    /// Query used for web research.
    pub fn search_query(&self) -> String {
        let query = self.text("query");
        if !query.is_empty() {
            return query;
        }
        format!(
            "mercado {} {} Brasil",
            self.text("segmento"),
            self.text("produto")
        )
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Query used for social analysis.
    pub fn social_query(&self) -> String {
        format!("{} {}", self.text("segmento"), self.text("produto"))
            .trim()
            .to_string()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Aggregate of every phase output plus the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedAnalysis {
    pub session_id: String,
    pub request: ResearchRequest,
    pub outputs: BTreeMap<Phase, PhaseOutput>,
}

impl ConsolidatedAnalysis {
    pub fn output(&self, phase: Phase) -> Option<&PhaseOutput> {
        self.outputs.get(&phase)
    }

    /// Outputs in pipeline order.
    pub fn ordered(&self) -> impl Iterator<Item = &PhaseOutput> {
        Phase::ALL.iter().filter_map(move |p| self.outputs.get(p))
    }

    /// JSON view handed to report-generation collaborators.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("session_id".to_string(), Value::from(self.session_id.clone()));
        map.insert("request".to_string(), self.request.to_value());
        for output in self.ordered() {
            map.insert(
                output.phase.key().to_string(),
                serde_json::to_value(output).unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }
}

/// How much real versus substitute data a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationSummary {
    pub phases_total: usize,
    pub phases_with_real_data: usize,
    pub phases_fallback: usize,
    pub phases_unavailable: usize,
    pub phases_error: usize,
    /// Status per phase key, in pipeline order.
    pub phase_statuses: Vec<(String, PhaseStatus)>,
}

impl DegradationSummary {
    pub fn fully_degraded(&self) -> bool {
        self.phases_with_real_data == 0
    }

    pub fn fully_real(&self) -> bool {
        self.phases_total > 0 && self.phases_with_real_data == self.phases_total
    }
}

/// How the final report was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Produced by the report-generation collaborator.
    Generated,
    /// Basic structured summary built locally.
    Basic,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Generated => write!(f, "generated"),
            ReportStatus::Basic => write!(f, "basic"),
        }
    }
}

/// The consolidated report returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub status: ReportStatus,
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    /// Which generator produced `content`.
    pub report_generator: String,
    pub degradation: DegradationSummary,
    pub content: Value,
    pub analysis: ConsolidatedAnalysis,
}

/// Outcome of a top-level run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub components_executed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FinalReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failed(session_id: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: session_id.to_string(),
            execution_time: None,
            components_executed: 0,
            report: None,
            error: Some(error.into()),
        }
    }
}
