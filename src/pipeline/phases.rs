//! The twelve analysis phases.
//!
//! A phase only describes *what* to ask: which upstream outputs it reads,
//! which collaborators and operations to try, the arguments to send and
//! the deterministic substitute when nothing answers. The pipeline does
//! the asking.

use crate::models::{Phase, PhaseOutput, ResearchRequest};
use crate::resolver::ChainLink;
use anyhow::Result;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Results requested per social platform.
pub const SOCIAL_RESULTS_PER_PLATFORM: usize = 15;

/// Web results forwarded to content generators.
const MAX_FORWARDED_RESULTS: usize = 20;

/// Read-only view of what a phase declared in [`AnalysisPhase::consumes`].
///
/// Outputs of phases outside that list are not reachable from here.
pub struct PhaseInputs<'a> {
    pub session_id: &'a str,
    pub request: &'a ResearchRequest,
    pub social_results_per_platform: usize,
    outputs: BTreeMap<Phase, &'a PhaseOutput>,
}

impl<'a> PhaseInputs<'a> {
    pub fn new(
        session_id: &'a str,
        request: &'a ResearchRequest,
        outputs: &'a BTreeMap<Phase, PhaseOutput>,
        consumes: &[Phase],
    ) -> Self {
        Self {
            session_id,
            request,
            social_results_per_platform: SOCIAL_RESULTS_PER_PLATFORM,
            outputs: consumes
                .iter()
                .filter_map(|phase| outputs.get(phase).map(|o| (*phase, o)))
                .collect(),
        }
    }

    pub fn with_social_results_per_platform(mut self, limit: usize) -> Self {
        self.social_results_per_platform = limit;
        self
    }

    /// Declared upstream output, if it has run.
    pub fn output(&self, phase: Phase) -> Option<&'a PhaseOutput> {
        self.outputs.get(&phase).copied()
    }

    /// Upstream output that must already exist.
    pub fn require(&self, phase: Phase) -> Result<&'a PhaseOutput> {
        self.output(phase)
            .ok_or_else(|| anyhow::anyhow!("upstream output '{}' is missing", phase))
    }

    fn count(&self, phase: Phase, key: &str) -> usize {
        self.output(phase).map(|o| o.count(key)).unwrap_or(0)
    }

    fn number(&self, phase: Phase, key: &str) -> u64 {
        self.output(phase).map(|o| o.number(key)).unwrap_or(0)
    }

    fn has(&self, phase: Phase, key: &str) -> bool {
        self.output(phase).map(|o| o.has(key)).unwrap_or(false)
    }

    fn data(&self, phase: Phase) -> Value {
        self.output(phase)
            .map(|o| Value::Object(o.data.clone()))
            .unwrap_or_else(|| json!({}))
    }

    fn web_sources(&self) -> usize {
        self.count(Phase::WebResearch, "processed_results")
    }

    fn social_posts(&self) -> u64 {
        self.number(Phase::SocialAnalysis, "total_posts")
    }

    fn segment(&self) -> String {
        self.request.text("segmento")
    }

    fn product(&self) -> String {
        self.request.text("produto")
    }
}

/// Contract of a single analysis phase.
pub trait AnalysisPhase: Send + Sync {
    fn phase(&self) -> Phase;

    /// Upstream phases whose outputs this phase reads.
    fn consumes(&self) -> &'static [Phase];

    /// Collaborators and candidate operations, in priority order.
    fn chain(&self) -> &'static [ChainLink];

    /// Key under which a non-object collaborator result is stored.
    fn result_key(&self) -> &'static str;

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value>;

    /// Substitute data; must depend on the inputs only.
    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value>;

    /// Normalize the resolved output.
    fn finish(&self, output: PhaseOutput, _inputs: &PhaseInputs<'_>) -> PhaseOutput {
        output
    }
}

/// All phases in execution order.
pub fn all_phases() -> Vec<Box<dyn AnalysisPhase>> {
    vec![
        Box::new(WebResearchPhase),
        Box::new(SocialAnalysisPhase),
        Box::new(AvatarPhase),
        Box::new(MentalDriversPhase),
        Box::new(VisualProofsPhase),
        Box::new(AntiObjectionPhase),
        Box::new(PrePitchPhase),
        Box::new(FuturePredictionsPhase),
        Box::new(CompetitionPhase),
        Box::new(InsightsPhase),
        Box::new(KeywordsPhase),
        Box::new(SalesFunnelPhase),
    ]
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Insert `key` only when the collaborator did not provide it.
fn ensure(output: &mut PhaseOutput, key: &str, value: Value) {
    output.data.entry(key.to_string()).or_insert(value);
}

fn forwarded_results(inputs: &PhaseInputs<'_>) -> Value {
    let results = inputs
        .output(Phase::WebResearch)
        .and_then(|o| o.get("processed_results"))
        .and_then(Value::as_array)
        .map(|r| r.iter().take(MAX_FORWARDED_RESULTS).cloned().collect())
        .unwrap_or_default();
    Value::Array(results)
}

// ---------------------------------------------------------------------------
// 1. Web research
// ---------------------------------------------------------------------------

pub struct WebResearchPhase;

impl AnalysisPhase for WebResearchPhase {
    fn phase(&self) -> Phase {
        Phase::WebResearch
    }

    fn consumes(&self) -> &'static [Phase] {
        &[]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[
            ChainLink::new("websailor", &["navigate_and_research_deep"]),
            ChainLink::new("search_coordinator", &["perform_search", "search"]),
        ];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "processed_results"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        Ok(json!({
            "query": inputs.request.search_query(),
            "segmento": inputs.segment(),
            "produto": inputs.product(),
            "session_id": inputs.session_id,
            "max_pages": 20,
            "depth_levels": 3,
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "processed_results": [],
            "source": "fallback_basic",
            "query": inputs.request.search_query(),
        }))
    }

    fn finish(&self, mut output: PhaseOutput, _inputs: &PhaseInputs<'_>) -> PhaseOutput {
        if !output.data.contains_key("processed_results") {
            let results = ["results", "data"]
                .iter()
                .find_map(|k| output.get(k).filter(|v| v.is_array()).cloned())
                .unwrap_or_else(|| json!([]));
            output.data.insert("processed_results".to_string(), results);
        }
        output
    }
}

// ---------------------------------------------------------------------------
// 2. Social analysis
// ---------------------------------------------------------------------------

pub struct SocialAnalysisPhase;

impl AnalysisPhase for SocialAnalysisPhase {
    fn phase(&self) -> Phase {
        Phase::SocialAnalysis
    }

    fn consumes(&self) -> &'static [Phase] {
        &[]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new("supadata", &["search_all_platforms"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "platforms_data"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        Ok(json!({
            "query": inputs.request.social_query(),
            "max_results_per_platform": inputs.social_results_per_platform,
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "total_posts": 0,
            "platforms_data": {},
            "query": inputs.request.social_query(),
        }))
    }

    fn finish(&self, mut output: PhaseOutput, _inputs: &PhaseInputs<'_>) -> PhaseOutput {
        if !output.data.contains_key("total_posts") {
            let total = if output.get("all_posts").is_some() {
                output.count("all_posts")
            } else {
                output
                    .get("platforms_data")
                    .and_then(Value::as_object)
                    .map(|platforms| {
                        platforms
                            .values()
                            .map(|p| p.get("count").and_then(Value::as_u64).unwrap_or(0) as usize)
                            .sum()
                    })
                    .unwrap_or(0)
            };
            output.data.insert("total_posts".to_string(), json!(total));
        }
        output
    }
}

// ---------------------------------------------------------------------------
// 3. Avatar synthesis
// ---------------------------------------------------------------------------

pub struct AvatarPhase;

impl AnalysisPhase for AvatarPhase {
    fn phase(&self) -> Phase {
        Phase::Avatar
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::WebResearch, Phase::SocialAnalysis]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] =
            &[ChainLink::new("ai_manager", &["synthesize_avatar", "create_avatar"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "avatar"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        let social = inputs.require(Phase::SocialAnalysis)?;
        inputs.require(Phase::WebResearch)?;
        Ok(json!({
            "segmento": inputs.segment(),
            "produto": inputs.product(),
            "projeto": inputs.request.to_value(),
            "web_results": forwarded_results(inputs),
            "social_summary": {
                "total_posts": social.number("total_posts"),
                "platforms_data": social.get("platforms_data").cloned().unwrap_or_else(|| json!({})),
            },
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "nome_ficticio": format!("Avatar {}", inputs.request.text_or("segmento", "Profissional")),
            "dores_viscerais_unificadas": ["Lack of time", "Difficulty deciding"],
            "desejos_secretos_unificados": ["Recognition", "Stability"],
            "objecoes_principais": ["High price", "Lack of trust"],
            "fonte_dados": {
                "data_real": false,
                "web_sources": inputs.web_sources(),
                "social_posts": inputs.social_posts(),
            },
        }))
    }

    fn finish(&self, mut output: PhaseOutput, inputs: &PhaseInputs<'_>) -> PhaseOutput {
        let real = output.status.is_real();
        ensure(
            &mut output,
            "fonte_dados",
            json!({
                "data_real": real,
                "web_sources": inputs.web_sources(),
                "social_posts": inputs.social_posts(),
            }),
        );
        output
    }
}

// ---------------------------------------------------------------------------
// 4. Mental drivers
// ---------------------------------------------------------------------------

pub struct MentalDriversPhase;

impl AnalysisPhase for MentalDriversPhase {
    fn phase(&self) -> Phase {
        Phase::MentalDrivers
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::Avatar, Phase::WebResearch]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new(
            "mental_drivers",
            &["create_complete_mental_drivers_system", "generate_drivers"],
        )];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "drivers_customizados"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        let avatar = inputs.require(Phase::Avatar)?;
        inputs.require(Phase::WebResearch)?;
        Ok(json!({
            "avatar_data": avatar.data,
            "context_data": {
                "segmento": inputs.segment(),
                "produto": inputs.product(),
                "session_id": inputs.session_id,
            },
            "web_results": forwarded_results(inputs),
        }))
    }

    fn fallback(&self, _inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({ "drivers_customizados": [] }))
    }
}

// ---------------------------------------------------------------------------
// 5. Visual proofs
// ---------------------------------------------------------------------------

pub struct VisualProofsPhase;

impl AnalysisPhase for VisualProofsPhase {
    fn phase(&self) -> Phase {
        Phase::VisualProofs
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::MentalDrivers]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new(
            "visual_proofs",
            &[
                "generate_visual_proofs",
                "create_proofs",
                "generate_proofs",
                "create_visual_proofs",
                "build_proofs",
            ],
        )];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "proofs"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::MentalDrivers)?;
        Ok(json!({
            "drivers": inputs.data(Phase::MentalDrivers),
            "segmento": inputs.segment(),
            "produto": inputs.product(),
            "session_id": inputs.session_id,
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "proofs": [{
                "tipo": "estatistica",
                "titulo": format!("Data about {}", inputs.request.text_or("segmento", "the market")),
                "descricao": format!(
                    "Analysis based on the drivers for {}",
                    inputs.request.text_or("produto", "the product")
                ),
                "fonte": "Internal analysis",
            }]
        }))
    }
}

// ---------------------------------------------------------------------------
// 6. Anti-objection system
// ---------------------------------------------------------------------------

pub struct AntiObjectionPhase;

impl AnalysisPhase for AntiObjectionPhase {
    fn phase(&self) -> Phase {
        Phase::AntiObjection
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::MentalDrivers, Phase::Avatar]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new(
            "anti_objection",
            &[
                "create_anti_objection_system",
                "create_system",
                "generate_system",
                "build_system",
                "create_anti_objection",
                "generate_anti_objection_system",
                "process_objections",
            ],
        )];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "sistema_anti_objecao"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::MentalDrivers)?;
        inputs.require(Phase::Avatar)?;
        Ok(json!({
            "avatar": inputs.data(Phase::Avatar),
            "produto": inputs.product(),
            "drivers": inputs.data(Phase::MentalDrivers),
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        let objections: Vec<String> = inputs
            .output(Phase::Avatar)
            .and_then(|a| a.get("objecoes_principais"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec!["High price".to_string(), "Lack of trust".to_string()]);

        let answers: Vec<String> = objections
            .iter()
            .map(|o| format!("Answer for: {}", o))
            .collect();

        object(json!({
            "sistema_anti_objecao": {
                "objecoes_mapeadas": objections,
                "respostas_preparadas": answers,
                "estrategias": ["Value demonstration", "Social proof", "Guarantees"],
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// 7. Pre-pitch
// ---------------------------------------------------------------------------

pub struct PrePitchPhase;

impl AnalysisPhase for PrePitchPhase {
    fn phase(&self) -> Phase {
        Phase::PrePitch
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::MentalDrivers, Phase::AntiObjection]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] =
            &[ChainLink::new("pre_pitch", &["create_system", "create_pre_pitch"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "sequencias_pre_pitch"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::MentalDrivers)?;
        inputs.require(Phase::AntiObjection)?;
        Ok(json!({
            "drivers": inputs.data(Phase::MentalDrivers),
            "anti_objection": inputs.data(Phase::AntiObjection),
            "projeto": inputs.request.to_value(),
        }))
    }

    fn fallback(&self, _inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({ "sequencias_pre_pitch": [] }))
    }
}

// ---------------------------------------------------------------------------
// 8. Future predictions
// ---------------------------------------------------------------------------

pub struct FuturePredictionsPhase;

impl AnalysisPhase for FuturePredictionsPhase {
    fn phase(&self) -> Phase {
        Phase::FuturePredictions
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::WebResearch, Phase::SocialAnalysis]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new(
            "future_prediction",
            &["create_predictions", "predict"],
        )];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "predicoes"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::WebResearch)?;
        let social = inputs.require(Phase::SocialAnalysis)?;
        Ok(json!({
            "web_data": { "processed_results": forwarded_results(inputs) },
            "social_data": {
                "total_posts": social.number("total_posts"),
                "platforms_data": social.get("platforms_data").cloned().unwrap_or_else(|| json!({})),
            },
            "session_id": inputs.session_id,
        }))
    }

    fn fallback(&self, _inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({ "predicoes": [] }))
    }
}

// ---------------------------------------------------------------------------
// 9. Competition
// ---------------------------------------------------------------------------

pub struct CompetitionPhase;

impl AnalysisPhase for CompetitionPhase {
    fn phase(&self) -> Phase {
        Phase::Competition
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::WebResearch]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new("ai_manager", &["analyze_competition"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "analise_completa"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::WebResearch)?;
        Ok(json!({
            "segmento": inputs.segment(),
            "produto": inputs.product(),
            "web_results": forwarded_results(inputs),
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "analise_completa": format!(
                "Competition analysis for {}",
                inputs.request.text_or("segmento", "the market")
            ),
            "fontes_analisadas": inputs.web_sources(),
        }))
    }

    fn finish(&self, mut output: PhaseOutput, inputs: &PhaseInputs<'_>) -> PhaseOutput {
        ensure(&mut output, "fontes_analisadas", json!(inputs.web_sources()));
        output
    }
}

// ---------------------------------------------------------------------------
// 10. Insights
// ---------------------------------------------------------------------------

pub struct InsightsPhase;

impl AnalysisPhase for InsightsPhase {
    fn phase(&self) -> Phase {
        Phase::Insights
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::WebResearch, Phase::SocialAnalysis]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new("ai_manager", &["extract_insights"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "insights_completos"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::WebResearch)?;
        inputs.require(Phase::SocialAnalysis)?;
        Ok(json!({
            "web_results": forwarded_results(inputs),
            "social_data": inputs.data(Phase::SocialAnalysis),
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "insights_completos": "Insights based on the collected data",
            "fontes_utilizadas": {
                "web_sources": inputs.web_sources(),
                "social_posts": inputs.social_posts(),
            },
        }))
    }

    fn finish(&self, mut output: PhaseOutput, inputs: &PhaseInputs<'_>) -> PhaseOutput {
        ensure(
            &mut output,
            "fontes_utilizadas",
            json!({
                "web_sources": inputs.web_sources(),
                "social_posts": inputs.social_posts(),
            }),
        );
        output
    }
}

// ---------------------------------------------------------------------------
// 11. Keywords
// ---------------------------------------------------------------------------

pub struct KeywordsPhase;

impl AnalysisPhase for KeywordsPhase {
    fn phase(&self) -> Phase {
        Phase::Keywords
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::WebResearch, Phase::Avatar]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new("ai_manager", &["analyze_keywords"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "analise_completa"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::WebResearch)?;
        inputs.require(Phase::Avatar)?;
        Ok(json!({
            "segmento": inputs.segment(),
            "produto": inputs.product(),
            "web_results": forwarded_results(inputs),
            "avatar": inputs.data(Phase::Avatar),
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "analise_completa": "Strategic keywords identified",
            "fonte_dados": {
                "web_sources_analyzed": inputs.web_sources(),
                "avatar_included": inputs.has(Phase::Avatar, "nome_ficticio"),
            },
        }))
    }

    fn finish(&self, mut output: PhaseOutput, inputs: &PhaseInputs<'_>) -> PhaseOutput {
        ensure(
            &mut output,
            "fonte_dados",
            json!({
                "web_sources_analyzed": inputs.web_sources(),
                "avatar_included": inputs.has(Phase::Avatar, "nome_ficticio"),
            }),
        );
        output
    }
}

// ---------------------------------------------------------------------------
// 12. Sales funnel
// ---------------------------------------------------------------------------

pub struct SalesFunnelPhase;

impl AnalysisPhase for SalesFunnelPhase {
    fn phase(&self) -> Phase {
        Phase::SalesFunnel
    }

    fn consumes(&self) -> &'static [Phase] {
        &[Phase::MentalDrivers, Phase::Avatar]
    }

    fn chain(&self) -> &'static [ChainLink] {
        const CHAIN: &[ChainLink] = &[ChainLink::new("ai_manager", &["optimize_sales_funnel"])];
        CHAIN
    }

    fn result_key(&self) -> &'static str {
        "funil_otimizado"
    }

    fn args(&self, inputs: &PhaseInputs<'_>) -> Result<Value> {
        inputs.require(Phase::MentalDrivers)?;
        inputs.require(Phase::Avatar)?;
        Ok(json!({
            "drivers": inputs.data(Phase::MentalDrivers),
            "avatar": inputs.data(Phase::Avatar),
            "produto": inputs.product(),
        }))
    }

    fn fallback(&self, inputs: &PhaseInputs<'_>) -> Map<String, Value> {
        object(json!({
            "funil_otimizado": "Funnel optimized from the collected data",
            "dados_base": {
                "drivers_applied": inputs.count(Phase::MentalDrivers, "drivers_customizados"),
                "avatar_based": inputs.has(Phase::Avatar, "nome_ficticio"),
            },
        }))
    }

    fn finish(&self, mut output: PhaseOutput, inputs: &PhaseInputs<'_>) -> PhaseOutput {
        ensure(
            &mut output,
            "dados_base",
            json!({
                "drivers_applied": inputs.count(Phase::MentalDrivers, "drivers_customizados"),
                "avatar_based": inputs.has(Phase::Avatar, "nome_ficticio"),
            }),
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhaseStatus;

    fn request() -> ResearchRequest {
        ResearchRequest::new()
            .with("segmento", "fitness")
            .with("produto", "app")
    }

    fn web_output(results: usize) -> PhaseOutput {
        let items: Vec<Value> = (0..results).map(|i| json!({"url": i})).collect();
        PhaseOutput::success(
            Phase::WebResearch,
            "search_coordinator.perform_search",
            object(json!({ "processed_results": items })),
        )
    }

    #[test]
    fn test_phases_are_in_pipeline_order() {
        let phases: Vec<Phase> = all_phases().iter().map(|p| p.phase()).collect();
        assert_eq!(phases, Phase::ALL.to_vec());
    }

    #[test]
    fn test_every_phase_consumes_only_earlier_phases() {
        for phase in all_phases() {
            for upstream in phase.consumes() {
                assert!(
                    upstream.index() < phase.phase().index(),
                    "{} consumes later phase {}",
                    phase.phase(),
                    upstream
                );
            }
        }
    }

    #[test]
    fn test_every_phase_has_candidates() {
        for phase in all_phases() {
            assert!(!phase.chain().is_empty());
            assert!(phase.chain().iter().all(|link| !link.operations.is_empty()));
        }
    }

    #[test]
    fn test_avatar_fallback_counts_web_sources() {
        let request = request();
        let mut outputs = BTreeMap::new();
        outputs.insert(Phase::WebResearch, web_output(5));

        let inputs = PhaseInputs::new("s", &request, &outputs, AvatarPhase.consumes());

        let fallback = AvatarPhase.fallback(&inputs);
        assert_eq!(fallback["fonte_dados"]["web_sources"], 5);
        assert_eq!(fallback["nome_ficticio"], "Avatar fitness");
    }

    #[test]
    fn test_avatar_args_require_upstream() {
        let request = request();
        let outputs = BTreeMap::new();
        let inputs = PhaseInputs::new("s", &request, &outputs, AvatarPhase.consumes());

        let err = AvatarPhase.args(&inputs).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_fallbacks_are_deterministic() {
        let request = request();
        let mut outputs = BTreeMap::new();
        outputs.insert(Phase::WebResearch, web_output(2));

        for phase in all_phases() {
            let inputs = PhaseInputs::new("s", &request, &outputs, phase.consumes());
            assert_eq!(phase.fallback(&inputs), phase.fallback(&inputs));
        }
    }

    #[test]
    fn test_anti_objection_fallback_uses_avatar_objections() {
        let request = request();
        let mut outputs = BTreeMap::new();
        outputs.insert(
            Phase::Avatar,
            PhaseOutput::success(
                Phase::Avatar,
                "ai_manager.synthesize_avatar",
                object(json!({ "objecoes_principais": ["Too complex"] })),
            ),
        );
        let inputs = PhaseInputs::new("s", &request, &outputs, AntiObjectionPhase.consumes());

        let fallback = AntiObjectionPhase.fallback(&inputs);
        let system = &fallback["sistema_anti_objecao"];
        assert_eq!(system["objecoes_mapeadas"], json!(["Too complex"]));
        assert_eq!(system["respostas_preparadas"], json!(["Answer for: Too complex"]));
    }

    #[test]
    fn test_web_finish_normalizes_results_key() {
        let request = request();
        let outputs = BTreeMap::new();
        let inputs = PhaseInputs::new("s", &request, &outputs, WebResearchPhase.consumes());

        let deep = PhaseOutput::success(
            Phase::WebResearch,
            "websailor.navigate_and_research_deep",
            object(json!({ "results": [1, 2, 3], "pages_crawled": 20 })),
        );
        let finished = WebResearchPhase.finish(deep, &inputs);
        assert_eq!(finished.count("processed_results"), 3);
    }

    #[test]
    fn test_social_finish_counts_posts() {
        let request = request();
        let outputs = BTreeMap::new();
        let inputs = PhaseInputs::new("s", &request, &outputs, SocialAnalysisPhase.consumes());

        let raw = PhaseOutput::success(
            Phase::SocialAnalysis,
            "supadata.search_all_platforms",
            object(json!({
                "platforms_data": {"youtube": {"count": 4}, "twitter": {"count": 2}}
            })),
        );
        let finished = SocialAnalysisPhase.finish(raw, &inputs);
        assert_eq!(finished.number("total_posts"), 6);
    }

    #[test]
    fn test_avatar_finish_marks_real_data() {
        let request = request();
        let mut outputs = BTreeMap::new();
        outputs.insert(Phase::WebResearch, web_output(3));
        let inputs = PhaseInputs::new("s", &request, &outputs, AvatarPhase.consumes());

        let real = PhaseOutput::success(
            Phase::Avatar,
            "ai_manager.synthesize_avatar",
            object(json!({ "nome_ficticio": "Ana" })),
        );
        let finished = AvatarPhase.finish(real, &inputs);
        assert_eq!(finished.status, PhaseStatus::Success);
        assert_eq!(finished.data["fonte_dados"]["data_real"], true);
        assert_eq!(finished.data["fonte_dados"]["web_sources"], 3);
    }

    #[test]
    fn test_undeclared_upstream_is_not_visible() {
        let request = request();
        let mut outputs = BTreeMap::new();
        outputs.insert(Phase::WebResearch, web_output(4));
        outputs.insert(
            Phase::SocialAnalysis,
            PhaseOutput::success(
                Phase::SocialAnalysis,
                "supadata.search_all_platforms",
                object(json!({ "total_posts": 7 })),
            ),
        );

        // Competition only declares web research.
        let inputs = PhaseInputs::new("s", &request, &outputs, CompetitionPhase.consumes());
        assert!(inputs.output(Phase::WebResearch).is_some());
        assert!(inputs.output(Phase::SocialAnalysis).is_none());
        assert!(inputs.require(Phase::SocialAnalysis).is_err());
        assert_eq!(inputs.social_posts(), 0);

        let inputs = PhaseInputs::new("s", &request, &outputs, InsightsPhase.consumes());
        assert_eq!(inputs.social_posts(), 7);
    }

    #[test]
    fn test_social_args_use_configured_limit() {
        let request = request();
        let outputs = BTreeMap::new();

        let inputs = PhaseInputs::new("s", &request, &outputs, SocialAnalysisPhase.consumes());
        let args = SocialAnalysisPhase.args(&inputs).unwrap();
        assert_eq!(args["max_results_per_platform"], SOCIAL_RESULTS_PER_PLATFORM);

        let inputs = inputs.with_social_results_per_platform(3);
        let args = SocialAnalysisPhase.args(&inputs).unwrap();
        assert_eq!(args["max_results_per_platform"], 3);
    }
}
