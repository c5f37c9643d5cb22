//! AI-backed content-generation modules.
//!
//! Each module is registered under its own collaborator name and exposes
//! the operations the pipeline asks for. All of them share one Ollama client.

use super::ollama::{extract_json_object, OllamaClient};
use super::Capability;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The content-generation collaborators the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentModule {
    /// General-purpose analyst (avatar, competition, insights, keywords, funnel).
    AiManager,
    MentalDrivers,
    VisualProofs,
    AntiObjection,
    PrePitch,
    FuturePrediction,
    EnhancedReport,
}

impl ContentModule {
    pub const ALL: [ContentModule; 7] = [
        ContentModule::AiManager,
        ContentModule::MentalDrivers,
        ContentModule::VisualProofs,
        ContentModule::AntiObjection,
        ContentModule::PrePitch,
        ContentModule::FuturePrediction,
        ContentModule::EnhancedReport,
    ];

    /// Registry name of the collaborator.
    pub fn collaborator_name(self) -> &'static str {
        match self {
            ContentModule::AiManager => "ai_manager",
            ContentModule::MentalDrivers => "mental_drivers",
            ContentModule::VisualProofs => "visual_proofs",
            ContentModule::AntiObjection => "anti_objection",
            ContentModule::PrePitch => "pre_pitch",
            ContentModule::FuturePrediction => "future_prediction",
            ContentModule::EnhancedReport => "enhanced_report",
        }
    }

    pub fn operations(self) -> &'static [&'static str] {
        match self {
            ContentModule::AiManager => &[
                "synthesize_avatar",
                "analyze_competition",
                "extract_insights",
                "analyze_keywords",
                "optimize_sales_funnel",
            ],
            ContentModule::MentalDrivers => &["create_complete_mental_drivers_system"],
            ContentModule::VisualProofs => &["generate_visual_proofs"],
            ContentModule::AntiObjection => &["create_anti_objection_system"],
            ContentModule::PrePitch => &["create_pre_pitch"],
            ContentModule::FuturePrediction => &["create_predictions"],
            ContentModule::EnhancedReport => &["generate_report"],
        }
    }
}

/// Fields the model must return for each operation.
fn expected_shape(operation: &str) -> &'static str {
    match operation {
        "synthesize_avatar" => {
            r#"{"nome_ficticio": string, "dores_viscerais_unificadas": [string], "desejos_secretos_unificados": [string], "objecoes_principais": [string]}"#
        }
        "analyze_competition" => {
            r#"{"analise_completa": string, "concorrentes": [{"nome": string, "forcas": [string], "fraquezas": [string]}]}"#
        }
        "extract_insights" => r#"{"insights_completos": string, "insights": [string]}"#,
        "analyze_keywords" => {
            r#"{"analise_completa": string, "palavras_chave": [{"termo": string, "intencao": string}]}"#
        }
        "optimize_sales_funnel" => {
            r#"{"funil_otimizado": string, "etapas": [{"nome": string, "acoes": [string]}]}"#
        }
        "create_complete_mental_drivers_system" => {
            r#"{"drivers_customizados": [{"nome": string, "gatilho": string, "roteiro": string}]}"#
        }
        "generate_visual_proofs" => {
            r#"{"proofs": [{"tipo": string, "titulo": string, "descricao": string, "fonte": string}]}"#
        }
        "create_anti_objection_system" => {
            r#"{"sistema_anti_objecao": {"objecoes_mapeadas": [string], "respostas_preparadas": [string], "estrategias": [string]}}"#
        }
        "create_pre_pitch" => {
            r#"{"sequencias_pre_pitch": [{"etapa": string, "mensagem": string}]}"#
        }
        "create_predictions" => {
            r#"{"predicoes": [{"horizonte": string, "tendencia": string, "probabilidade": string}]}"#
        }
        "generate_report" => {
            r#"{"resumo_executivo": string, "recomendacoes": [string], "proximos_passos": [string]}"#
        }
        _ => "{}",
    }
}

const SYSTEM_PROMPT: &str = r#"You are a senior market research analyst specialised in the Brazilian market.
You receive structured data from earlier analysis steps and produce one analysis artefact.
Answer with exactly one JSON object matching the requested shape. No prose, no markdown."#;

/// One content-generation collaborator backed by an LLM.
pub struct AiContentModule {
    module: ContentModule,
    client: Arc<OllamaClient>,
}

impl AiContentModule {
    pub fn new(module: ContentModule, client: Arc<OllamaClient>) -> Self {
        Self { module, client }
    }

    fn build_prompt(operation: &str, args: &Value) -> String {
        let input = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
        format!(
            "Task: {}\n\nRequired JSON shape:\n{}\n\n=== INPUT DATA ===\n{}\n=== END INPUT ===\n\nRespond with the JSON object only:",
            operation.replace('_', " "),
            expected_shape(operation),
            input
        )
    }
}

#[async_trait]
impl Capability for AiContentModule {
    fn name(&self) -> &str {
        self.module.collaborator_name()
    }

    fn operations(&self) -> &[&'static str] {
        self.module.operations()
    }

    async fn invoke(&self, operation: &str, args: &Value) -> Result<Value> {
        if !self.supports(operation) {
            anyhow::bail!("{} does not implement {}", self.name(), operation);
        }

        let prompt = Self::build_prompt(operation, args);
        debug!(
            collaborator = self.name(),
            operation,
            model = self.client.model(),
            "Generating content"
        );

        let reply = self.client.chat(SYSTEM_PROMPT, &prompt).await?;
        extract_json_object(&reply)
            .ok_or_else(|| anyhow::anyhow!("model reply for {} contained no JSON object", operation))
    }
}
