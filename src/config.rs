//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.marketscope.toml` files.

use crate::collaborators::{OllamaConfig, WebDataConfig};
use crate::orchestrator::OrchestratorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".marketscope.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Web and social data settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Orchestration engine settings.
    #[serde(default)]
    pub orchestrator: EngineConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "marketscope_report.md".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_model_timeout() -> u64 {
    300
}

/// Web-data API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum web results per search.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Social posts kept per platform.
    #[serde(default = "default_max_results_per_platform")]
    pub max_results_per_platform: usize,

    /// Social platforms to query.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_results: default_max_results(),
            max_results_per_platform: default_max_results_per_platform(),
            platforms: default_platforms(),
            timeout_seconds: default_search_timeout(),
        }
    }
}

fn default_base_url() -> String {
    WebDataConfig::default().base_url
}

fn default_api_key_env() -> String {
    "BRIGHTDATA_API_KEY".to_string()
}

fn default_max_results() -> usize {
    50
}

fn default_max_results_per_platform() -> usize {
    15
}

fn default_platforms() -> Vec<String> {
    WebDataConfig::default().platforms
}

fn default_search_timeout() -> u64 {
    45
}

/// Orchestration engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nesting limit per operation id.
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,

    /// Expected duration of a full run, for progress estimation.
    #[serde(default = "default_progress_estimate")]
    pub progress_estimate_seconds: u64,

    /// Deadline for one collaborator operation; 0 disables it.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_seconds: u64,

    /// Directory for JSONL step logs. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: default_max_recursion_depth(),
            progress_estimate_seconds: default_progress_estimate(),
            operation_timeout_seconds: default_operation_timeout(),
            persistence_dir: None,
        }
    }
}

fn default_max_recursion_depth() -> usize {
    3
}

fn default_progress_estimate() -> u64 {
    600
}

fn default_operation_timeout() -> u64 {
    300
}

/// Report generation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include every phase payload in the Markdown report.
    #[serde(default)]
    pub include_payloads: bool,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.orchestrator.operation_timeout_seconds = timeout;
        }
        if let Some(ref dir) = args.persistence_dir {
            self.orchestrator.persistence_dir = Some(dir.clone());
        }
        if args.include_payloads {
            self.report.include_payloads = true;
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            url: self.model.ollama_url.clone(),
            model: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    /// Web-data settings; the API key is read from the configured variable.
    pub fn web_data_config(&self) -> WebDataConfig {
        WebDataConfig {
            base_url: self.search.base_url.clone(),
            api_key: std::env::var(&self.search.api_key_env).ok(),
            max_results: self.search.max_results,
            max_results_per_platform: self.search.max_results_per_platform,
            platforms: self.search.platforms.clone(),
            timeout_seconds: self.search.timeout_seconds,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let timeout = self.orchestrator.operation_timeout_seconds;
        OrchestratorConfig {
            max_recursion_depth: self.orchestrator.max_recursion_depth,
            progress_estimate: Duration::from_secs(self.orchestrator.progress_estimate_seconds),
            operation_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            social_results_per_platform: self.search.max_results_per_platform,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
