//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::ResearchRequest;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

/// MarketScope - market research pipeline over optional AI services
///
/// Runs a fixed sequence of analysis phases (web research, social analysis,
/// avatar, mental drivers, ... sales funnel) and writes one consolidated
/// report, even when some services are missing.
///
/// Examples:
///   marketscope --segment fitness --product "workout app"
///   marketscope --query "mercado de cafés especiais" --format json
///   marketscope --segment saas --param publico=b2b --fail-on-degraded
///   marketscope --health
///   marketscope --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Market segment to research
    #[arg(short, long, value_name = "SEGMENT")]
    pub segment: Option<String>,

    /// Product or service being positioned
    #[arg(short, long, value_name = "PRODUCT")]
    pub product: Option<String>,

    /// Explicit web search query
    ///
    /// Defaults to a query built from segment and product.
    #[arg(long, value_name = "QUERY")]
    pub query: Option<String>,

    /// Extra request parameter (repeatable)
    ///
    /// Values that parse as JSON (numbers, booleans) keep their type.
    /// Example: --param publico=b2b --param budget=5000
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Session identifier (a UUID is generated when omitted)
    #[arg(long, value_name = "ID")]
    pub session_id: Option<String>,

    /// Output file path for the report
    ///
    /// Defaults to the [general] output setting.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .marketscope.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Ollama model used by the content services
    #[arg(short, long, env = "MARKETSCOPE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Per-operation timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory for JSONL step logs
    #[arg(long, value_name = "DIR")]
    pub persistence_dir: Option<PathBuf>,

    /// Include every phase payload in the Markdown report
    #[arg(long)]
    pub include_payloads: bool,

    /// Print collaborator health and exit
    #[arg(long)]
    pub health: bool,

    /// Exit with code 2 when no phase produced real data
    #[arg(long)]
    pub fail_on_degraded: bool,

    /// Generate a default .marketscope.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref id) = self.session_id {
            if id.trim().is_empty() {
                return Err("Session id must not be blank".to_string());
            }
        }

        for param in &self.params {
            split_param(param)?;
        }

        if self.health {
            return Ok(());
        }

        let has_subject = [&self.segment, &self.product, &self.query]
            .iter()
            .any(|v| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false));
        if !has_subject && self.params.is_empty() {
            return Err("Provide at least one of --segment, --product, --query or --param".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Build the request parameters. `--param` entries come first so the
    /// dedicated flags win on conflicting keys.
    pub fn request(&self) -> ResearchRequest {
        let mut request = ResearchRequest::new();

        for param in &self.params {
            if let Ok((key, value)) = split_param(param) {
                let value = serde_json::from_str::<Value>(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                request = request.with(key, value);
            }
        }

        for (key, value) in [
            ("segmento", &self.segment),
            ("produto", &self.product),
            ("query", &self.query),
        ] {
            if let Some(value) = value {
                request = request.with(key, value.as_str());
            }
        }

        request
    }
}

fn split_param(param: &str) -> Result<(&str, &str), String> {
    match param.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => Err(format!("Invalid --param '{}', expected KEY=VALUE", param)),
    }
}
