//! MarketScope - fault-tolerant market research orchestrator
//!
//! A CLI tool that runs a fixed pipeline of analysis phases over optional
//! AI and web-data services and produces one consolidated report, even
//! when some of those services are missing or failing.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, invalid request, failed run, critical health)
//!   2 - Every phase degraded and --fail-on-degraded is set

mod analysis;
mod cli;
mod collaborators;
mod config;
mod error;
mod guard;
mod health;
mod models;
mod orchestrator;
mod pipeline;
mod registry;
mod report;
mod resolver;
mod session;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use collaborators::{
    AiContentModule, Capability, ContentModule, JsonlSink, LoggingProgress, NoopSink,
    OllamaClient, PersistenceSink, ProgressCallback, SinkCapability, WebDataClient,
};
use config::{Config, CONFIG_FILE};
use health::{generate_health_report, HealthChecker, HealthLevel};
use indicatif::{ProgressBar, ProgressStyle};
use orchestrator::Orchestrator;
use pipeline::TOTAL_STEPS;
use registry::CollaboratorRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("MarketScope v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .marketscope.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the model, web-data API and engine limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the requested command. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let sink = build_sink(&config);
    let registry = Arc::new(build_registry(&config, sink.clone()).await);

    if args.health {
        return handle_health(&registry);
    }

    let orchestrator = Orchestrator::new(registry, config.orchestrator_config()).with_sink(sink);

    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    println!("🔬 Starting market analysis");
    println!("   Session: {}", session_id);
    println!(
        "   Collaborators available: {}/{}",
        orchestrator.registry().available_count(),
        orchestrator.registry().len()
    );
    println!("   Model: {}", config.model.name);

    let bar = progress_bar(&args);
    let callback: Option<&dyn ProgressCallback> = if args.quiet {
        None
    } else if args.verbose {
        Some(&LoggingProgress)
    } else {
        bar.as_ref().map(|b| b as &dyn ProgressCallback)
    };

    let result = orchestrator
        .execute(args.request(), &session_id, callback)
        .await;

    if let Some(ref bar) = bar {
        bar.finish();
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.general.output));
    let content = match args.format {
        OutputFormat::Json => report::generate_json_report(&result)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&result, config.report.include_payloads)
        }
    };
    report::write_report(&content, &output_path)?;

    if !result.success {
        eprintln!(
            "\n❌ Analysis failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        return Ok(1);
    }

    let degradation = result
        .report
        .as_ref()
        .map(|r| r.degradation.clone())
        .unwrap_or_default();

    println!("\n📊 Analysis Summary:");
    println!(
        "   Phases with real data: {}/{}",
        degradation.phases_with_real_data, degradation.phases_total
    );
    println!(
        "   - 🔄 Fallback: {} | ⛔ Unavailable: {} | ❌ Error: {}",
        degradation.phases_fallback, degradation.phases_unavailable, degradation.phases_error
    );
    if let Some(seconds) = result.execution_time {
        println!("   Duration: {:.1}s", seconds);
    }
    if let Some(progress) = orchestrator.progress(&session_id) {
        println!(
            "   Started: {}",
            progress.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("   Status: {}", progress.label);
    }
    if let Some(state) = orchestrator.session(&session_id) {
        if !state.errors.is_empty() {
            println!("   Phase errors: {}", state.errors.len());
        }
        if state.recursion_prevented > 0 {
            println!("   Recursion prevented: {}", state.recursion_prevented);
        }
    }
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    if args.fail_on_degraded && degradation.fully_degraded() {
        eprintln!("\n⛔ No phase produced real data. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Handle --health: print the collaborator report.
fn handle_health(registry: &CollaboratorRegistry) -> Result<i32> {
    let report = HealthChecker::new(registry).check();
    println!("{}", generate_health_report(&report));

    if report.is_healthy() {
        println!("\n✅ All collaborators healthy.");
    }

    Ok(if report.overall == HealthLevel::Critical { 1 } else { 0 })
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// JSONL sink when a persistence directory is configured, otherwise no-op.
fn build_sink(config: &Config) -> Arc<dyn PersistenceSink> {
    match config.orchestrator.persistence_dir {
        Some(ref dir) => match JsonlSink::new(dir) {
            Ok(sink) => {
                info!("Persisting steps under {}", sink.root().display());
                Arc::new(sink)
            }
            Err(e) => {
                warn!("Persistence disabled: {:#}", e);
                Arc::new(NoopSink)
            }
        },
        None => Arc::new(NoopSink),
    }
}

/// Probe every collaborator once. Failures only mark it unavailable.
async fn build_registry(config: &Config, sink: Arc<dyn PersistenceSink>) -> CollaboratorRegistry {
    let mut registry = CollaboratorRegistry::new();

    // Content services share one Ollama client.
    let ollama = match OllamaClient::new(config.ollama_config()) {
        Ok(client) => match client.ping().await {
            Ok(()) => Ok(Arc::new(client)),
            Err(e) => Err(format!("{:#}", e)),
        },
        Err(e) => Err(format!("{:#}", e)),
    };

    for module in ContentModule::ALL {
        let client = ollama.clone();
        registry
            .register(module.collaborator_name(), async move {
                let client = client.map_err(anyhow::Error::msg)?;
                Ok::<_, anyhow::Error>(Arc::new(AiContentModule::new(module, client)) as Arc<dyn Capability>)
            })
            .await;
    }

    // Web search and social search share one web-data client.
    let web_data = WebDataClient::new(config.web_data_config())
        .map(Arc::new)
        .map_err(|e| format!("{:#}", e));

    for name in ["search_coordinator", "supadata"] {
        let client = web_data.clone();
        registry
            .register(name, async move {
                let client = client.map_err(anyhow::Error::msg)?;
                Ok::<_, anyhow::Error>(client as Arc<dyn Capability>)
            })
            .await;
    }

    registry.register_absent("websailor", "deep crawler is not configured");
    registry.insert("persistence", Arc::new(SinkCapability::new(sink)));

    for handle in registry.handles() {
        debug!(
            collaborator = %handle.name,
            available = handle.available,
            "Registered collaborator"
        );
    }

    registry
}

/// Progress bar for the default (non-verbose, non-quiet) mode.
fn progress_bar(args: &Args) -> Option<BarProgress> {
    if args.quiet || args.verbose {
        return None;
    }

    let bar = ProgressBar::new(TOTAL_STEPS as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    Some(BarProgress { bar })
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn notify(&self, phase_index: usize, message: &str) -> Result<()> {
        self.bar.set_position(phase_index as u64);
        self.bar.set_message(message.to_string());
        Ok(())
    }
}
