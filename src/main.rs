//! LeadPulse - Lead engagement timeline and sales summary engine
//!
//! Command-line wrapper around the library: summarize a record bundle,
//! validate summary HTML, or print the default configuration.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use leadpulse::{
    config::{LeadPulseConfig, RulesConfig, TimelinePolicy},
    engine::SummaryEngine,
    summary::OutputGuard,
    timeline::{SourceCapabilities, SourceQuery, SourceRecords},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "leadpulse")]
#[command(version)]
#[command(about = "Lead engagement timeline and sales summary engine")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LEADPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a JSON record bundle and print the outcome as JSON
    Summarize {
        /// Record bundle (JSON)
        #[arg(short, long)]
        bundle: PathBuf,

        /// Product-interest rule document (JSON), overrides the configuration
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Timeline policy document (JSON), overrides the configuration
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Recency window override in days
        #[arg(long)]
        since_days: Option<u32>,

        /// Skip the generator even when an API key is available
        #[arg(long)]
        no_generator: bool,

        /// Pretty-print the JSON outcome
        #[arg(long)]
        pretty: bool,
    },

    /// Validate summary HTML against the output guard
    Validate {
        /// HTML file to check
        #[arg(long)]
        html: PathBuf,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

/// Record bundle as read from disk
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bundle {
    #[serde(default)]
    lead_id: Option<String>,
    #[serde(default)]
    capabilities: Option<SourceCapabilities>,
    #[serde(flatten)]
    records: SourceRecords,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("leadpulse={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => LeadPulseConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => LeadPulseConfig::default(),
    };

    match cli.command {
        Commands::Summarize {
            bundle,
            rules,
            policy,
            since_days,
            no_generator,
            pretty,
        } => {
            run_summarize(
                config,
                &bundle,
                rules.as_deref(),
                policy.as_deref(),
                since_days,
                no_generator,
                pretty,
            )
            .await?;
        }
        Commands::Validate { html } => {
            run_validate(&config, &html)?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_summarize(
    mut config: LeadPulseConfig,
    bundle_path: &Path,
    rules: Option<&Path>,
    policy: Option<&Path>,
    since_days: Option<u32>,
    no_generator: bool,
    pretty: bool,
) -> Result<()> {
    if let Some(path) = rules {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules from {}", path.display()))?;
        config.product_interest = RulesConfig::from_json_str(&content)?;
    }
    if let Some(path) = policy {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read timeline policy from {}", path.display()))?;
        config.timeline = TimelinePolicy::from_json_str(&content)?;
    }
    config.validate()?;

    let content = std::fs::read_to_string(bundle_path)
        .with_context(|| format!("Failed to read bundle from {}", bundle_path.display()))?;
    let bundle: Bundle = serde_json::from_str(&content).context("Invalid record bundle")?;

    let engine = if no_generator {
        SummaryEngine::with_generator(config, None)
    } else {
        SummaryEngine::new(config)
    };

    let query = SourceQuery {
        lead_id: bundle.lead_id.unwrap_or_default(),
        contact_id: None,
        account_id: None,
        since_days,
    };
    let capabilities = bundle
        .capabilities
        .unwrap_or_else(SourceCapabilities::unrestricted);
    let providers = bundle.records.into_providers();

    let outcome = engine.run(&providers, &query, capabilities, Utc::now()).await;

    let json = if pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", json);
    Ok(())
}

fn run_validate(config: &LeadPulseConfig, html_path: &Path) -> Result<()> {
    let html = std::fs::read_to_string(html_path)
        .with_context(|| format!("Failed to read {}", html_path.display()))?;
    let guard = OutputGuard::new(&config.render);
    let validation = guard.validate(&html);
    println!("{}", serde_json::to_string_pretty(&validation)?);
    if !validation.ok {
        anyhow::bail!("Summary rejected: {} reason(s)", validation.reasons.len());
    }
    Ok(())
}

fn show_config(config: Option<&LeadPulseConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
