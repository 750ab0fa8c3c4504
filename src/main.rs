// ActionGuard - Command Line Entry Point
//
// Offline tooling around the validation pipeline and the audit trail:
// - Validate an action context from a JSON file
// - Verify a persisted audit chain
// - Show the effective configuration

use actionguard::audit::AuditChain;
use actionguard::config::Config;
use actionguard::context::ActionSecurityContext;
use actionguard::logging::LogLevel;
use actionguard::validation::ValidationOrchestrator;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// ActionGuard: action security validation for autonomous agents
#[derive(Parser, Debug)]
#[command(name = "actionguard")]
#[command(author = "ActionGuard Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Validate agent actions and verify tamper-evident audit trails", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an action context and print the decision as JSON
    Validate {
        /// Path to a JSON file containing an action context
        context: PathBuf,
    },
    /// Verify the integrity of a JSON Lines audit log
    VerifyAudit {
        /// Path to the audit log
        log: PathBuf,
    },
    /// Print the effective configuration with secrets redacted
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let mut logging = config.logging.clone();
    if args.verbose {
        logging.level = LogLevel::Debug;
    }
    logging.init()?;

    debug!("ActionGuard v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Validate { context } => validate(&config, &context).await,
        Commands::VerifyAudit { log } => verify_audit(&config, &log).await,
        Commands::ShowConfig => show_config(&config),
    }
}

/// Validate one action context against the configured policy
///
/// When an audit log is configured its records feed the activity history.
async fn validate(config: &Config, context_path: &Path) -> Result<()> {
    let content = fs::read_to_string(context_path)
        .with_context(|| format!("Failed to read action context from {:?}", context_path))?;
    let mut ctx: ActionSecurityContext = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse action context from {:?}", context_path))?;

    let key = config.security.resolve_signing_key()?;
    let chain = match &config.audit.log_path {
        Some(path) if path.exists() => AuditChain::load_jsonl(path, key.clone())
            .await
            .with_context(|| format!("Failed to load audit history from {:?}", path))?,
        _ => AuditChain::new(key.clone()),
    };

    let orchestrator = ValidationOrchestrator::new(&config.security, key, Arc::new(chain));
    let result = orchestrator.validate(&mut ctx).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Verify a persisted audit chain with the configured signing key
async fn verify_audit(config: &Config, log: &Path) -> Result<()> {
    let security = &config.security;
    if security.signing_key.is_none() && security.master_key.is_none() {
        anyhow::bail!(
            "No signing key configured; set security.signing_key or ACTIONGUARD_SIGNING_KEY"
        );
    }
    let key = security.resolve_signing_key()?;

    let records = actionguard::audit::read_jsonl(log)
        .await
        .with_context(|| format!("Failed to read audit log from {:?}", log))?;

    match AuditChain::find_violation(&records, &key) {
        None => {
            info!("Verified {} audit records", records.len());
            println!("Audit chain intact: {} records", records.len());
            Ok(())
        }
        Some(violation) => anyhow::bail!(
            "Audit chain broken at record {} ({}): {}",
            violation.index,
            violation.audit_id,
            violation.reason
        ),
    }
}

fn show_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
