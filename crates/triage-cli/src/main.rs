use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triage_core::{
    AgentsClient, AzureCliCredential, Credential, RunStatus, StaticTokenCredential,
    TriageWorkflow, DEFAULT_PROMPT,
};

mod config;

use config::{AuthMethod, TriageConfig};

#[derive(Parser)]
#[command(name = "triage")]
#[command(version)]
#[command(about = "Triage a support ticket with a team of hosted agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage one ticket (the default command)
    Run {
        /// Ticket text; a sample ticket is used when omitted
        prompt: Option<String>,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the triage narration
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Init) => cmd_init().await,
        Some(Commands::Config) => cmd_config(&cli.config).await,
        Some(Commands::Run { prompt }) => cmd_run(&cli.config, prompt.as_deref()).await,
        None => cmd_run(&cli.config, None).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;

        // Loading refuses group/world readable files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Triage initialized at {}", config_dir.display());
    println!(
        "Edit {} to set your project endpoint and model deployment.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TriageConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

async fn cmd_run(config_path: &Option<PathBuf>, prompt: Option<&str>) -> Result<()> {
    let cfg = TriageConfig::load(config_path)?;

    let credential: Arc<dyn Credential> = match cfg.auth.method {
        AuthMethod::AzureCli => Arc::new(AzureCliCredential::default()),
        AuthMethod::Token => Arc::new(
            StaticTokenCredential::new(cfg.auth.token.clone())
                .context("Invalid auth.token")?,
        ),
    };

    let client = AgentsClient::new(&cfg.project_endpoint, credential)?
        .with_api_version(cfg.api_version.clone());
    info!(
        "Using project {} with model {}",
        client.endpoint(),
        cfg.model_deployment_name
    );

    let workflow = TriageWorkflow::new(Arc::new(client), cfg.model_deployment_name.clone())
        .with_poll_policy(cfg.polling.to_policy());

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(signal::ctrl_c, cancel_on_signal).await {
            std::process::exit(130);
        }
    });

    let prompt = prompt.unwrap_or(DEFAULT_PROMPT);
    let mut stdout = std::io::stdout();
    let outcome = workflow
        .run_with_cancel(prompt, &mut stdout, &cancel)
        .await
        .context("Triage failed")?;

    if outcome.run_status != RunStatus::Completed {
        warn!("Triage run finished with status {}", outcome.run_status);
    }
    for failure in outcome.cleanup.failures() {
        warn!(
            "{} {} was not deleted and may need manual removal",
            failure.label, failure.id
        );
    }

    Ok(())
}

/// Cancel on the first interrupt. Returns true once a second one arrives,
/// meaning the user no longer wants to wait for cleanup.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    info!("Received Ctrl+C, stopping triage and cleaning up (press again to exit now)...");
    cancel.cancel();

    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("Received second Ctrl+C, exiting before cleanup finished");
    true
}
