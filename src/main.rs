/*!
 * Vigil daemon entry point
 */

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use vigil::error::{EXIT_FATAL, EXIT_SUCCESS};
use vigil::{logging, Collaborators, HomeSystem, VigilConfig, VigilError};

/// Vigil - armed state and motion-event orchestration for home cameras
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "vigil.toml", env = "VIGIL_CONFIG")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("vigil: {:#}", e);
            e.downcast_ref::<VigilError>()
                .map_or(EXIT_FATAL, VigilError::exit_code)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = VigilConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if cli.check {
        println!(
            "{}: OK ({} cameras, {} masters)",
            cli.config.display(),
            config.cameras.len(),
            config.masters.len()
        );
        return Ok(());
    }

    logging::init_logging(&config.logging, cli.debug).context("Failed to initialize logging")?;
    info!("Vigil v{}", vigil::VERSION);

    let collaborators =
        Collaborators::from_config(&config).context("Failed to build collaborators")?;
    let system = HomeSystem::start(&config, collaborators)
        .await
        .context("Failed to start")?;

    wait_for_exit(&system, &cli.config).await?;

    system.shutdown().await;
    Ok(())
}

/// Block until ctrl-c or SIGTERM, reloading camera options on SIGHUP
#[cfg(unix)]
async fn wait_for_exit(system: &HomeSystem, config_path: &Path) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for ctrl-c")?;
                info!("Interrupt received");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("SIGTERM received");
                return Ok(());
            }
            _ = hangup.recv() => reload(system, config_path),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_exit(_system: &HomeSystem, _config_path: &Path) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Interrupt received");
    Ok(())
}

#[cfg_attr(not(unix), allow(dead_code))]
fn reload(system: &HomeSystem, config_path: &Path) {
    match VigilConfig::load(config_path) {
        Ok(config) => {
            info!(path = %config_path.display(), "Configuration reloaded, publishing camera options");
            system.apply_options(config.options_event());
        }
        Err(e) => error!(path = %config_path.display(), error = %e, "Reload failed, keeping current options"),
    }
}
