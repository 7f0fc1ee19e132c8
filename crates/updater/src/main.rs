use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    process::ExitCode,
    sync::Mutex,
};

use savekeep_core::{
    config::AppConfig,
    updater::{CommandLauncher, HttpFetcher, SystemProcesses},
    UpdatePlan, UpdateState, Updater,
};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

fn main() -> Result<ExitCode> {
    let config = AppConfig::load()?;
    init_logging(&config)?;

    let plan = UpdatePlan::from_config(&config);
    info!(
        binary = %plan.binary_path.display(),
        url = %plan.binary_url,
        "Starting update"
    );

    let mut updater = Updater::new(
        plan,
        SystemProcesses::new(),
        HttpFetcher::new()?,
        CommandLauncher,
    );
    match updater.run() {
        UpdateState::Done => {
            info!("Update finished");
            Ok(ExitCode::SUCCESS)
        }
        UpdateState::Failed { stage, reason } => {
            error!(%stage, %reason, "Update failed");
            Ok(ExitCode::FAILURE)
        }
        other => {
            error!(state = ?other, "Updater stopped early");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let log_dir = config.install_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join("updater.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
