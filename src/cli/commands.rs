//! CLI command implementations
//!
//! `serve` follows a fixed start-up order: load config, init logging,
//! build the controller, start the sweeper, bind the server. Any failure
//! before serving is fatal.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;

use crate::config::PromoterConfig;
use crate::http_server::{AppState, HttpServer};
use crate::observability::{init_logging, log_event, log_event_with_detail, Event};
use crate::promotion::{LogNotifier, PromotionController, PromotionObserver, TimeoutSweeper};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Parse arguments and run the selected command.
pub fn run() -> CliResult<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run a CLI command
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::CheckConfig { config } => check_config(&config),
        Command::Resolve { config, branch } => resolve(&config, &branch),
    }
}

/// Controller wired with the configured executor and a logging notifier.
pub fn build_controller(config: &PromoterConfig) -> CliResult<Arc<PromotionController>> {
    let controller = PromotionController::new(
        config.controller_config()?,
        config.executor()?,
        Arc::new(LogNotifier),
        PromotionObserver::default(),
    );
    Ok(Arc::new(controller))
}

/// Start the HTTP server and the timeout sweeper.
///
/// Runs until Ctrl-C, then stops the sweeper and drains requests.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = PromoterConfig::load(config_path)?;

    init_logging(&config.log_level, config.log_format)
        .map_err(|e| CliError::boot_failed(e.to_string()))?;
    log_event(Event::BootStart);
    log_event_with_detail(Event::ConfigLoaded, &config_path.display().to_string());

    let controller = build_controller(&config)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper =
            TimeoutSweeper::new(controller.clone(), config.sweep_interval()).spawn(shutdown_rx);

        let state = Arc::new(AppState::new(controller, config.environment.clone()));
        let server = HttpServer::new(config.server.clone(), state);

        log_event(Event::BootComplete);
        let result = server.start(shutdown_signal()).await;

        log_event(Event::ShutdownStart);
        let _ = shutdown_tx.send(true);
        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "timeout sweeper ended abnormally");
        }

        match result {
            Ok(()) => {
                log_event(Event::ShutdownComplete);
                Ok(())
            }
            Err(e) => {
                log_event_with_detail(Event::ServerFailed, &e.to_string());
                Err(CliError::serve_failed(format!("HTTP server failed: {}", e)))
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}

/// Validate configuration and print the resolved routing.
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = PromoterConfig::load(config_path)?;
    let report = check_report(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Summary of a validated configuration.
pub fn check_report(config: &PromoterConfig) -> CliResult<Value> {
    let controller = config.controller_config()?;
    let required: serde_json::Map<String, Value> = controller
        .required_gates
        .iter()
        .map(|(target, gates)| (target.to_string(), json!(gates)))
        .collect();
    let executor = match config.deploy_command {
        Some(_) => "command",
        None => "log",
    };

    Ok(json!({
        "status": "ok",
        "environment": config.environment,
        "listen": config.server.socket_addr(),
        "branches": config.branches,
        "required_gates": required,
        "gate_timeout_secs": config.gate_timeout_secs,
        "retention_secs": config.retention_secs,
        "sweep_interval_secs": config.sweep_interval_secs,
        "executor": executor,
    }))
}

/// Print where a branch would be promoted.
pub fn resolve(config_path: &Path, branch: &str) -> CliResult<()> {
    let config = PromoterConfig::load(config_path)?;
    let report = resolve_report(&config, branch)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Target and required gates for one branch.
pub fn resolve_report(config: &PromoterConfig, branch: &str) -> CliResult<Value> {
    let controller = config.controller_config()?;
    let target = controller.branches.resolve(branch);

    Ok(json!({
        "branch": branch,
        "environment": target,
        "deployable": target.is_deployable(),
        "required_gates": controller.required_for(target),
    }))
}
