//! Cubed - cube topology coordinator
//!
//! CLI entry point for running the coordinator and inspecting its setup.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use cubed::cli::{Cli, Command, get_log_path};
use cubed::config::Config;
use cubed::domain::{FIXED_TOPOLOGY, NodeId};
use cubed::server::{AppState, serve};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Serve { host, port }) => cmd_serve(config, host, port).await,
        None => cmd_serve(config, None, None).await,
        Some(Command::Roles) => cmd_roles(),
        Some(Command::Config) => cmd_config(&config),
    }
}

/// Run the coordinator until SIGINT/SIGTERM
async fn cmd_serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    debug!(addr = %config.server.bind_addr(), "cmd_serve: called");

    let (state, report) = AppState::start(&config).await.context("Failed to start topology")?;
    for node in report.failed() {
        warn!(node = %node.node_id, name = %node.name, error = ?node.error, "Node started in error state");
    }

    let listener = TcpListener::bind(config.server.bind_addr())
        .await
        .context(format!("Failed to bind {}", config.server.bind_addr()))?;
    println!("Cubed listening on http://{}", listener.local_addr()?);
    println!("Instance: {}", state.hub.instance_id());

    // Create shutdown channel for the HTTP server
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    let server_state = state.clone();
    let mut server_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        if let Err(e) = serve(listener, server_state, shutdown).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("Coordinator running. Press Ctrl+C to stop.");

    let server_exited = tokio::select! {
        result = wait_for_shutdown_signal() => {
            result?;
            false
        }
        _ = &mut server_handle => {
            warn!("HTTP server exited unexpectedly");
            true
        }
    };

    if !server_exited {
        let _ = shutdown_tx.send(()).await;
        let _ = server_handle.await;
    }

    info!("Coordinator shutting down...");
    state.manager.shutdown().await.context("Failed to shut down topology manager")?;
    println!("Cubed stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    debug!("wait_for_shutdown_signal: setting up signal handlers");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("SIGHUP received - configuration is read at startup only, ignoring");
                }
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                    return Ok(());
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
        Ok(())
    }
}

/// Print the fixed topology
fn cmd_roles() -> Result<()> {
    println!("{:<4} {:<10} {:<14} DEPENDS ON", "ID", "NAME", "ROLE");
    for (index, (name, role)) in FIXED_TOPOLOGY.iter().enumerate() {
        let id = NodeId::Index(index as u32 + 1);
        let deps: Vec<&str> = role.structural_dependencies().iter().map(|r| r.as_str()).collect();
        let deps = if deps.is_empty() { "-".to_string() } else { deps.join(", ") };
        println!("{:<4} {:<10} {:<14} {}", id.to_string(), name, role.as_str(), deps);
    }
    Ok(())
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}
