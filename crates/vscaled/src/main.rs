//! vscaled — the vscale daemon.
//!
//! Watches one VM's guest CPU idle percentage through the hypervisor's
//! management CLI and hot-plugs or unplugs vCPUs to match the load.
//!
//! # Usage
//!
//! ```text
//! vscaled run --config /etc/vscale/vscale.toml
//! vscaled check-config --config vscale.toml
//! vscaled load --threads 4
//! ```
//!
//! Without `--config` the built-in VirtualBox defaults are used.

mod load;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use vscale_autoscale::ControlLoop;
use vscale_core::VscaleConfig;
use vscale_hypervisor::ProcessRunner;

#[derive(Parser)]
#[command(name = "vscaled", about = "vCPU autoscaler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run {
        /// Path to vscale.toml.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a config file and print the effective settings.
    CheckConfig {
        /// Path to vscale.toml.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Burn CPU (run this inside the guest).
    Load {
        /// Worker threads.
        #[arg(long, default_value = "1")]
        threads: usize,

        /// Stop after this many rounds per thread.
        #[arg(long)]
        rounds: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,vscaled=debug,vscale=debug")
            }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = VscaleConfig::load(config.as_deref())?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run_daemon(config))
        }
        Command::CheckConfig { config } => {
            let config = VscaleConfig::load(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Load { threads, rounds } => load::run(threads, rounds),
    }
}

async fn run_daemon(config: VscaleConfig) -> anyhow::Result<()> {
    info!(
        vm = %config.vm.name,
        min = config.scaling.min_cpus,
        max = config.scaling.max_cpus,
        "vscale daemon starting"
    );

    let runner = Arc::new(ProcessRunner::new(config.vm.command_timeout()?));
    let mut control = ControlLoop::from_config(runner, &config)?;

    control.setup().await;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let control_handle = tokio::spawn(async move {
        control.run(shutdown_rx).await;
    });

    shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Err(e) = control_handle.await {
        error!(error = %e, "control loop task failed");
    }

    info!("vscale daemon stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
