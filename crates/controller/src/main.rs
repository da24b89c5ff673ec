//! GameRig controller
//!
//! Thin driving layer over the controller library: load the fleet file,
//! start every SUT's configured job, stream per-SUT logs to files, and
//! stop everything on Ctrl-C.

use clap::Parser;
use gamerig_controller::{
    config, AgentClient, LaunchOnlyExecutor, LogRouter, RunPolicy, SutController,
};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gamerig")]
#[command(about = "GameRig controller - SUT fleet orchestration")]
#[command(version)]
struct Cli {
    /// Fleet file with SUT and campaign definitions
    #[arg(short, long, default_value = "suts.json")]
    fleet: PathBuf,

    /// Directory for per-SUT log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let router = LogRouter::new();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(router.layer())
        .with(filter)
        .init();

    info!("GameRig controller v{}", env!("CARGO_PKG_VERSION"));

    let fleet = config::load_fleet(&cli.fleet)?;
    if fleet.suts.is_empty() {
        anyhow::bail!("fleet file {} lists no SUTs", cli.fleet.display());
    }
    std::fs::create_dir_all(&cli.log_dir)?;

    let mut controllers = Vec::new();
    for record in &fleet.suts {
        let client = Arc::new(AgentClient::new(&record.host, record.port));
        match client.probe().await {
            Ok(status) => info!(
                "connected to {} at {}:{} (agent v{})",
                record.name, record.host, record.port, status.version
            ),
            Err(e) => warn!(
                "{} at {}:{} unreachable: {} (its job will fail on first request)",
                record.name, record.host, record.port, e
            ),
        }

        let controller = SutController::new(
            record.name.clone(),
            client,
            Arc::new(LaunchOnlyExecutor),
            RunPolicy::default(),
        );

        // Per-SUT log file fed from the router; the subscription guard
        // deregisters the channel when the writer task ends
        let mut subscription = router.subscribe(&record.name);
        let log_path = cli.log_dir.join(format!("{}.log", record.name));
        tokio::spawn(async move {
            let Ok(mut file) = std::fs::File::create(&log_path) else {
                warn!("could not create log file {}", log_path.display());
                return;
            };
            while let Some(line) = subscription.recv().await {
                let _ = writeln!(
                    file,
                    "{} - {} - {} - {}",
                    line.timestamp.format("%H:%M:%S"),
                    line.target,
                    line.level,
                    line.message
                );
            }
        });

        if !controller.start(record.job()) {
            warn!("{}: job not started", record.name);
        }
        controllers.push(controller);
    }

    // Run until every job finishes or the operator interrupts
    let all_done = async {
        loop {
            if controllers
                .iter()
                .all(|c| c.state() != gamerig_common::JobState::Running)
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping all SUTs");
            for controller in &controllers {
                controller.stop();
            }
        }
        _ = all_done => {}
    }
    for controller in &controllers {
        controller.wait().await;
    }

    for controller in &controllers {
        let progress = controller.progress();
        info!(
            "{}: {} (run {}/{})",
            controller.name(),
            controller.state(),
            progress.current_run,
            progress.total_runs
        );
        for failed in &progress.failed_games {
            warn!("{}: failed: {}", controller.name(), failed);
        }
    }

    Ok(())
}
