use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use deskpilot::engine::{CancelFlag, SessionOutcome};
use deskpilot::Config;

#[derive(Parser)]
#[command(name = "deskpilot")]
#[command(about = "Drives the Windows desktop toward a mission with a vision model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mission against the live desktop
    Run {
        #[arg(help = "Mission description")]
        mission: String,
        #[arg(long, help = "TOML configuration file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Override the turn budget")]
        max_steps: Option<u32>,
        #[arg(long, help = "Directory for frames and checkpoints")]
        dump_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(long, help = "TOML configuration file")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            mission,
            config,
            max_steps,
            dump_dir,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(steps) = max_steps {
                config.max_steps = steps;
            }
            if let Some(dir) = dump_dir {
                config.dump_dir = dir;
            }
            config.validate()?;

            let mission = mission.trim();
            if mission.is_empty() {
                bail!("Mission required");
            }

            let outcome = run_mission(mission, config).await?;
            print_debrief(&outcome);
            if matches!(outcome.status, deskpilot::SessionStatus::Cancelled { .. }) {
                std::process::exit(1);
            }
        }
        Commands::Config { config } => {
            let config = Config::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

#[cfg_attr(not(windows), allow(dead_code))]
fn spawn_interrupt_listener() -> CancelFlag {
    let flag = CancelFlag::new();
    let listener = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        log::warn!("Interrupt received, stopping after the current turn (press again to quit)");
        listener.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            log::error!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });
    flag
}

#[cfg(windows)]
async fn run_mission(mission: &str, config: Config) -> Result<SessionOutcome> {
    use deskpilot::capture::compositor::GdiScreen;
    use deskpilot::input::windows::SendInputBackend;
    use deskpilot::providers::OpenAICompatibleOracle;
    use deskpilot::ControlLoop;
    use std::sync::Arc;

    log::info!(
        "deskpilot: max_steps={} supervisor_interval={} endpoint={}",
        config.max_steps,
        config.supervisor_interval,
        config.endpoint
    );

    let oracle = Arc::new(OpenAICompatibleOracle::new(&config)?);
    let cancel = spawn_interrupt_listener();
    let mut control = ControlLoop::new(config, GdiScreen::new(), SendInputBackend::new(), oracle)
        .with_cancel_flag(cancel);

    let mut state = control.start(mission).await?;
    control.run(&mut state).await
}

#[cfg(not(windows))]
async fn run_mission(_mission: &str, _config: Config) -> Result<SessionOutcome> {
    bail!(deskpilot::error::CaptureError::Unsupported)
}

fn print_debrief(outcome: &SessionOutcome) {
    println!("\nMISSION DEBRIEF");
    println!("Status: {}", outcome.status);
    println!("Total Turns: {}", outcome.turns);
    println!("Final Phase: {}", outcome.final_phase);
    println!("Full Archive: {} actions", outcome.archived_actions);
    log::info!("Session finished: {}", outcome.status);
}
