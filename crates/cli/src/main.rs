mod description;
mod sim;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::core::ActionDispatcher;
use orchestrator::{DeviceList, PhaseReport, Robot};
use robot_events::{EventBus, EventEnvelope};
use robotinterface_core::{ActionPhase, ActionType};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use description::RobotDescription;

const DEFAULT_CONFIG: &str = "robot.toml";

const PHASES: [ActionPhase; 6] = [
    ActionPhase::Startup,
    ActionPhase::Run,
    ActionPhase::Interrupt1,
    ActionPhase::Interrupt2,
    ActionPhase::Interrupt3,
    ActionPhase::Shutdown,
];

#[derive(Parser)]
#[command(name = "robotinterface")]
#[command(about = "Start, run and shut down a robot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Robot description file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long)]
    allow_deprecated_devices: bool,

    /// Override the port prefix of the description
    #[arg(long)]
    portprefix: Option<String>,

    /// Shut down right after entering the run phase
    #[arg(long)]
    once: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the description and print the schedule of every phase
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut robot = RobotDescription::load(&cli.config)
        .await?
        .into_robot()
        .context("Failed to build robot")?;
    if let Some(prefix) = cli.portprefix {
        robot = robot.with_port_prefix(prefix);
    }

    let success = match cli.command {
        Some(Commands::Check) => check(&robot),
        None => {
            robot.set_verbose(cli.verbose);
            robot.set_allow_deprecated_devices(cli.allow_deprecated_devices);
            run(robot, cli.once).await?
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Startup, Run, then Interrupt phases on Ctrl-C, then Shutdown.
///
/// Returns whether both Startup and Shutdown succeeded.
async fn run(robot: Robot, once: bool) -> Result<bool> {
    let bus = EventBus::new();
    tokio::spawn(log_events(bus.subscribe()));
    let robot = Arc::new(robot.with_event_bus(bus));

    info!(
        robot = %robot.name(),
        build = robot.build(),
        portprefix = %robot.port_prefix(),
        devices = robot.devices().len(),
        "Starting robot"
    );

    let startup = robot.enter_phase(ActionPhase::Startup, DeviceList::new()).await;
    log_report(&startup);
    if !startup.is_success() {
        error!(robot = %robot.name(), "Startup failed. Shutting down.");
        let shutdown = robot.enter_phase(ActionPhase::Shutdown, DeviceList::new()).await;
        log_report(&shutdown);
        return Ok(false);
    }

    let run = robot.enter_phase(ActionPhase::Run, DeviceList::new()).await;
    log_report(&run);

    if !once {
        info!(robot = %robot.name(), "Robot is running. Press Ctrl+C to stop");
        if !wait_for_interrupts(&robot).await? {
            error!(robot = %robot.name(), "Aborted without shutdown");
            return Ok(false);
        }
    }

    let shutdown = robot.enter_phase(ActionPhase::Shutdown, DeviceList::new()).await;
    log_report(&shutdown);

    Ok(shutdown.is_success())
}

/// Run interrupt phases on repeated Ctrl-C until one of them completes.
///
/// Returns false when the third interrupt was needed; the robot must not be
/// shut down in that case.
async fn wait_for_interrupts(robot: &Arc<Robot>) -> Result<bool> {
    let mut interrupts = 0u32;
    let mut running: Option<JoinHandle<PhaseReport>> = None;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                interrupts += 1;
                warn!(robot = %robot.name(), interrupt = interrupts, "Interrupt received");

                let phase = match interrupts {
                    1 => {
                        robot.interrupt().await;
                        ActionPhase::Interrupt1
                    }
                    2 => ActionPhase::Interrupt2,
                    _ => {
                        let report = robot
                            .enter_phase(ActionPhase::Interrupt3, DeviceList::new())
                            .await;
                        log_report(&report);
                        return Ok(false);
                    }
                };

                let robot = robot.clone();
                running = Some(tokio::spawn(async move {
                    robot.enter_phase(phase, DeviceList::new()).await
                }));
            }
            joined = async {
                match running.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            } => {
                let report = joined.context("Interrupt phase task failed")?;
                log_report(&report);
                return Ok(true);
            }
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<EventEnvelope>) {
    loop {
        match events.recv().await {
            Ok(envelope) => debug!(
                seq = envelope.sequence,
                event = ?envelope.event,
                "Lifecycle event"
            ),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Lifecycle event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_report(report: &PhaseReport) {
    for action in report.failed_actions() {
        if let Err(e) = &action.result {
            error!(
                device = %action.device,
                action = %action.action_type,
                level = action.level,
                error = %e,
                "Action failed"
            );
        }
    }
    for worker in report.workers.iter().filter(|w| !w.is_success()) {
        if let Err(e) = &worker.result {
            error!(device = %worker.device, target = %worker.target, error = %e, "Worker failed");
        }
    }
    for e in report.open_failures.iter().chain(&report.close_failures) {
        error!(error = %e, "Device failure");
    }

    if report.is_success() {
        info!(phase = %report.phase, levels = ?report.levels, "Phase completed");
    } else {
        warn!(
            phase = %report.phase,
            failures = report.failure_count(),
            cancelled = report.cancelled,
            "Phase completed with errors"
        );
    }
}

/// Print the schedule of every phase and report configuration problems.
fn check(robot: &Robot) -> bool {
    println!();
    println!("Robot: {} (build {})", robot.name(), robot.build());
    if !robot.port_prefix().is_empty() {
        println!("Port prefix: {}", robot.port_prefix());
    }
    println!("Devices: {}", robot.devices().names().join(", "));

    for phase in PHASES {
        let plan = robot.schedule(phase);
        if plan.is_empty() {
            continue;
        }
        println!();
        println!("{}:", phase);
        for level in &plan {
            println!("  level {}:", level.level);
            for scheduled in &level.actions {
                println!("    {} {}", scheduled.device.name(), scheduled.action);
            }
        }
    }

    let problems = validate(robot);
    println!();
    if problems.is_empty() {
        println!("No problems found.");
        true
    } else {
        println!("Problems ({}):", problems.len());
        for problem in &problems {
            println!("  {}", problem);
        }
        false
    }
}

/// Problems an action would hit at dispatch time, found without touching
/// any driver.
fn validate(robot: &Robot) -> Vec<String> {
    let dispatcher = ActionDispatcher::new(robot.devices());
    let mut problems = Vec::new();

    for device in robot.devices().iter() {
        for action in device.actions() {
            let problem = if action.phase() == ActionPhase::Run {
                Some("run phase does not accept actions".to_string())
            } else {
                match action.action_type() {
                    ActionType::Unknown => Some("unknown action type".to_string()),
                    ActionType::Calibrate | ActionType::Park => {
                        match action.params().find_param("target") {
                            None => Some("missing parameter \"target\"".to_string()),
                            Some(target) if !robot.devices().contains(target) => {
                                Some(format!("target device \"{}\" not found", target))
                            }
                            Some(_) => None,
                        }
                    }
                    ActionType::Attach => dispatcher
                        .attach_drivers(action.params())
                        .err()
                        .map(|e| e.to_string()),
                    _ => None,
                }
            };

            if let Some(problem) = problem {
                problems.push(format!("{} {}: {}", device.name(), action, problem));
            }
        }
    }

    problems
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "robotinterface=debug,orchestrator=debug"
    } else {
        "robotinterface=info,orchestrator=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
