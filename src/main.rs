use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use segment_drive_runtime::config::DriveConfig;
use segment_drive_runtime::messages::{Command, Gear, SteeringCode};
use segment_drive_runtime::runtime::{self, TelemetryInput};
use segment_drive_runtime::{DriveError, Result};

#[derive(Parser)]
#[command(name = "segment-drive", version, about = "Drive the robot one plan segment at a time")]
struct Cli {
    /// JSON config file (missing fields use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Execute a planner output file and dead-reckon the result
    Run {
        /// JSON array of {steering, gear, distance}
        #[arg(long)]
        plan: PathBuf,
        /// Where to write the run report (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the frames a plan would send, without opening the port
    Translate {
        #[arg(long)]
        plan: PathBuf,
    },
    /// Send one command, record telemetry for a fixed time, then stop
    Capture {
        #[arg(long, value_enum, default_value_t = SteeringArg::Straight)]
        steering: SteeringArg,
        #[arg(long, value_enum, default_value_t = GearArg::Forward)]
        gear: GearArg,
        /// m/s
        #[arg(long, default_value_t = 0.0)]
        velocity: f64,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long)]
        use_controller: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Dead-reckon a saved report or telemetry array
    Integrate {
        #[arg(long)]
        telemetry: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SteeringArg {
    Left,
    Right,
    Straight,
    Neutral,
}

impl From<SteeringArg> for SteeringCode {
    fn from(arg: SteeringArg) -> Self {
        match arg {
            SteeringArg::Left => SteeringCode::Left,
            SteeringArg::Right => SteeringCode::Right,
            SteeringArg::Straight => SteeringCode::Straight,
            SteeringArg::Neutral => SteeringCode::Neutral,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GearArg {
    Forward,
    Backward,
    Neutral,
}

impl From<GearArg> for Gear {
    fn from(arg: GearArg) -> Self {
        match arg {
            GearArg::Forward => Gear::Forward,
            GearArg::Backward => Gear::Backward,
            GearArg::Neutral => Gear::Neutral,
        }
    }
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<DriveConfig> {
    let mut config = match &cli.config {
        Some(path) => DriveConfig::load(path)?,
        None => DriveConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.link.port = port.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Cmd::Run { plan, output } => {
            let primitives = runtime::load_plan(&plan)?;
            let report = runtime::run_plan(&config, &primitives)?;
            runtime::write_json(output.as_deref(), &report)?;
            let report = report.into_outcome()?;
            info!(
                "Run {:?}: {} segments completed",
                report.result.status, report.result.segments_run
            );
        }
        Cmd::Translate { plan } => {
            let primitives = runtime::load_plan(&plan)?;
            let commands = segment_drive_runtime::plan::translate(&primitives, &config)?;
            let format = runtime::frame_format(&config);
            for command in &commands {
                print!("{}", format.encode(command));
            }
            print!("{}", format.encode(&Command::stop()));
        }
        Cmd::Capture {
            steering,
            gear,
            velocity,
            seconds,
            use_controller,
            output,
        } => {
            if !(velocity.is_finite() && velocity >= 0.0) {
                return Err(DriveError::InvalidArgument {
                    name: "velocity",
                    value: velocity.to_string(),
                });
            }
            let window = runtime::capture_window(seconds)?;
            let command = Command {
                steering: steering.into(),
                gear: gear.into(),
                velocity,
                // set to the window when the capture starts
                duration_ms: 0,
                use_controller,
            };
            let report = runtime::run_capture(&config, command, window)?;
            runtime::write_json(output.as_deref(), &report)?;
        }
        Cmd::Integrate { telemetry, output } => {
            let input: TelemetryInput = runtime::read_json(&telemetry)?;
            let samples = input.into_samples();
            let poses = runtime::integrate_log(&samples, &config)?;
            info!("Integrated {} samples", poses.len());
            runtime::write_json(output.as_deref(), &poses)?;
        }
    }
    Ok(())
}
