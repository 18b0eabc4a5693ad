// Plan execution: translate -> sequence over serial -> dead-reckon
// Note: the serial port is opened per run and dropped when the run ends, on every path.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

// local imports
use crate::config::{CompletionMode, DriveConfig};
use crate::error::{DriveError, Result};
use crate::link::{CommandChannel, FrameFormat};
use crate::messages::{
    AbortReason, Command, ExecutionResult, MotionPrimitive, Pose, TelemetrySample,
};
use crate::odometry::{integrate, OdometryError};
use crate::plan::Translator;
use crate::sequencer::{SegmentSequencer, SequencerSettings};
use crate::telemetry::{rebase_timestamps, TelemetrySummary};

/// Everything produced by one plan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub result: ExecutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TelemetrySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Vec<Pose>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometry_error: Option<String>,
}

impl RunReport {
    /// Link failures end the program once the report is saved
    pub fn into_outcome(self) -> Result<Self> {
        match &self.result.abort_reason {
            Some(AbortReason::LinkFailure { segment, message }) => Err(DriveError::LinkAborted {
                segment: *segment,
                message: message.clone(),
            }),
            _ => Ok(self),
        }
    }
}

/// Result of a fixed-window bench capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReport {
    pub command: Command,
    pub telemetry: Vec<TelemetrySample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TelemetrySummary>,
    /// Set when the log was out of order and kept with controller timestamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_error: Option<String>,
}

/// Saved telemetry, either a full run report or a bare sample array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TelemetryInput {
    Report { result: ExecutionResult },
    Capture { telemetry: Vec<TelemetrySample> },
    Samples(Vec<TelemetrySample>),
}

impl TelemetryInput {
    pub fn into_samples(self) -> Vec<TelemetrySample> {
        match self {
            TelemetryInput::Report { result } => result.telemetry,
            TelemetryInput::Capture { telemetry } => telemetry,
            TelemetryInput::Samples(samples) => samples,
        }
    }
}

pub fn frame_format(config: &DriveConfig) -> FrameFormat {
    let self_timed = matches!(
        config.protocol.completion,
        CompletionMode::SelfTimed { .. }
    );
    FrameFormat::new(
        config.protocol.velocity_encoding,
        config.protocol.send_duration || self_timed,
    )
}

/// Read a JSON file into `T`
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| DriveError::Input {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DriveError::Parse {
        path: display,
        source,
    })
}

/// Write `value` as pretty JSON to `path`, or stdout when no path is given
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!("Report written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

pub fn load_plan(path: &Path) -> Result<Vec<MotionPrimitive>> {
    let plan: Vec<MotionPrimitive> = read_json(path)?;
    info!("Loaded {} primitives from {}", plan.len(), path.display());
    Ok(plan)
}

/// Translate the plan, open the port and run every segment
pub fn run_plan(config: &DriveConfig, primitives: &[MotionPrimitive]) -> Result<RunReport> {
    let commands = Translator::new(config).translate(primitives)?;
    if commands.is_empty() {
        warn!("Plan has no executable segments; only the stop command will be sent");
    }

    info!("Opening controller link on {}...", config.link.port);
    let channel = CommandChannel::open(&config.link, frame_format(config))?;
    Ok(execute_commands(channel, &commands, config))
}

/// Sequence `commands` over an already open channel and build the report
pub fn execute_commands<P: Read + Write>(
    channel: CommandChannel<P>,
    commands: &[Command],
    config: &DriveConfig,
) -> RunReport {
    let sequencer = SegmentSequencer::new(channel, SequencerSettings::from(config));
    let result = sequencer.execute(commands);
    info!(
        "Plan finished: {:?}, {} segments run, {} telemetry samples",
        result.status,
        result.segments_run,
        result.telemetry.len()
    );
    build_report(result, config)
}

/// Attach summary and trajectory. Odometry errors are reported, not raised:
/// the raw telemetry is still worth keeping.
pub fn build_report(result: ExecutionResult, config: &DriveConfig) -> RunReport {
    let summary = TelemetrySummary::from_samples(&result.telemetry);
    let (trajectory, odometry_error) = match integrate_log(&result.telemetry, config) {
        Ok(poses) => (Some(poses), None),
        Err(e) => {
            warn!("Odometry integration failed: {}", e);
            (None, Some(e.to_string()))
        }
    };
    RunReport {
        result,
        summary,
        trajectory,
        odometry_error,
    }
}

/// Dead-reckon a telemetry log from the configured start pose
pub fn integrate_log(
    samples: &[TelemetrySample],
    config: &DriveConfig,
) -> std::result::Result<Vec<Pose>, OdometryError> {
    let start = config.odometry.start_pose();
    if config.odometry.rebase_timestamps {
        let mut rebased = samples.to_vec();
        rebase_timestamps(&mut rebased)?;
        integrate(&rebased, start)
    } else {
        integrate(samples, start)
    }
}

/// Capture window from a seconds argument; must be positive and representable
pub fn capture_window(seconds: f64) -> Result<Duration> {
    let invalid = || DriveError::InvalidArgument {
        name: "seconds",
        value: seconds.to_string(),
    };
    if !(seconds > 0.0) {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

/// Open the port, drive one command for `window`, then stop
pub fn run_capture(config: &DriveConfig, command: Command, window: Duration) -> Result<CaptureReport> {
    info!("Opening controller link on {}...", config.link.port);
    let channel = CommandChannel::open(&config.link, frame_format(config))?;
    capture_with(channel, command, window, config).map_err(DriveError::from)
}

/// The command carries the window as its duration, so a self-timing
/// controller keeps driving for the whole capture.
pub fn capture_with<P: Read + Write>(
    channel: CommandChannel<P>,
    mut command: Command,
    window: Duration,
    config: &DriveConfig,
) -> std::result::Result<CaptureReport, crate::link::LinkError> {
    command.duration_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    let sequencer = SegmentSequencer::new(channel, SequencerSettings::from(config));
    let mut telemetry = sequencer.capture(&command, window)?;
    let timestamp_error = match rebase_timestamps(&mut telemetry) {
        Ok(()) => None,
        Err(e) => {
            warn!("Keeping controller timestamps: {}", e);
            Some(e.to_string())
        }
    };
    let summary = TelemetrySummary::from_samples(&telemetry);
    if let Some(summary) = &summary {
        info!(
            "Captured {} samples over {} ms: mean velocity {:.3} m/s, mean gyro z {:.3} deg/s",
            summary.samples, summary.span_ms, summary.mean_actual_velocity, summary.mean_gyro_z
        );
    } else {
        warn!("No telemetry received during capture");
    }
    Ok(CaptureReport {
        command,
        telemetry,
        summary,
        timestamp_error,
    })
}
