// Telemetry line decoding
//
// Controller lines are either the completion signal "1" or CSV:
// timestamp_ms,desired_velocity,actual_velocity,error,output,gyro_z[,extra...]

use serde::{Deserialize, Serialize};

use crate::config::TelemetryScaling;
use crate::messages::TelemetrySample;
use crate::odometry::OdometryError;

/// Literal line the controller sends when a segment is done
pub const COMPLETION_SIGNAL: &str = "1";

/// Minimum comma separated fields in a telemetry line
pub const TELEMETRY_FIELDS: usize = 6;

const FIELD_NAMES: [&str; TELEMETRY_FIELDS] = [
    "timestamp",
    "desired_velocity",
    "actual_velocity",
    "error",
    "output",
    "gyro_z",
];

const MILLI: f64 = 1_000.0;
const MICRO: f64 = 1_000_000.0;

/// A successfully classified inbound line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundLine {
    Completion,
    Telemetry(TelemetrySample),
}

/// Why a line is not telemetry. Always recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedTelemetry {
    #[error("expected at least 6 fields, got {found}")]
    TooFewFields { found: usize },

    #[error("field {field} is not a valid number: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Decode one line (already stripped of its terminator)
pub fn decode_line(
    line: &str,
    scaling: TelemetryScaling,
) -> Result<InboundLine, MalformedTelemetry> {
    if line == COMPLETION_SIGNAL {
        return Ok(InboundLine::Completion);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < TELEMETRY_FIELDS {
        return Err(MalformedTelemetry::TooFewFields {
            found: fields.len(),
        });
    }

    let timestamp_ms = fields[0]
        .parse::<u64>()
        .map_err(|_| invalid_field(0, fields[0]))?;

    let mut values = [0.0f64; TELEMETRY_FIELDS - 1];
    for (i, value) in values.iter_mut().enumerate() {
        let raw = fields[i + 1];
        *value = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid_field(i + 1, raw))?;
    }
    let [desired, actual, error, output, gyro] = values;

    let sample = match scaling {
        TelemetryScaling::Raw => TelemetrySample {
            timestamp_ms,
            desired_velocity: desired,
            actual_velocity: actual,
            error,
            output,
            gyro_z: gyro,
        },
        TelemetryScaling::Milli => TelemetrySample {
            timestamp_ms,
            desired_velocity: desired / MILLI,
            actual_velocity: actual / MILLI,
            error: error / MILLI,
            output: output / MILLI,
            gyro_z: gyro / MICRO,
        },
    };
    Ok(InboundLine::Telemetry(sample))
}

fn invalid_field(index: usize, value: &str) -> MalformedTelemetry {
    MalformedTelemetry::InvalidField {
        field: FIELD_NAMES[index],
        value: value.to_string(),
    }
}

/// Shift timestamps so the first sample is at 0 ms.
/// Out-of-order logs are rejected and left untouched.
pub fn rebase_timestamps(samples: &mut [TelemetrySample]) -> Result<(), OdometryError> {
    if let Some((index, pair)) = samples
        .windows(2)
        .enumerate()
        .find(|(_, pair)| pair[1].timestamp_ms < pair[0].timestamp_ms)
    {
        return Err(OdometryError::NonMonotonicTelemetry {
            index: index + 1,
            previous_ms: pair[0].timestamp_ms,
            timestamp_ms: pair[1].timestamp_ms,
        });
    }
    let Some(first) = samples.first().map(|s| s.timestamp_ms) else {
        return Ok(());
    };
    for sample in samples.iter_mut() {
        sample.timestamp_ms -= first;
    }
    Ok(())
}

/// Averages over a telemetry log, used for bench runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub samples: usize,
    pub span_ms: u64,
    pub mean_desired_velocity: f64,
    pub mean_actual_velocity: f64,
    pub mean_gyro_z: f64,
}

impl TelemetrySummary {
    pub fn from_samples(samples: &[TelemetrySample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;
        let n = samples.len() as f64;
        let mean = |f: fn(&TelemetrySample) -> f64| samples.iter().map(f).sum::<f64>() / n;

        Some(Self {
            samples: samples.len(),
            span_ms: last.timestamp_ms.saturating_sub(first.timestamp_ms),
            mean_desired_velocity: mean(|s| s.desired_velocity),
            mean_actual_velocity: mean(|s| s.actual_velocity),
            mean_gyro_z: mean(|s| s.gyro_z),
        })
    }
}
