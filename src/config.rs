// Timeouts, velocity tables, serial link and protocol configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::messages::{Gear, Pose, Steering};

// Serial port for the motion controller (Raspberry Pi UART)
pub const DEFAULT_PORT: &str = "/dev/ttyAMA0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;
// Serial read timeout, bounds a single poll of the device
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10;

// Geometry of the plan
pub const TURNING_RADIUS: f64 = 0.6; // meters per plan unit
pub const SHORT_DISTANCE_THRESHOLD: f64 = 0.4; // plan units

// Segment handshake
pub const SEGMENT_TIMEOUT_MS: u64 = 60_000;
pub const POLL_INTERVAL_MS: u64 = 10;
pub const SELF_TIMED_GRACE_MS: u64 = 500;

// Wire scaling
pub const VELOCITY_SCALE: u32 = 100;

/// Velocity pair for one (gear, steering) combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketVelocity {
    pub short: f64,
    pub long: f64,
}

impl BucketVelocity {
    pub const fn new(short: f64, long: f64) -> Self {
        Self { short, long }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteeringVelocities {
    pub straight: BucketVelocity,
    pub left: BucketVelocity,
    pub right: BucketVelocity,
}

impl SteeringVelocities {
    pub fn get(&self, steering: Steering) -> BucketVelocity {
        match steering {
            Steering::Straight => self.straight,
            Steering::Left => self.left,
            Steering::Right => self.right,
        }
    }
}

/// Per gear / steering velocity table (m/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityTable {
    pub forward: SteeringVelocities,
    pub backward: SteeringVelocities,
}

impl VelocityTable {
    /// Velocities for a driving gear, `None` for neutral
    pub fn for_gear(&self, gear: Gear) -> Option<&SteeringVelocities> {
        match gear {
            Gear::Forward => Some(&self.forward),
            Gear::Backward => Some(&self.backward),
            Gear::Neutral => None,
        }
    }

    fn buckets(&self) -> [BucketVelocity; 6] {
        [
            self.forward.straight,
            self.forward.left,
            self.forward.right,
            self.backward.straight,
            self.backward.left,
            self.backward.right,
        ]
    }
}

impl Default for VelocityTable {
    fn default() -> Self {
        Self {
            forward: SteeringVelocities {
                straight: BucketVelocity::new(6.0, 0.8),
                left: BucketVelocity::new(1.1, 0.45),
                right: BucketVelocity::new(1.1, 0.45),
            },
            backward: SteeringVelocities {
                straight: BucketVelocity::new(1.0, 0.65),
                left: BucketVelocity::new(0.7, 0.45),
                right: BucketVelocity::new(0.7, 0.45),
            },
        }
    }
}

/// How the `V:` field is written
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum VelocityEncoding {
    /// Decimal float in m/s
    Raw,
    /// Integer `trunc(velocity * factor)`
    Scaled { factor: u32 },
}

/// Numeric scaling of inbound telemetry lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryScaling {
    /// Native floats, gyro in deg/s
    Raw,
    /// Velocities, error and output x1000; gyro in micro-deg/s
    Milli,
}

/// When a segment is considered finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CompletionMode {
    /// Wait for the controller to answer "1"
    Acknowledged,
    /// Controller times the segment itself from `D:`; done after duration + grace
    SelfTimed { grace_ms: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baudrate: u32,
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub velocity_encoding: VelocityEncoding,
    pub telemetry_scaling: TelemetryScaling,
    pub completion: CompletionMode,
    /// Append `D:<duration_ms>` to every command
    pub send_duration: bool,
    /// Hardware wiring swaps left and right steering
    pub mirror_steering: bool,
    /// Value of the `C:` field for motion commands
    pub use_controller: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            velocity_encoding: VelocityEncoding::Scaled {
                factor: VELOCITY_SCALE,
            },
            telemetry_scaling: TelemetryScaling::Milli,
            completion: CompletionMode::Acknowledged,
            send_duration: true,
            mirror_steering: true,
            use_controller: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryConfig {
    pub start_x: f64,
    pub start_y: f64,
    pub start_heading_deg: f64,
    /// Shift the telemetry log so the first sample sits at t = 0
    pub rebase_timestamps: bool,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            start_y: 0.0,
            start_heading_deg: 0.0,
            rebase_timestamps: false,
        }
    }
}

impl OdometryConfig {
    pub fn start_pose(&self) -> Pose {
        Pose {
            timestamp_ms: 0,
            x: self.start_x,
            y: self.start_y,
            theta_rad: crate::odometry::normalize_angle(self.start_heading_deg.to_radians()),
        }
    }
}

/// Everything the translator, sequencer and integrator need for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub link: LinkConfig,
    pub protocol: ProtocolConfig,
    pub turning_radius: f64,
    pub short_distance_threshold: f64,
    pub velocities: VelocityTable,
    pub segment_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub odometry: OdometryConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            protocol: ProtocolConfig::default(),
            turning_radius: TURNING_RADIUS,
            short_distance_threshold: SHORT_DISTANCE_THRESHOLD,
            velocities: VelocityTable::default(),
            segment_timeout_ms: SEGMENT_TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            odometry: OdometryConfig::default(),
        }
    }
}

/// Error types for loading and validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl DriveConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: DriveConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: display.clone(),
                source,
            })?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.turning_radius.is_finite() && self.turning_radius > 0.0) {
            return Err(invalid("turning_radius", self.turning_radius));
        }
        if !(self.short_distance_threshold.is_finite() && self.short_distance_threshold > 0.0) {
            return Err(invalid(
                "short_distance_threshold",
                self.short_distance_threshold,
            ));
        }
        for bucket in self.velocities.buckets() {
            for v in [bucket.short, bucket.long] {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(invalid("velocities", v));
                }
            }
        }
        if self.segment_timeout_ms == 0 {
            return Err(invalid("segment_timeout_ms", 0));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", 0));
        }
        if let VelocityEncoding::Scaled { factor: 0 } = self.protocol.velocity_encoding {
            return Err(invalid("protocol.velocity_encoding.factor", 0));
        }
        if self.link.baudrate == 0 {
            return Err(invalid("link.baudrate", 0));
        }
        // One blocking read must fit inside a poll step
        if self.link.read_timeout_ms > self.poll_interval_ms {
            return Err(ConfigError::Invalid {
                field: "link.read_timeout_ms",
                reason: format!(
                    "{} exceeds poll_interval_ms {}",
                    self.link.read_timeout_ms, self.poll_interval_ms
                ),
            });
        }
        Ok(())
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn invalid(field: &'static str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: format!("{} is out of range", value),
    }
}
