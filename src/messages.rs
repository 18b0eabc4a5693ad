// Define message types exchanged between the planner, the runtime and the controller

use serde::{Deserialize, Serialize};

/// Steering class of a planned segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Steering {
    Straight,
    Left,
    Right,
}

/// Gear of a planned segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gear {
    Forward,
    Backward,
    Neutral,
}

impl Gear {
    /// Wire character for the `G:` field
    pub fn code(self) -> char {
        match self {
            Gear::Forward => 'F',
            Gear::Backward => 'B',
            Gear::Neutral => 'N',
        }
    }
}

// Planner output -> runtime
// distance is in plan units (already divided by the turning radius upstream)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionPrimitive {
    pub steering: Steering,
    pub gear: Gear,
    pub distance: f64,
}

impl MotionPrimitive {
    pub fn new(steering: Steering, gear: Gear, distance: f64) -> Self {
        Self {
            steering,
            gear,
            distance,
        }
    }
}

/// Steering value as the controller understands it (`S:` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SteeringCode {
    Left,
    Right,
    Straight,
    Neutral,
}

impl SteeringCode {
    pub fn code(self) -> char {
        match self {
            SteeringCode::Left => 'L',
            SteeringCode::Right => 'R',
            SteeringCode::Straight => 'S',
            SteeringCode::Neutral => 'N',
        }
    }
}

// Runtime -> controller
// One command drives exactly one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub steering: SteeringCode,
    pub gear: Gear,
    pub velocity: f64,
    pub duration_ms: u64,
    pub use_controller: bool,
}

impl Command {
    /// Explicit stop: neutral steering and gear, zero velocity and duration
    pub fn stop() -> Self {
        Self {
            steering: SteeringCode::Neutral,
            gear: Gear::Neutral,
            velocity: 0.0,
            duration_ms: 0,
            use_controller: false,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.steering == SteeringCode::Neutral && self.gear == Gear::Neutral
    }
}

// Controller -> runtime, streamed while a command is active
// gyro_z is in degrees per second once decoded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp_ms: u64,
    pub desired_velocity: f64,
    pub actual_velocity: f64,
    pub error: f64,
    pub output: f64,
    pub gyro_z: f64,
}

/// Dead-reckoned robot pose, heading kept in (-pi, pi]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    pub timestamp_ms: u64,
    pub x: f64,
    pub y: f64,
    pub theta_rad: f64,
}

/// Final status of one plan execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Aborted,
}

/// Why a plan execution stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AbortReason {
    SegmentTimeout { segment: usize },
    LinkFailure { segment: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub segments_run: usize,
    pub telemetry: Vec<TelemetrySample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
}

impl ExecutionResult {
    pub fn is_link_failure(&self) -> bool {
        matches!(self.abort_reason, Some(AbortReason::LinkFailure { .. }))
    }
}
