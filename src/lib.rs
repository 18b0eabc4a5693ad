// Host-side runtime for driving a car-like robot segment by segment over UART
//
// planner primitives -> plan (velocity + duration) -> sequencer over link
// -> telemetry log -> odometry (dead-reckoned trajectory)

pub mod config;
pub mod error;
pub mod link;
pub mod messages;
pub mod odometry;
pub mod plan;
pub mod runtime;
pub mod sequencer;
pub mod telemetry;

pub use error::{DriveError, Result};
