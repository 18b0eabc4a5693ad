// Dead reckoning from streamed telemetry
//
// Explicit Euler, position first using the heading from the previous step,
// then heading from the gyro rate:
//   x += v * cos(theta) * dt
//   y += v * sin(theta) * dt
//   theta += radians(gyro_z) * dt

use std::f64::consts::{PI, TAU};
use tracing::debug;

use crate::messages::{Pose, TelemetrySample};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OdometryError {
    #[error(
        "Telemetry sample {index} goes back in time: {timestamp_ms} ms after {previous_ms} ms"
    )]
    NonMonotonicTelemetry {
        index: usize,
        previous_ms: u64,
        timestamp_ms: u64,
    },
}

/// Wrap an angle into (-pi, pi]
pub fn normalize_angle(theta: f64) -> f64 {
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Running pose estimate
#[derive(Debug, Clone)]
pub struct OdometryIntegrator {
    pose: Pose,
    samples_seen: usize,
}

impl OdometryIntegrator {
    /// Seed from the start pose; integration starts at t = 0
    pub fn new(start: Pose) -> Self {
        Self {
            pose: Pose {
                timestamp_ms: 0,
                theta_rad: normalize_angle(start.theta_rad),
                ..start
            },
            samples_seen: 0,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Integrate one sample and return the pose at its timestamp
    pub fn update(&mut self, sample: &TelemetrySample) -> Result<Pose, OdometryError> {
        let index = self.samples_seen;
        let previous_ms = self.pose.timestamp_ms;
        let elapsed_ms = sample.timestamp_ms.checked_sub(previous_ms).ok_or(
            OdometryError::NonMonotonicTelemetry {
                index,
                previous_ms,
                timestamp_ms: sample.timestamp_ms,
            },
        )?;
        let dt = elapsed_ms as f64 / 1000.0;

        let theta = self.pose.theta_rad;
        self.pose.x += sample.actual_velocity * theta.cos() * dt;
        self.pose.y += sample.actual_velocity * theta.sin() * dt;
        self.pose.theta_rad = normalize_angle(theta + sample.gyro_z.to_radians() * dt);
        self.pose.timestamp_ms = sample.timestamp_ms;
        self.samples_seen += 1;

        Ok(self.pose)
    }
}

/// One pose per sample, in order. The log itself is never modified.
pub fn integrate(samples: &[TelemetrySample], start: Pose) -> Result<Vec<Pose>, OdometryError> {
    let mut integrator = OdometryIntegrator::new(start);
    let trajectory = samples
        .iter()
        .map(|sample| integrator.update(sample))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(last) = trajectory.last() {
        debug!(
            "Integrated {} samples, final pose x={:.3} y={:.3} theta={:.3}",
            trajectory.len(),
            last.x,
            last.y,
            last.theta_rad
        );
    }
    Ok(trajectory)
}
