// Planner primitives -> executable commands
//
// Degenerate (zero length) primitives are dropped, everything else gets a
// velocity from the policy and a duration from distance * turning radius / velocity.

use tracing::debug;

use super::velocity::VelocityPolicy;
use crate::config::DriveConfig;
use crate::messages::{Command, MotionPrimitive, Steering, SteeringCode};

/// Distances below this are treated as zero
pub const ZERO_DISTANCE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TranslateError {
    #[error("Invalid primitive at index {index}: distance {distance} must be a non-negative number")]
    InvalidPrimitive { index: usize, distance: f64 },
}

pub type Result<T> = std::result::Result<T, TranslateError>;

/// Turns primitives into commands using the configured velocity policy
#[derive(Debug, Clone, Copy)]
pub struct Translator {
    policy: VelocityPolicy,
    turning_radius: f64,
    mirror_steering: bool,
    use_controller: bool,
}

impl Translator {
    pub fn new(config: &DriveConfig) -> Self {
        Self {
            policy: VelocityPolicy::new(config.velocities, config.short_distance_threshold),
            turning_radius: config.turning_radius,
            mirror_steering: config.protocol.mirror_steering,
            use_controller: config.protocol.use_controller,
        }
    }

    /// Translate a whole plan, preserving order
    pub fn translate(&self, primitives: &[MotionPrimitive]) -> Result<Vec<Command>> {
        let mut commands = Vec::with_capacity(primitives.len());

        for (index, primitive) in primitives.iter().enumerate() {
            let distance = primitive.distance;
            if distance.abs() < ZERO_DISTANCE_TOLERANCE {
                debug!("Dropping zero-length primitive {}: {:?}", index, primitive);
                continue;
            }
            if !distance.is_finite() || distance < 0.0 {
                return Err(TranslateError::InvalidPrimitive { index, distance });
            }
            commands.push(self.command_for(primitive));
        }

        debug!(
            "Translated {} primitives into {} commands",
            primitives.len(),
            commands.len()
        );
        Ok(commands)
    }

    fn command_for(&self, primitive: &MotionPrimitive) -> Command {
        let velocity = self
            .policy
            .velocity(primitive.gear, primitive.steering, primitive.distance);

        Command {
            steering: self.steering_code(primitive.steering),
            gear: primitive.gear,
            velocity,
            duration_ms: duration_ms(primitive.distance, self.turning_radius, velocity),
            use_controller: self.use_controller,
        }
    }

    fn steering_code(&self, steering: Steering) -> SteeringCode {
        match (steering, self.mirror_steering) {
            (Steering::Straight, _) => SteeringCode::Straight,
            (Steering::Left, false) | (Steering::Right, true) => SteeringCode::Left,
            (Steering::Right, false) | (Steering::Left, true) => SteeringCode::Right,
        }
    }
}

/// Segment duration in ms, 0 when the segment does not move
pub fn duration_ms(distance: f64, turning_radius: f64, velocity: f64) -> u64 {
    if velocity == 0.0 {
        return 0;
    }
    (distance * turning_radius / velocity * 1000.0).round() as u64
}

/// Translate with a one-off translator built from `config`
pub fn translate(primitives: &[MotionPrimitive], config: &DriveConfig) -> Result<Vec<Command>> {
    Translator::new(config).translate(primitives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Gear;

    fn config(mirror: bool) -> DriveConfig {
        let mut config = DriveConfig::default();
        config.protocol.mirror_steering = mirror;
        config
    }

    #[test]
    fn test_duration_formula() {
        assert_eq!(duration_ms(0.5, 0.6, 0.8), 375);
        assert_eq!(duration_ms(0.1, 0.6, 1.1), 55);
        assert_eq!(duration_ms(2.0, 0.6, 0.0), 0);
    }

    #[test]
    fn test_long_straight_segment() {
        let plan = [MotionPrimitive::new(Steering::Straight, Gear::Forward, 0.5)];
        let commands = translate(&plan, &config(false)).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].velocity, 0.8);
        assert_eq!(commands[0].duration_ms, 375);
        assert_eq!(commands[0].steering, SteeringCode::Straight);
        assert!(commands[0].use_controller);
    }

    #[test]
    fn test_short_left_segment() {
        let plan = [MotionPrimitive::new(Steering::Left, Gear::Forward, 0.1)];
        let commands = translate(&plan, &config(false)).unwrap();
        assert_eq!(commands[0].velocity, 1.1);
        assert_eq!(commands[0].duration_ms, 55);
        assert_eq!(commands[0].steering, SteeringCode::Left);
    }

    #[test]
    fn test_zero_length_primitives_dropped() {
        let plan = [
            MotionPrimitive::new(Steering::Left, Gear::Forward, 0.0),
            MotionPrimitive::new(Steering::Straight, Gear::Backward, 1.0),
            MotionPrimitive::new(Steering::Right, Gear::Forward, 1e-12),
            MotionPrimitive::new(Steering::Right, Gear::Forward, -1e-11),
        ];
        let commands = translate(&plan, &config(false)).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].gear, Gear::Backward);
        assert_eq!(commands[0].velocity, 0.65);
    }

    #[test]
    fn test_negative_distance_rejected() {
        let plan = [
            MotionPrimitive::new(Steering::Straight, Gear::Forward, 1.0),
            MotionPrimitive::new(Steering::Left, Gear::Forward, -0.3),
        ];
        let err = translate(&plan, &config(false)).unwrap_err();
        assert_eq!(
            err,
            TranslateError::InvalidPrimitive {
                index: 1,
                distance: -0.3
            }
        );
    }

    #[test]
    fn test_nan_distance_rejected() {
        let plan = [MotionPrimitive::new(Steering::Left, Gear::Forward, f64::NAN)];
        assert!(translate(&plan, &config(false)).is_err());
    }

    #[test]
    fn test_neutral_gear_has_zero_duration() {
        let plan = [MotionPrimitive::new(Steering::Straight, Gear::Neutral, 2.0)];
        let commands = translate(&plan, &config(false)).unwrap();
        assert_eq!(commands[0].velocity, 0.0);
        assert_eq!(commands[0].duration_ms, 0);
    }

    #[test]
    fn test_mirrored_steering() {
        let plan = [
            MotionPrimitive::new(Steering::Left, Gear::Forward, 1.0),
            MotionPrimitive::new(Steering::Right, Gear::Forward, 1.0),
            MotionPrimitive::new(Steering::Straight, Gear::Forward, 1.0),
        ];
        let commands = translate(&plan, &config(true)).unwrap();
        let codes: Vec<char> = commands.iter().map(|c| c.steering.code()).collect();
        assert_eq!(codes, vec!['R', 'L', 'S']);
    }

    #[test]
    fn test_order_preserved() {
        let plan = [
            MotionPrimitive::new(Steering::Left, Gear::Forward, 0.2),
            MotionPrimitive::new(Steering::Straight, Gear::Backward, 0.9),
            MotionPrimitive::new(Steering::Right, Gear::Forward, 0.6),
        ];
        let commands = translate(&plan, &config(false)).unwrap();
        let gears: Vec<Gear> = commands.iter().map(|c| c.gear).collect();
        assert_eq!(gears, vec![Gear::Forward, Gear::Backward, Gear::Forward]);
        assert_eq!(commands[2].steering, SteeringCode::Right);
    }
}
