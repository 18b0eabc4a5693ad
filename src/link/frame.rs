// Outbound command framing
//
// Frame format (ASCII, one per line):
// [[S:<steering>,G:<gear>,V:<velocity>,C:<0|1>]            acknowledged segments
// [[S:<steering>,G:<gear>,V:<velocity>,C:<0|1>,D:<ms>]     duration-bearing variant
//
// The doubled '[' is intentional: the controller resyncs on it.

use std::fmt::Write;

use crate::config::VelocityEncoding;
use crate::messages::Command;

/// Frame layout for one link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFormat {
    pub velocity: VelocityEncoding,
    pub send_duration: bool,
}

impl FrameFormat {
    pub fn new(velocity: VelocityEncoding, send_duration: bool) -> Self {
        Self {
            velocity,
            send_duration,
        }
    }

    /// Encode a command, newline terminated
    pub fn encode(&self, command: &Command) -> String {
        let mut frame = format!(
            "[[S:{},G:{},V:{},C:{}",
            command.steering.code(),
            command.gear.code(),
            self.velocity_field(command.velocity),
            u8::from(command.use_controller)
        );
        if self.send_duration {
            // Writing to a String cannot fail
            let _ = write!(frame, ",D:{}", command.duration_ms);
        }
        frame.push_str("]\n");
        frame
    }

    fn velocity_field(&self, velocity: f64) -> String {
        match self.velocity {
            VelocityEncoding::Raw => format!("{}", velocity),
            VelocityEncoding::Scaled { factor } => {
                format!("{}", (velocity * f64::from(factor)).trunc() as i64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Gear, SteeringCode};

    fn command(steering: SteeringCode, gear: Gear, velocity: f64, duration_ms: u64) -> Command {
        Command {
            steering,
            gear,
            velocity,
            duration_ms,
            use_controller: true,
        }
    }

    #[test]
    fn test_scaled_frame() {
        let format = FrameFormat::new(VelocityEncoding::Scaled { factor: 100 }, false);
        let frame = format.encode(&command(SteeringCode::Right, Gear::Forward, 0.45, 1200));
        assert_eq!(frame, "[[S:R,G:F,V:45,C:1]\n");
    }

    #[test]
    fn test_scaled_velocity_truncates() {
        let format = FrameFormat::new(VelocityEncoding::Scaled { factor: 10 }, false);
        let frame = format.encode(&command(SteeringCode::Left, Gear::Backward, 0.65, 0));
        assert_eq!(frame, "[[S:L,G:B,V:6,C:1]\n");
    }

    #[test]
    fn test_raw_frame_with_duration() {
        let format = FrameFormat::new(VelocityEncoding::Raw, true);
        let frame = format.encode(&command(SteeringCode::Straight, Gear::Forward, 0.8, 375));
        assert_eq!(frame, "[[S:S,G:F,V:0.8,C:1,D:375]\n");
    }

    #[test]
    fn test_stop_frame() {
        let format = FrameFormat::new(VelocityEncoding::Scaled { factor: 100 }, true);
        assert_eq!(format.encode(&Command::stop()), "[[S:N,G:N,V:0,C:0,D:0]\n");

        let format = FrameFormat::new(VelocityEncoding::Raw, false);
        assert_eq!(format.encode(&Command::stop()), "[[S:N,G:N,V:0,C:0]\n");
    }

    #[test]
    fn test_frame_is_ascii() {
        let format = FrameFormat::new(VelocityEncoding::Raw, true);
        let frame = format.encode(&command(SteeringCode::Left, Gear::Forward, 1.1, 55));
        assert!(frame.is_ascii());
        assert!(frame.ends_with('\n'));
        assert_eq!(frame.matches('\n').count(), 1);
    }
}
