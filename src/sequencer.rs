// Segment sequencer: one command in flight, wait for completion or timeout
//
// Idle -> Dispatching -> AwaitingCompletion -> Completed | TimedOut
//      -> next segment | Aborted | AllDone
//
// Every plan execution ends with exactly one stop command, whatever the outcome.

use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::{CompletionMode, DriveConfig, TelemetryScaling};
use crate::link::{CommandChannel, LinkError};
use crate::messages::{AbortReason, Command, ExecutionResult, ExecutionStatus, TelemetrySample};
use crate::telemetry::{decode_line, InboundLine};

/// Protocol state of the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Idle,
    Dispatching,
    AwaitingCompletion,
    Completed,
    TimedOut,
    Aborted,
    AllDone,
}

/// Timing and decoding settings for one link
#[derive(Debug, Clone, Copy)]
pub struct SequencerSettings {
    pub segment_timeout: Duration,
    pub poll_interval: Duration,
    pub completion: CompletionMode,
    pub scaling: TelemetryScaling,
}

impl From<&DriveConfig> for SequencerSettings {
    fn from(config: &DriveConfig) -> Self {
        Self {
            segment_timeout: config.segment_timeout(),
            poll_interval: config.poll_interval(),
            completion: config.protocol.completion,
            scaling: config.protocol.telemetry_scaling,
        }
    }
}

enum SegmentOutcome {
    Completed,
    TimedOut,
}

pub struct SegmentSequencer<P> {
    channel: CommandChannel<P>,
    settings: SequencerSettings,
    state: SegmentState,
    telemetry: Vec<TelemetrySample>,
    malformed_lines: usize,
}

impl<P: Read + Write> SegmentSequencer<P> {
    pub fn new(channel: CommandChannel<P>, settings: SequencerSettings) -> Self {
        Self {
            channel,
            settings,
            state: SegmentState::Idle,
            telemetry: Vec::new(),
            malformed_lines: 0,
        }
    }

    fn enter(&mut self, next: SegmentState) {
        trace!("Sequencer {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run a whole plan. The channel is released when this returns.
    pub fn execute(mut self, commands: &[Command]) -> ExecutionResult {
        info!("Executing plan of {} segments", commands.len());
        let mut segments_run = 0;
        let mut abort_reason = None;

        for (index, command) in commands.iter().enumerate() {
            match self.run_segment(index, command) {
                Ok(SegmentOutcome::Completed) => {
                    self.enter(SegmentState::Completed);
                    segments_run += 1;
                }
                Ok(SegmentOutcome::TimedOut) => {
                    self.enter(SegmentState::TimedOut);
                    warn!(
                        "Timeout waiting for segment {} after {:?}, aborting",
                        index, self.settings.segment_timeout
                    );
                    abort_reason = Some(AbortReason::SegmentTimeout { segment: index });
                    break;
                }
                Err(e) => {
                    warn!("Link failure during segment {}: {}", index, e);
                    abort_reason = Some(AbortReason::LinkFailure {
                        segment: index,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        let status = if abort_reason.is_some() {
            let discarded = commands.len().saturating_sub(segments_run + 1);
            if discarded > 0 {
                info!("Discarding {} remaining segments", discarded);
            }
            self.enter(SegmentState::Aborted);
            ExecutionStatus::Aborted
        } else {
            info!("All {} segments completed", segments_run);
            self.enter(SegmentState::AllDone);
            ExecutionStatus::Completed
        };

        self.send_stop();

        if self.malformed_lines > 0 {
            debug!("Skipped {} malformed telemetry lines", self.malformed_lines);
        }
        ExecutionResult {
            status,
            segments_run,
            telemetry: self.telemetry,
            abort_reason,
        }
    }

    /// Send one command and record telemetry for a fixed window, then stop.
    ///
    /// No completion handshake: used for bench runs where the controller keeps
    /// streaming until told otherwise.
    pub fn capture(
        mut self,
        command: &Command,
        window: Duration,
    ) -> Result<Vec<TelemetrySample>, LinkError> {
        info!("Capturing telemetry for {:?}: {:?}", window, command);
        let outcome = self.collect_for(command, window);
        self.enter(match outcome {
            Ok(()) => SegmentState::AllDone,
            Err(_) => SegmentState::Aborted,
        });
        self.send_stop();
        outcome.map(|()| self.telemetry)
    }

    fn collect_for(&mut self, command: &Command, window: Duration) -> Result<(), LinkError> {
        self.enter(SegmentState::Dispatching);
        self.channel.send(command)?;
        self.enter(SegmentState::AwaitingCompletion);

        let until = Instant::now() + window;
        loop {
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            match self.channel.poll_line()? {
                Some(line) => {
                    if self.handle_line(&line) {
                        debug!("Ignoring completion signal during capture");
                    }
                }
                None => self.idle_until(now, until),
            }
        }
    }

    fn run_segment(&mut self, index: usize, command: &Command) -> Result<SegmentOutcome, LinkError> {
        self.enter(SegmentState::Dispatching);
        info!(
            "Sending segment {}: steering={}, gear={}, velocity={}, duration={}ms",
            index,
            command.steering.code(),
            command.gear.code(),
            command.velocity,
            command.duration_ms
        );
        self.channel.send(command)?;

        self.enter(SegmentState::AwaitingCompletion);
        let started = Instant::now();
        let deadline = started + self.settings.segment_timeout;
        let self_timed_end = match self.settings.completion {
            CompletionMode::Acknowledged => None,
            CompletionMode::SelfTimed { grace_ms } => Some(
                started + Duration::from_millis(command.duration_ms.saturating_add(grace_ms)),
            ),
        };

        loop {
            let now = Instant::now();
            if self_timed_end.is_some_and(|end| now >= end) {
                debug!("Segment {} elapsed its own duration", index);
                return Ok(SegmentOutcome::Completed);
            }
            // Deadline holds even while lines keep arriving
            if now >= deadline {
                return Ok(SegmentOutcome::TimedOut);
            }

            match self.channel.poll_line()? {
                Some(line) => {
                    if self.handle_line(&line) {
                        info!(
                            "Segment {} completed in {:?}",
                            index,
                            started.elapsed()
                        );
                        return Ok(SegmentOutcome::Completed);
                    }
                }
                None => {
                    let wake = self_timed_end.map_or(deadline, |end| end.min(deadline));
                    self.idle_until(now, wake);
                }
            }
        }
    }

    /// Decode a line, appending telemetry. Returns true for the completion signal.
    fn handle_line(&mut self, line: &str) -> bool {
        match decode_line(line, self.settings.scaling) {
            Ok(InboundLine::Completion) => true,
            Ok(InboundLine::Telemetry(sample)) => {
                self.telemetry.push(sample);
                false
            }
            Err(e) => {
                debug!("Discarding malformed telemetry {:?}: {}", line, e);
                self.malformed_lines += 1;
                false
            }
        }
    }

    /// Back off between polls without sleeping past `wake`
    fn idle_until(&self, now: Instant, wake: Instant) {
        let remaining = wake.saturating_duration_since(now);
        std::thread::sleep(self.settings.poll_interval.min(remaining));
    }

    fn send_stop(&mut self) {
        info!("Sending stop command");
        if let Err(e) = self.channel.send(&Command::stop()) {
            warn!("Failed to send stop command: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VelocityEncoding;
    use crate::link::channel::mock::ScriptedPort;
    use crate::link::FrameFormat;
    use crate::messages::{Gear, SteeringCode};

    const STOP_FRAME: &str = "[[S:N,G:N,V:0,C:0]";

    fn settings(timeout_ms: u64, completion: CompletionMode) -> SequencerSettings {
        SequencerSettings {
            segment_timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(1),
            completion,
            scaling: TelemetryScaling::Milli,
        }
    }

    fn sequencer(port: &ScriptedPort, settings: SequencerSettings) -> SegmentSequencer<ScriptedPort> {
        let format = FrameFormat::new(VelocityEncoding::Scaled { factor: 100 }, false);
        SegmentSequencer::new(CommandChannel::new(port.clone(), format), settings)
    }

    fn forward(duration_ms: u64) -> Command {
        Command {
            steering: SteeringCode::Straight,
            gear: Gear::Forward,
            velocity: 0.8,
            duration_ms,
            use_controller: true,
        }
    }

    fn left() -> Command {
        Command {
            steering: SteeringCode::Left,
            gear: Gear::Backward,
            velocity: 0.45,
            duration_ms: 800,
            use_controller: true,
        }
    }

    #[test]
    fn test_all_segments_complete() {
        let port = ScriptedPort::new()
            .respond("100,500,480,20,100,1500\n110,500,490,10,90,0\n1\n")
            .respond("200,450,440,10,50,-2000\n1\n");
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));

        let result = seq.execute(&[forward(375), left()]);

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.segments_run, 2);
        assert_eq!(result.abort_reason, None);
        let ts: Vec<u64> = result.telemetry.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(ts, vec![100, 110, 200]);
        assert_eq!(
            port.written_lines(),
            vec!["[[S:S,G:F,V:80,C:1]", "[[S:L,G:B,V:45,C:1]", STOP_FRAME]
        );
    }

    #[test]
    fn test_timeout_aborts_and_stops() {
        let port = ScriptedPort::new()
            .respond("100,500,480,20,100,1500\n1\n")
            .respond("200,500,480,20,100,1500\n");
        let seq = sequencer(&port, settings(30, CompletionMode::Acknowledged));

        let result = seq.execute(&[forward(375), left(), forward(100)]);

        assert_eq!(result.status, ExecutionStatus::Aborted);
        assert_eq!(result.segments_run, 1);
        assert_eq!(
            result.abort_reason,
            Some(AbortReason::SegmentTimeout { segment: 1 })
        );
        assert_eq!(result.telemetry.len(), 2);
        let written = port.written_lines();
        assert_eq!(written.len(), 3);
        assert_eq!(written.last().map(String::as_str), Some(STOP_FRAME));
        assert_eq!(written.iter().filter(|l| *l == STOP_FRAME).count(), 1);
    }

    #[test]
    fn test_link_failure_aborts() {
        let port = ScriptedPort::new().respond("1\n").fail_writes_after(1);
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));

        let result = seq.execute(&[forward(375), left()]);

        assert_eq!(result.status, ExecutionStatus::Aborted);
        assert_eq!(result.segments_run, 1);
        assert!(result.is_link_failure());
        assert!(matches!(
            result.abort_reason,
            Some(AbortReason::LinkFailure { segment: 1, .. })
        ));
        assert_eq!(port.written_lines(), vec!["[[S:S,G:F,V:80,C:1]"]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let port = ScriptedPort::new()
            .respond("boot ok\n100,500,480,20,100,1500\n1,2,3\n110,x,1,1,1,1\n120,1,1,1,1,1\n1\n");
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));

        let result = seq.execute(&[forward(375)]);

        assert_eq!(result.status, ExecutionStatus::Completed);
        let ts: Vec<u64> = result.telemetry.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(ts, vec![100, 120]);
    }

    #[test]
    fn test_lines_after_completion_belong_to_next_segment() {
        let port = ScriptedPort::new()
            .respond("1\n300,1,1,1,1,1\n")
            .respond("1\n");
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));

        let result = seq.execute(&[forward(100), left()]);

        assert_eq!(result.segments_run, 2);
        assert_eq!(result.telemetry.len(), 1);
        assert_eq!(result.telemetry[0].timestamp_ms, 300);
    }

    #[test]
    fn test_empty_plan_still_stops() {
        let port = ScriptedPort::new();
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));

        let result = seq.execute(&[]);

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.segments_run, 0);
        assert_eq!(port.written_lines(), vec![STOP_FRAME]);
    }

    /// Controller that never goes quiet: every read yields a fresh telemetry line
    struct StreamingPort {
        next_ms: u64,
    }

    impl Read for StreamingPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.next_ms += 1;
            let line = format!("{},500,480,20,100,1500\n", self.next_ms);
            let n = line.len().min(buf.len());
            buf[..n].copy_from_slice(&line.as_bytes()[..n]);
            Ok(n)
        }
    }

    impl Write for StreamingPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_continuous_telemetry_does_not_extend_deadline() {
        let timeout = Duration::from_millis(50);
        let format = FrameFormat::new(VelocityEncoding::Scaled { factor: 100 }, false);
        let channel = CommandChannel::new(StreamingPort { next_ms: 0 }, format);
        let seq = SegmentSequencer::new(channel, settings(50, CompletionMode::Acknowledged));

        let started = Instant::now();
        let result = seq.execute(&[forward(375), left()]);
        let elapsed = started.elapsed();

        assert_eq!(result.status, ExecutionStatus::Aborted);
        assert_eq!(
            result.abort_reason,
            Some(AbortReason::SegmentTimeout { segment: 0 })
        );
        assert_eq!(result.segments_run, 0);
        assert!(!result.telemetry.is_empty());
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(500), "took {:?}", elapsed);
    }

    #[test]
    fn test_self_timed_segments_complete_without_ack() {
        let port = ScriptedPort::new()
            .respond("100,500,480,20,100,1500\n")
            .respond("");
        let seq = sequencer(&port, settings(2000, CompletionMode::SelfTimed { grace_ms: 5 }));

        let result = seq.execute(&[forward(5), forward(5)]);

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.segments_run, 2);
        assert_eq!(result.telemetry.len(), 1);
        assert_eq!(port.written_lines().len(), 3);
    }

    #[test]
    fn test_capture_collects_then_stops() {
        let port = ScriptedPort::new().respond("10,0,0,0,0,1000000\n20,0,0,0,0,2000000\n1\n");
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));

        let samples = seq.capture(&forward(0), Duration::from_millis(20)).unwrap();

        assert_eq!(samples.len(), 2);
        assert!((samples[1].gyro_z - 2.0).abs() < 1e-12);
        let written = port.written_lines();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1], STOP_FRAME);
    }

    #[test]
    fn test_capture_write_failure() {
        let port = ScriptedPort::new().fail_writes_after(0);
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));
        assert!(seq.capture(&forward(0), Duration::from_millis(5)).is_err());
    }

    #[test]
    fn test_starts_idle() {
        let port = ScriptedPort::new();
        let seq = sequencer(&port, settings(1000, CompletionMode::Acknowledged));
        assert_eq!(seq.state, SegmentState::Idle);
    }
}
