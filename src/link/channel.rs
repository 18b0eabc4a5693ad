// Serial command channel to the motion controller
//
// Outbound: one framed command per line, flushed before it counts as dispatched.
// Inbound: '\n' delimited ASCII lines; anything else is noise and dropped.

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, info, trace, warn};

use super::frame::FrameFormat;
use crate::config::LinkConfig;
use crate::messages::Command;

/// Longest partial line kept while waiting for its newline
pub const MAX_LINE_LEN: usize = 4096;

const READ_CHUNK: usize = 256;

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        source: serialport::Error,
    },

    #[error("Serial link failure: {0}")]
    LinkFailure(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Line oriented command channel over any byte stream
pub struct CommandChannel<P> {
    port: P,
    format: FrameFormat,
    inbound: Vec<u8>,
}

impl CommandChannel<Box<dyn SerialPort>> {
    /// Open and configure the serial device (8N1, no flow control)
    pub fn open(link: &LinkConfig, format: FrameFormat) -> Result<Self> {
        let port = serialport::new(&link.port, link.baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(link.read_timeout())
            .open()
            .map_err(|source| LinkError::PortUnavailable {
                port: link.port.clone(),
                source,
            })?;

        info!("Opened serial port {} at {} baud", link.port, link.baudrate);
        Ok(Self::new(port, format))
    }
}

impl<P: Read + Write> CommandChannel<P> {
    pub fn new(port: P, format: FrameFormat) -> Self {
        Self {
            port,
            format,
            inbound: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Encode, write and flush one command
    pub fn send(&mut self, command: &Command) -> Result<()> {
        let frame = self.format.encode(command);
        debug!("Sending frame: {}", frame.trim_end());
        self.port.write_all(frame.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Next complete inbound line, or `None` if nothing is ready yet.
    ///
    /// Performs at most one read on the device, so it returns within the
    /// device's read timeout.
    pub fn poll_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => self.inbound.extend_from_slice(&chunk[..n]),
            Err(e) if is_no_data(&e) => return Ok(None),
            Err(e) => return Err(LinkError::LinkFailure(e)),
        }

        let line = self.take_line();
        if line.is_none() && self.inbound.len() > MAX_LINE_LEN {
            warn!(
                "Discarding {} bytes of unterminated input",
                self.inbound.len()
            );
            self.inbound.clear();
        }
        Ok(line)
    }

    /// Pop the first complete, non-empty ASCII line from the buffer
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.inbound.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.inbound.drain(..=pos).collect();
            if !raw.is_ascii() {
                debug!("Discarding non-ASCII line ({} bytes)", raw.len());
                continue;
            }
            // ASCII is always valid UTF-8
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if line.is_empty() {
                trace!("Skipping empty line");
                continue;
            }
            return Some(line);
        }
        None
    }
}

fn is_no_data(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}
