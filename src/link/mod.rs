// Serial link to the motion controller
//
// Provides:
// - Command framing for the ASCII wire protocol
// - A line oriented channel over the serial device

pub mod channel;
pub mod frame;

pub use channel::{CommandChannel, LinkError};
pub use frame::FrameFormat;
