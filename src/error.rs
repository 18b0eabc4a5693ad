// Top level error type for the runtime

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::odometry::OdometryError;
use crate::plan::TranslateError;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Odometry(#[from] OdometryError),

    #[error("Failed to read {path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Failed to write report: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid argument {name}: {value}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("Plan aborted by link failure at segment {segment}: {message}")]
    LinkAborted { segment: usize, message: String },
}

pub type Result<T> = std::result::Result<T, DriveError>;
