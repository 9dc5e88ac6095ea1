//! Error types for effect handling

use crate::endpoint::EndpointError;
use lumi_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while resolving, encoding or sending a device update
#[derive(Error, Debug)]
pub enum EffectError {
    /// Malformed structured or hex color
    #[error("Invalid color format: {0}")]
    InvalidColorFormat(String),

    /// Palette size outside 1..=8
    #[error("Must provide 1-8 colors, got {0}")]
    InvalidColorCount(usize),

    #[error("Brightness must be an integer between 1 and 100, got {0}")]
    InvalidBrightness(String),

    #[error("Speed must be an integer between 1 and 100, got {0}")]
    InvalidSpeed(String),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    /// Dimming range minimum above maximum
    #[error("Dimming range minimum {min} is greater than maximum {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("Invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// Endpoint call failed or timed out mid-sequence
    #[error("Device write failed while {step}: {source}")]
    DeviceWriteFailure { step: String, source: EndpointError },

    /// Bridge shut down during a pacing delay
    #[error("Sequence cancelled")]
    Cancelled,

    #[error("Unsupported model: {0}")]
    UnknownModel(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EffectError {
    /// True for errors raised before anything was sent
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EffectError::InvalidColorFormat(_)
                | EffectError::InvalidColorCount(_)
                | EffectError::InvalidBrightness(_)
                | EffectError::InvalidSpeed(_)
                | EffectError::UnknownEffect(_)
                | EffectError::InvalidRange { .. }
                | EffectError::InvalidSetting { .. }
        )
    }
}

impl From<ProtocolError> for EffectError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidColorFormat(msg) => EffectError::InvalidColorFormat(msg),
            ProtocolError::InvalidColorCount(n) => EffectError::InvalidColorCount(n),
            other => EffectError::Protocol(other),
        }
    }
}
