//! Error definitions for the mapping module

use thiserror::Error;

/// Errors raised while building or validating a mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// Invalid axis or output configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Override channel outside 1..=8
    #[error("RC override channel {0} is out of range (1-8)")]
    InvalidRcChannel(u8),

    /// PWM bounds that cannot describe a channel
    #[error("Invalid PWM range: min {min} must be below max {max}")]
    InvalidPwmRange { min: u16, max: u16 },
}
