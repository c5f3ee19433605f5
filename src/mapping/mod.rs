//! Turning merged controller state into MAVLink control messages.
//!
//! [`scaling`] maps raw channel values into protocol ranges and assembles a
//! [`ScaledControl`]; an [`OutputStrategy`] then encodes that into the message
//! shape of the configured [`OutputMode`].

pub mod error;
pub mod manual_control;
pub mod rc_override;
pub mod scaling;
pub mod strategy;

pub use error::MappingError;
pub use rc_override::OverrideConfig;
pub use scaling::{AxisMap, AxisMapping, ControlAxis, ScaleKind, ScaledControl};
pub use strategy::{OutputMode, OutputStrategy};
