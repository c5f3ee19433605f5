//! Trait definitions for output strategies
//!
//! An output strategy decides which MAVLink message a tick's [`ScaledControl`]
//! becomes. Both deployments of the bridge share one pipeline and differ only in
//! the strategy picked at startup.

use crate::link::TargetIds;
use crate::mapping::manual_control::ManualControlStrategy;
use crate::mapping::rc_override::{OverrideConfig, OverrideStrategy};
use crate::mapping::scaling::ScaledControl;
use crate::mapping::MappingError;
use mavlink::common::MavMessage;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::time::Duration;

/// Message shape sent on every tick
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Four axes plus buttons in one MANUAL_CONTROL message
    #[default]
    ManualControl,

    /// A single RC_CHANNELS_OVERRIDE channel carrying a PWM value
    Override,
}

impl Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::ManualControl => write!(f, "manual-control"),
            OutputMode::Override => write!(f, "override"),
        }
    }
}

impl OutputMode {
    /// Tick interval used when the configuration does not set one
    pub fn default_tick_interval(&self) -> Duration {
        match self {
            OutputMode::ManualControl => Duration::from_millis(100),
            OutputMode::Override => Duration::from_millis(50),
        }
    }

    /// Builds the strategy for this mode
    pub fn create_strategy(
        &self,
        override_config: &OverrideConfig,
    ) -> Result<Box<dyn OutputStrategy>, MappingError> {
        match self {
            OutputMode::ManualControl => Ok(Box::new(ManualControlStrategy)),
            OutputMode::Override => {
                override_config.validate()?;
                Ok(Box::new(OverrideStrategy::new(override_config.clone())))
            }
        }
    }
}

/// Turns scaled control values into exactly one wire message
pub trait OutputStrategy: Send + Sync + 'static {
    fn encode(&self, control: &ScaledControl, target: TargetIds) -> MavMessage;

    fn mode(&self) -> OutputMode;
}
