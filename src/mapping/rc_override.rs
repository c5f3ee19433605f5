//! RC_CHANNELS_OVERRIDE output
//!
//! Drives a single RC channel from one control axis. The PWM value is centred
//! on the midpoint of `[pwm_min, pwm_max]` for centred axes and starts at
//! `pwm_min` for the throttle axis. Every other channel is sent as 0, which
//! hands it back to the vehicle's own RC input.

use crate::link::TargetIds;
use crate::mapping::scaling::{ControlAxis, ScaledControl, AXIS_LIMIT, THROTTLE_MAX};
use crate::mapping::strategy::{OutputMode, OutputStrategy};
use crate::mapping::MappingError;
use mavlink::common::{MavMessage, RC_CHANNELS_OVERRIDE_DATA};
use serde::{Deserialize, Serialize};

/// Highest channel carried by the base RC_CHANNELS_OVERRIDE fields
pub const MAX_RC_CHANNEL: u8 = 8;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OverrideConfig {
    /// Control axis feeding the channel
    pub axis: ControlAxis,
    /// 1-based RC channel number
    pub rc_channel: u8,
    /// Flips the direction of the axis before it becomes PWM
    pub invert: bool,
    pub pwm_min: u16,
    pub pwm_max: u16,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        // Pitch is inverted in the default axis map; inverting again here means a
        // stick pushed towards a higher ABS_Y gives a higher PWM.
        Self {
            axis: ControlAxis::Pitch,
            rc_channel: 1,
            invert: true,
            pwm_min: 1000,
            pwm_max: 2000,
        }
    }
}

impl OverrideConfig {
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.rc_channel == 0 || self.rc_channel > MAX_RC_CHANNEL {
            return Err(MappingError::InvalidRcChannel(self.rc_channel));
        }
        if self.pwm_min >= self.pwm_max {
            return Err(MappingError::InvalidPwmRange {
                min: self.pwm_min,
                max: self.pwm_max,
            });
        }
        Ok(())
    }

    pub fn pwm_mid(&self) -> u16 {
        self.pwm_min + (self.pwm_max - self.pwm_min) / 2
    }
}

pub struct OverrideStrategy {
    config: OverrideConfig,
}

impl OverrideStrategy {
    pub fn new(config: OverrideConfig) -> Self {
        Self { config }
    }

    /// PWM value of the configured axis, always within `[pwm_min, pwm_max]`
    pub fn pwm(&self, control: &ScaledControl) -> u16 {
        let value = control.axis(self.config.axis) as f64;
        let min = self.config.pwm_min as f64;
        let max = self.config.pwm_max as f64;

        let pwm = if self.config.axis == ControlAxis::Throttle {
            let fraction = value / THROTTLE_MAX as f64;
            let fraction = if self.config.invert {
                1.0 - fraction
            } else {
                fraction
            };
            min + fraction * (max - min)
        } else {
            let fraction = value / AXIS_LIMIT as f64;
            let fraction = if self.config.invert {
                -fraction
            } else {
                fraction
            };
            self.config.pwm_mid() as f64 + fraction * (max - min) / 2.0
        };

        pwm.round().clamp(min, max) as u16
    }
}

impl OutputStrategy for OverrideStrategy {
    fn encode(&self, control: &ScaledControl, target: TargetIds) -> MavMessage {
        let pwm = self.pwm(control);
        let mut data = RC_CHANNELS_OVERRIDE_DATA {
            target_system: target.system,
            target_component: target.component,
            ..Default::default()
        };

        match self.config.rc_channel {
            1 => data.chan1_raw = pwm,
            2 => data.chan2_raw = pwm,
            3 => data.chan3_raw = pwm,
            4 => data.chan4_raw = pwm,
            5 => data.chan5_raw = pwm,
            6 => data.chan6_raw = pwm,
            7 => data.chan7_raw = pwm,
            8 => data.chan8_raw = pwm,
            // Rejected by OverrideConfig::validate before a strategy exists
            _ => {}
        }

        MavMessage::RC_CHANNELS_OVERRIDE(data)
    }

    fn mode(&self) -> OutputMode {
        OutputMode::Override
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target() -> TargetIds {
        TargetIds {
            system: 1,
            component: 1,
        }
    }

    fn pitch(x: i16) -> ScaledControl {
        ScaledControl {
            x,
            ..Default::default()
        }
    }

    #[test]
    fn default_config_follows_raw_stick_direction() {
        let strategy = OverrideStrategy::new(OverrideConfig::default());

        // Inverted pitch of -1000 corresponds to raw ABS_Y = 255
        assert_eq!(strategy.pwm(&pitch(-1000)), 2000);
        assert_eq!(strategy.pwm(&pitch(0)), 1500);
        assert_eq!(strategy.pwm(&pitch(1000)), 1000);
    }

    #[test]
    fn throttle_axis_starts_at_pwm_min() {
        let strategy = OverrideStrategy::new(OverrideConfig {
            axis: ControlAxis::Throttle,
            invert: false,
            ..Default::default()
        });
        let throttle = |z| ScaledControl {
            z,
            ..Default::default()
        };

        assert_eq!(strategy.pwm(&throttle(0)), 1000);
        assert_eq!(strategy.pwm(&throttle(500)), 1500);
        assert_eq!(strategy.pwm(&throttle(1000)), 2000);
    }

    #[test]
    fn encodes_only_the_configured_channel() {
        let strategy = OverrideStrategy::new(OverrideConfig {
            rc_channel: 3,
            invert: false,
            ..Default::default()
        });

        match strategy.encode(&pitch(500), target()) {
            MavMessage::RC_CHANNELS_OVERRIDE(data) => {
                assert_eq!(data.target_system, 1);
                assert_eq!(data.target_component, 1);
                assert_eq!(data.chan3_raw, 1750);
                assert_eq!(data.chan1_raw, 0);
                assert_eq!(data.chan2_raw, 0);
                assert_eq!(data.chan8_raw, 0);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_bad_channel_and_range() {
        let bad_channel = OverrideConfig {
            rc_channel: 9,
            ..Default::default()
        };
        assert!(matches!(
            bad_channel.validate(),
            Err(MappingError::InvalidRcChannel(9))
        ));

        let bad_range = OverrideConfig {
            pwm_min: 2000,
            pwm_max: 1000,
            ..Default::default()
        };
        assert!(matches!(
            bad_range.validate(),
            Err(MappingError::InvalidPwmRange { .. })
        ));
    }
}
