//! Scaling Engine
//!
//! Pure transfer functions from raw 8-bit device units into the value ranges
//! MAVLink control messages expect, plus the configurable axis assignment that
//! decides which device channel drives which control axis.
//!
//! Raw values are always clamped to `[0, 255]` first, never rejected.
//!
//! ```text
//!   raw    bidirectional   throttle
//!     0        -1000           0
//!   128            0         502
//!   255        +1000        1000
//! ```

use crate::controller::channel_state::InputState;
use crate::mapping::MappingError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RAW_MIN: i32 = 0;
pub const RAW_MID: i32 = 128;
pub const RAW_MAX: i32 = 255;

/// Full-scale value of a centred axis (x, y, r)
pub const AXIS_LIMIT: i16 = 1000;
/// Full-scale value of the throttle axis (z)
pub const THROTTLE_MAX: i16 = 1000;

/// Centred axis: 0 → -1000, 128 → 0, 255 → +1000
///
/// The input is not symmetric around 128 (128 steps below, 127 above), so each
/// half gets its own gain; that way both extremes are reachable and the midpoint
/// is exactly zero.
pub fn scale_bidirectional(raw: i32, invert: bool) -> i16 {
    let offset = raw.clamp(RAW_MIN, RAW_MAX) - RAW_MID;
    let span = if offset < 0 {
        RAW_MID - RAW_MIN
    } else {
        RAW_MAX - RAW_MID
    };
    let scaled = (offset as f64 * AXIS_LIMIT as f64 / span as f64).round() as i16;
    if invert {
        -scaled
    } else {
        scaled
    }
}

/// Unidirectional throttle: 0 → 0, 255 → [`THROTTLE_MAX`]
pub fn scale_throttle(raw: i32, invert: bool) -> i16 {
    let raw = raw.clamp(RAW_MIN, RAW_MAX);
    let scaled = (raw as f64 / RAW_MAX as f64 * THROTTLE_MAX as f64).round() as i16;
    if invert {
        THROTTLE_MAX - scaled
    } else {
        scaled
    }
}

/// Transfer curve of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    Bidirectional,
    Throttle,
}

/// Logical control axes of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAxis {
    Roll,
    Pitch,
    Yaw,
    Throttle,
}

impl fmt::Display for ControlAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAxis::Roll => write!(f, "roll"),
            ControlAxis::Pitch => write!(f, "pitch"),
            ControlAxis::Yaw => write!(f, "yaw"),
            ControlAxis::Throttle => write!(f, "throttle"),
        }
    }
}

/// Where one control axis takes its value from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AxisMapping {
    /// Device channel code, e.g. `ABS_Y`
    pub source: String,
    #[serde(default)]
    pub invert: bool,
    pub curve: ScaleKind,
    /// Raw value assumed until the device reports this channel
    pub initial: i32,
}

impl AxisMapping {
    pub fn new(source: &str, invert: bool, curve: ScaleKind, initial: i32) -> Self {
        Self {
            source: source.to_string(),
            invert,
            curve,
            initial,
        }
    }

    pub fn scale(&self, raw: i32) -> i16 {
        match self.curve {
            ScaleKind::Bidirectional => scale_bidirectional(raw, self.invert),
            ScaleKind::Throttle => scale_throttle(raw, self.invert),
        }
    }
}

/// One tick's worth of control output
///
/// Axis naming follows MAVLink MANUAL_CONTROL: `x` pitch, `y` roll,
/// `z` throttle, `r` yaw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaledControl {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub r: i16,
    pub buttons: u16,
}

impl ScaledControl {
    pub fn axis(&self, axis: ControlAxis) -> i16 {
        match axis {
            ControlAxis::Pitch => self.x,
            ControlAxis::Roll => self.y,
            ControlAxis::Throttle => self.z,
            ControlAxis::Yaw => self.r,
        }
    }

    fn set_axis(&mut self, axis: ControlAxis, value: i16) {
        match axis {
            ControlAxis::Pitch => self.x = value,
            ControlAxis::Roll => self.y = value,
            ControlAxis::Throttle => self.z = value,
            ControlAxis::Yaw => self.r = value,
        }
    }
}

/// Axis assignment table, `{axis: (source channel, invert, curve)}`
///
/// Axes left out of a config file keep their default mapping.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AxisMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<AxisMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<AxisMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<AxisMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<AxisMapping>,
}

impl Default for AxisMap {
    /// Mapping for a typical flight stick
    fn default() -> Self {
        Self::empty()
            .with(
                ControlAxis::Roll,
                AxisMapping::new("ABS_X", false, ScaleKind::Bidirectional, RAW_MID),
            )
            .with(
                ControlAxis::Pitch,
                AxisMapping::new("ABS_Y", true, ScaleKind::Bidirectional, RAW_MID),
            )
            .with(
                ControlAxis::Yaw,
                AxisMapping::new("ABS_Z", false, ScaleKind::Bidirectional, RAW_MID),
            )
            .with(
                ControlAxis::Throttle,
                AxisMapping::new("ABS_RZ", false, ScaleKind::Throttle, RAW_MIN),
            )
    }
}

impl AxisMap {
    pub fn empty() -> Self {
        Self {
            roll: None,
            pitch: None,
            yaw: None,
            throttle: None,
        }
    }

    pub fn with(mut self, axis: ControlAxis, mapping: AxisMapping) -> Self {
        let slot = match axis {
            ControlAxis::Roll => &mut self.roll,
            ControlAxis::Pitch => &mut self.pitch,
            ControlAxis::Yaw => &mut self.yaw,
            ControlAxis::Throttle => &mut self.throttle,
        };
        *slot = Some(mapping);
        self
    }

    pub fn get(&self, axis: ControlAxis) -> Option<&AxisMapping> {
        match axis {
            ControlAxis::Roll => self.roll.as_ref(),
            ControlAxis::Pitch => self.pitch.as_ref(),
            ControlAxis::Yaw => self.yaw.as_ref(),
            ControlAxis::Throttle => self.throttle.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControlAxis, &AxisMapping)> + '_ {
        [
            ControlAxis::Roll,
            ControlAxis::Pitch,
            ControlAxis::Yaw,
            ControlAxis::Throttle,
        ]
        .into_iter()
        .filter_map(|axis| self.get(axis).map(|mapping| (axis, mapping)))
    }

    /// Start-of-process raw values per source channel
    pub fn initial_values(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.iter()
            .map(|(_, mapping)| (mapping.source.as_str(), mapping.initial))
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        for (axis, mapping) in self.iter() {
            if mapping.source.trim().is_empty() {
                return Err(MappingError::ConfigError(format!(
                    "Axis {} has no source channel",
                    axis
                )));
            }
            if !(RAW_MIN..=RAW_MAX).contains(&mapping.initial) {
                return Err(MappingError::ConfigError(format!(
                    "Initial value {} of axis {} is outside {}..={}",
                    mapping.initial, axis, RAW_MIN, RAW_MAX
                )));
            }
        }
        Ok(())
    }

    /// Computes the control output from the current merged state
    ///
    /// Axes without a mapping stay at 0.
    pub fn scale(&self, state: &InputState) -> ScaledControl {
        let mut control = ScaledControl {
            buttons: state.buttons.bits(),
            ..Default::default()
        };

        for (axis, mapping) in self.iter() {
            let raw = state
                .channels
                .get(&mapping.source)
                .unwrap_or(mapping.initial);
            control.set_axis(axis, mapping.scale(raw));
        }

        control
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ButtonIndexing, RawEvent};
    use pretty_assertions::assert_eq;

    #[test]
    fn bidirectional_midpoint_is_exactly_zero() {
        assert_eq!(scale_bidirectional(128, false), 0);
        assert_eq!(scale_bidirectional(128, true), 0);
    }

    #[test]
    fn bidirectional_extremes_hit_the_bounds() {
        assert_eq!(scale_bidirectional(0, false), -AXIS_LIMIT);
        assert_eq!(scale_bidirectional(255, false), AXIS_LIMIT);
        assert_eq!(scale_bidirectional(0, true), AXIS_LIMIT);
        assert_eq!(scale_bidirectional(255, true), -AXIS_LIMIT);
    }

    #[test]
    fn bidirectional_is_monotonic() {
        let mut previous = scale_bidirectional(0, false);
        let mut previous_inverted = scale_bidirectional(0, true);
        for raw in 1..=255 {
            let value = scale_bidirectional(raw, false);
            let inverted = scale_bidirectional(raw, true);
            assert!(value >= previous, "not non-decreasing at {}", raw);
            assert!(inverted <= previous_inverted, "not non-increasing at {}", raw);
            previous = value;
            previous_inverted = inverted;
        }
    }

    #[test]
    fn out_of_range_raw_values_are_clamped() {
        assert_eq!(scale_bidirectional(-40, false), -AXIS_LIMIT);
        assert_eq!(scale_bidirectional(4096, false), AXIS_LIMIT);
        assert_eq!(scale_throttle(-1, false), 0);
        assert_eq!(scale_throttle(300, false), THROTTLE_MAX);
    }

    #[test]
    fn throttle_endpoints_and_monotonicity() {
        assert_eq!(scale_throttle(0, false), 0);
        assert_eq!(scale_throttle(255, false), THROTTLE_MAX);

        let mut previous = 0;
        for raw in 0..=255 {
            let value = scale_throttle(raw, false);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn inverted_throttle_runs_backwards() {
        assert_eq!(scale_throttle(0, true), THROTTLE_MAX);
        assert_eq!(scale_throttle(255, true), 0);
    }

    #[test]
    fn default_map_scales_initial_state_to_neutral() {
        let map = AxisMap::default();
        let state = InputState::new(ButtonIndexing::default()).with_initial(map.initial_values());
        assert_eq!(map.scale(&state), ScaledControl::default());
    }

    #[test]
    fn default_map_routes_channels_to_manual_control_axes() {
        let map = AxisMap::default();
        let mut state =
            InputState::new(ButtonIndexing::default()).with_initial(map.initial_values());
        state.merge(&[
            RawEvent::absolute("ABS_X", 255),
            RawEvent::absolute("ABS_Y", 0),
            RawEvent::absolute("ABS_Z", 0),
            RawEvent::absolute("ABS_RZ", 255),
            RawEvent::key("BTN_BASE2", 1),
        ]);

        let control = map.scale(&state);
        assert_eq!(
            control,
            ScaledControl {
                x: AXIS_LIMIT,
                y: AXIS_LIMIT,
                z: THROTTLE_MAX,
                r: -AXIS_LIMIT,
                buttons: 0b100,
            }
        );
    }

    #[test]
    fn unmapped_axes_stay_at_zero() {
        let map = AxisMap::empty().with(
            ControlAxis::Yaw,
            AxisMapping::new("ABS_RX", false, ScaleKind::Bidirectional, 128),
        );
        let mut state = InputState::new(ButtonIndexing::default());
        state.merge(&[RawEvent::absolute("ABS_RX", 255), RawEvent::absolute("ABS_Y", 0)]);

        let control = map.scale(&state);
        assert_eq!(control.r, AXIS_LIMIT);
        assert_eq!(control.x, 0);
        assert_eq!(control.z, 0);
    }

    #[test]
    fn validation_rejects_bad_initial_values() {
        let map = AxisMap::empty().with(
            ControlAxis::Throttle,
            AxisMapping::new("ABS_RZ", true, ScaleKind::Throttle, 256),
        );
        assert!(map.validate().is_err());
        assert!(AxisMap::default().validate().is_ok());
    }
}
