//! Controller subsystem for joystick input handling
//!
//! Two pieces sit between the device and the scaling stage:
//!
//! 1. [`event_collector`] - polls the evdev device into raw `(type, code, value)` events
//! 2. [`channel_state`] - merges those sparse events into persistent channel state
//!
//! # Architecture
//!
//! ```text
//! /dev/input/eventN ──► InputSource::poll ──► InputState::merge ──► ChannelState + ButtonBitfield
//! ```

pub mod channel_state;
pub mod event_collector;

pub use channel_state::{ButtonBitfield, ButtonIndexing, ChannelState, InputState};
pub use event_collector::{CollectorError, EvdevSource, EventKind, InputSource, RawEvent};
