//! Axis/Button State Store
//!
//! Merges sparse event batches into persistent per-channel state. A channel that
//! does not appear in a batch keeps its previous value until it is updated again
//! or the process restarts; nothing here ever resets state on its own.

use crate::controller::event_collector::{EventKind, RawEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Number of button bits carried on the wire
pub const BUTTON_COUNT: u8 = 16;

/// Last seen raw value per channel code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    values: HashMap<String, i32>,
}

impl ChannelState {
    pub fn get(&self, code: &str) -> Option<i32> {
        self.values.get(code).copied()
    }

    /// Full replace, never accumulates
    pub fn set(&mut self, code: &str, value: i32) {
        self.values.insert(code.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pressed state of up to [`BUTTON_COUNT`] buttons, bit n = button n
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonBitfield(u16);

impl ButtonBitfield {
    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_pressed(self, index: u8) -> bool {
        index < BUTTON_COUNT && self.0 & (1 << index) != 0
    }

    pub fn press(&mut self, index: u8) {
        if index < BUTTON_COUNT {
            self.0 |= 1 << index;
        }
    }

    pub fn release(&mut self, index: u8) {
        if index < BUTTON_COUNT {
            self.0 &= !(1 << index);
        }
    }
}

/// How a key code is turned into a button index
///
/// Resolution order: explicit `codes` table, trailing ASCII digit of the code,
/// then `fallback_index`. The fallback collapses every code without a trailing
/// digit onto the same bit; `ignore_unnumbered` drops such keys instead.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ButtonIndexing {
    pub fallback_index: u8,
    pub ignore_unnumbered: bool,
    pub codes: BTreeMap<String, u8>,
}

impl ButtonIndexing {
    pub fn resolve(&self, code: &str) -> Option<u8> {
        if let Some(index) = self.codes.get(code) {
            return Some(*index);
        }

        match code.chars().last().and_then(|c| c.to_digit(10)) {
            Some(digit) => Some(digit as u8),
            None if self.ignore_unnumbered => None,
            None => Some(self.fallback_index),
        }
    }
}

/// Everything the pipeline remembers between ticks
#[derive(Debug, Clone)]
pub struct InputState {
    pub channels: ChannelState,
    pub buttons: ButtonBitfield,
    indexing: ButtonIndexing,
}

impl InputState {
    pub fn new(indexing: ButtonIndexing) -> Self {
        Self {
            channels: ChannelState::default(),
            buttons: ButtonBitfield::default(),
            indexing,
        }
    }

    /// Seeds start-of-process defaults, e.g. mid-scale sticks
    pub fn with_initial<'a>(mut self, initial: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        for (code, value) in initial {
            self.channels.set(code, value);
        }
        self
    }

    /// Applies one poll's worth of events in order
    pub fn merge(&mut self, events: &[RawEvent]) {
        for event in events {
            match event.kind {
                EventKind::Absolute => self.channels.set(&event.code, event.value),
                EventKind::Key => match self.indexing.resolve(&event.code) {
                    Some(index) if index < BUTTON_COUNT => {
                        if event.value != 0 {
                            self.buttons.press(index);
                        } else {
                            self.buttons.release(index);
                        }
                    }
                    Some(index) => {
                        debug!("Button index {} of {} is out of range", index, event.code);
                    }
                    None => debug!("No button index for {}, ignoring", event.code),
                },
            }
        }
    }
}
