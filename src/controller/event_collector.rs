//! Input Source Adapter - raw joystick event collection
//!
//! Polls a Linux evdev character device and turns whatever the kernel queued
//! since the last poll into a batch of [`RawEvent`]s. Only absolute-axis and
//! key/button events are surfaced; synchronisation and misc events are dropped
//! here so the rest of the pipeline never sees them.
//!
//! The adapter never retries on its own. A failing read is handed back to the
//! caller as [`CollectorError::Read`] and the supervisor decides on backoff.

use chrono::{DateTime, Local};
use evdev::{AbsoluteAxisCode, Device, EventStream, EventType, InputEvent, KeyCode};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Kind of raw event the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Absolute axis movement (sticks, throttle levers, hats)
    Absolute,
    /// Key or button press/release
    Key,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Absolute => write!(f, "Absolute"),
            EventKind::Key => write!(f, "Key"),
        }
    }
}

/// A single `(type, code, value)` tuple read from the device
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Kernel code name, e.g. `ABS_X` or `BTN_THUMB2`
    pub code: String,
    pub value: i32,
    pub timestamp: DateTime<Local>,
}

impl RawEvent {
    pub fn absolute(code: impl Into<String>, value: i32) -> Self {
        Self {
            kind: EventKind::Absolute,
            code: code.into(),
            value,
            timestamp: Local::now(),
        }
    }

    pub fn key(code: impl Into<String>, value: i32) -> Self {
        Self {
            kind: EventKind::Key,
            code: code.into(),
            value,
            timestamp: Local::now(),
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to open input device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input events: {0}")]
    Read(#[from] std::io::Error),

    #[error("Input device disconnected: {0}")]
    Disconnected(String),
}

/// Polling contract shared by the real device and test doubles
///
/// `poll` must not block for longer than a short timeout and may return an
/// empty batch when nothing happened since the previous call.
pub trait InputSource: Send + 'static {
    fn poll(&mut self) -> Result<Vec<RawEvent>, CollectorError>;

    /// Human readable description used in log lines
    fn describe(&self) -> String {
        "input source".to_string()
    }
}

/// evdev backed input source
///
/// The device is wrapped in an [`EventStream`] purely to get it switched to
/// non-blocking mode; polling itself goes through `fetch_events` so that one
/// call drains everything the kernel has buffered.
pub struct EvdevSource {
    path: PathBuf,
    name: String,
    stream: EventStream,
}

impl EvdevSource {
    /// Opens the device. Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> Result<Self, CollectorError> {
        let device = Device::open(path).map_err(|source| CollectorError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let name = device.name().unwrap_or("unnamed device").to_string();

        if let Some(axes) = device.supported_absolute_axes() {
            let axes: Vec<String> = axes.iter().map(|axis| format!("{:?}", axis)).collect();
            debug!("{} reports absolute axes: {}", name, axes.join(", "));
        }

        let stream = device
            .into_event_stream()
            .map_err(|source| CollectorError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Opened input device '{}' at {}", name, path.display());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            stream,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl InputSource for EvdevSource {
    fn poll(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
        // Non-blocking mode, so an empty queue shows up as WouldBlock
        match self.stream.device_mut().fetch_events() {
            Ok(events) => Ok(events.filter_map(convert_evdev_event).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) if e.raw_os_error() == Some(19) => {
                // ENODEV: the device node went away underneath us
                Err(CollectorError::Disconnected(format!(
                    "{} ({})",
                    self.name,
                    self.path.display()
                )))
            }
            Err(e) => Err(CollectorError::Read(e)),
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.name, self.path.display())
    }
}

// Helper function to map an evdev event to our RawEvent
fn convert_evdev_event(event: InputEvent) -> Option<RawEvent> {
    let event_type = event.event_type();
    if event_type == EventType::ABSOLUTE {
        Some(RawEvent::absolute(
            format!("{:?}", AbsoluteAxisCode(event.code())),
            event.value(),
        ))
    } else if event_type == EventType::KEY {
        Some(RawEvent::key(
            format!("{:?}", KeyCode::new(event.code())),
            event.value(),
        ))
    } else {
        None
    }
}
