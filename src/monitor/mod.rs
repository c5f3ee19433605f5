//! Live input monitor
//!
//! Diagnostic view of what the HID device reports, independent of the bridge.
//! It owns its own [`InputSource`] and never touches the supervisor's state.

pub mod console;
pub mod gui;

use crate::controller::{InputSource, RawEvent};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use console::ConsoleObserver;
pub use gui::GuiObserver;

pub const REFRESH_INTERVAL: Duration = Duration::from_millis(100);
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Something that shows channel readings to a human
pub trait InputObserver: Send {
    fn display(&mut self, event: &RawEvent);
}

/// True when a graphical session is available
pub fn display_available() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
}

/// Polls `source` and forwards every event until `shutdown` fires
///
/// Returns the number of events shown.
pub async fn run_monitor(
    mut source: Box<dyn InputSource>,
    observer: &mut dyn InputObserver,
    shutdown: CancellationToken,
) -> u64 {
    info!("Monitoring {}", source.describe());
    let mut shown = 0u64;

    loop {
        let delay = match source.poll() {
            Ok(events) => {
                for event in &events {
                    observer.display(event);
                }
                shown += events.len() as u64;
                REFRESH_INTERVAL
            }
            Err(e) => {
                warn!("Error reading input device: {}", e);
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Monitor stopped after {} events", shown);
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{CollectorError, EventKind};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    struct OneShot(VecDeque<Result<Vec<RawEvent>, CollectorError>>);

    impl InputSource for OneShot {
        fn poll(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
            self.0.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct Collect(Vec<(EventKind, String, i32)>);

    impl InputObserver for Collect {
        fn display(&mut self, event: &RawEvent) {
            self.0.push((event.kind, event.code.clone(), event.value));
        }
    }

    #[tokio::test]
    async fn forwards_events_until_cancelled() {
        let source = OneShot(
            vec![
                Ok(vec![RawEvent::absolute("ABS_X", 12), RawEvent::key("BTN_TOP", 1)]),
                Ok(vec![RawEvent::absolute("ABS_X", 13)]),
            ]
            .into(),
        );
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            stopper.cancel();
        });

        let mut observer = Collect::default();
        let shown = run_monitor(Box::new(source), &mut observer, shutdown).await;

        assert_eq!(shown, 3);
        assert_eq!(
            observer.0,
            vec![
                (EventKind::Absolute, "ABS_X".to_string(), 12),
                (EventKind::Key, "BTN_TOP".to_string(), 1),
                (EventKind::Absolute, "ABS_X".to_string(), 13),
            ]
        );
    }

    #[tokio::test]
    async fn poll_errors_do_not_stop_the_monitor() {
        let source = OneShot(
            vec![Err(CollectorError::Disconnected("stick".to_string()))].into(),
        );
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let mut observer = Collect::default();
        assert_eq!(run_monitor(Box::new(source), &mut observer, shutdown).await, 0);
    }
}
