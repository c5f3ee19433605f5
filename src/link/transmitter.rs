//! Protocol Transmitter
//!
//! Encodes one control message per call and pushes it over the link. Nothing is
//! queued or retried: a failed message is simply superseded by the next tick's
//! freshly computed one, since the control value describes current state rather
//! than an event that must arrive.
//!
//! At most one blocking send is outstanding. When a send times out its worker
//! keeps running, and further messages fail fast with
//! [`LinkError::SendInFlight`] until it returns.

use crate::link::{ControlLink, LinkError, TargetIds};
use crate::mapping::{OutputMode, OutputStrategy, ScaledControl};
use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct Transmitter {
    link: Arc<dyn ControlLink>,
    strategy: Box<dyn OutputStrategy>,
    send_timeout: Duration,
    heartbeat_interval: Option<Duration>,
    last_heartbeat: Option<Instant>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the blocking send returns or panics
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Transmitter {
    pub fn new(
        link: Arc<dyn ControlLink>,
        strategy: Box<dyn OutputStrategy>,
        send_timeout: Duration,
        heartbeat_interval: Option<Duration>,
    ) -> Self {
        Self {
            link,
            strategy,
            send_timeout,
            heartbeat_interval,
            last_heartbeat: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.strategy.mode()
    }

    pub fn target(&self) -> TargetIds {
        self.link.target()
    }

    /// Sends exactly one control message built from `control`
    pub async fn send(&self, control: &ScaledControl) -> Result<(), LinkError> {
        let message = self.strategy.encode(control, self.link.target());
        self.dispatch(message).await?;
        debug!(
            "Sent {} x={} y={} z={} r={} buttons={:#06x}",
            self.strategy.mode(),
            control.x,
            control.y,
            control.z,
            control.r,
            control.buttons
        );
        Ok(())
    }

    /// Emits a GCS heartbeat when the configured interval has elapsed
    ///
    /// Returns `Ok(true)` when a heartbeat went out.
    pub async fn heartbeat_if_due(&mut self) -> Result<bool, LinkError> {
        let Some(interval) = self.heartbeat_interval else {
            return Ok(false);
        };
        if let Some(last) = self.last_heartbeat {
            if last.elapsed() < interval {
                return Ok(false);
            }
        }

        // Counted as attempted even on failure so a dead link is not hammered
        self.last_heartbeat = Some(Instant::now());
        self.dispatch(gcs_heartbeat()).await?;
        Ok(true)
    }

    async fn dispatch(&self, message: MavMessage) -> Result<(), LinkError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(LinkError::SendInFlight);
        }
        let guard = InFlight(Arc::clone(&self.in_flight));
        let link = Arc::clone(&self.link);
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            link.send(&message)
        });

        match tokio::time::timeout(self.send_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(LinkError::Send(format!("send task failed: {}", e))),
            Err(_) => Err(LinkError::SendTimeout(self.send_timeout)),
        }
    }
}

fn gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every message and fails the sends whose index is listed
    #[derive(Default)]
    pub(crate) struct RecordingLink {
        pub(crate) sent: Mutex<Vec<MavMessage>>,
        pub(crate) fail_on: Vec<usize>,
        pub(crate) attempts: AtomicUsize,
    }

    impl RecordingLink {
        pub(crate) fn failing_on(fail_on: Vec<usize>) -> Self {
            Self {
                fail_on,
                ..Default::default()
            }
        }

        pub(crate) fn messages(&self) -> Vec<MavMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ControlLink for RecordingLink {
        fn send(&self, message: &MavMessage) -> Result<(), LinkError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&attempt) {
                return Err(LinkError::Send("link down".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn target(&self) -> TargetIds {
            TargetIds {
                system: 1,
                component: 1,
            }
        }
    }
}
