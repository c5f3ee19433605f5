//! Supervisor with statum state machine for the tick loop
//!
//! Owns every piece of per-process state (input source, merged channel state,
//! transmitter) and drives the poll → merge → scale → send cycle until a
//! shutdown is requested. Per-tick failures never leave this loop.
//!
//! # State Machine
//!
//! ```text
//! Starting ──► Running ──► ShuttingDown
//!                 │             ▲
//!                 └─(signal)────┘
//! ```
//!
//! # Tick
//!
//! ```text
//! poll ──► merge ──► scale ──► send
//!   │                            │
//!   └─ fails: backoff, skip      └─ fails: log, next tick resends fresh state
//! ```

use crate::config::AppConfig;
use crate::controller::channel_state::InputState;
use crate::controller::event_collector::InputSource;
use crate::link::Transmitter;
use crate::mapping::{AxisMap, ScaledControl};
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// States for the supervisor lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum SupervisorState {
    Starting,     // Collaborators wired, loop not entered
    Running,      // Ticking
    ShuttingDown, // Loop left, reporting
}

/// What happened on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Message went out with these values
    Sent(ScaledControl),
    /// Device read failed, state left untouched
    PollFailed(String),
    /// Message could not be sent; the next tick tries again with fresh state
    SendFailed {
        control: ScaledControl,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub outcome: TickOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub sent: u64,
    pub poll_failures: u64,
    pub send_failures: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub tick_interval: Duration,
    pub poll_backoff: Duration,
}

/// Tick loop with compile-time lifecycle states
#[machine]
pub struct Supervisor<S: SupervisorState> {
    input: Box<dyn InputSource>,
    transmitter: Transmitter,
    axes: AxisMap,
    inputs: InputState,
    timing: LoopTiming,
    report_tx: watch::Sender<Option<TickReport>>,
    stats: TickStats,
}

impl<S: SupervisorState> Supervisor<S> {
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Latest tick report, last value wins
    pub fn subscribe(&self) -> watch::Receiver<Option<TickReport>> {
        self.report_tx.subscribe()
    }
}

impl Supervisor<Starting> {
    pub fn create(
        input: Box<dyn InputSource>,
        transmitter: Transmitter,
        config: &AppConfig,
    ) -> Self {
        let axes = config.axes.clone();
        let inputs = InputState::new(config.buttons.clone()).with_initial(axes.initial_values());
        let timing = LoopTiming {
            tick_interval: config.supervisor.tick_interval(),
            poll_backoff: config.supervisor.poll_backoff(),
        };
        let (report_tx, _) = watch::channel(None);

        info!(
            "Supervisor created for {} ({} mode, tick {:?})",
            input.describe(),
            transmitter.mode(),
            timing.tick_interval
        );

        Self::new(
            input,
            transmitter,
            axes,
            inputs,
            timing,
            report_tx,
            TickStats::default(),
        )
    }

    pub fn start(self) -> Supervisor<Running> {
        let target = self.transmitter.target();
        info!(
            "Entering tick loop, sending to sys {} comp {}",
            target.system, target.component
        );
        self.transition()
    }
}

impl Supervisor<Running> {
    /// Runs one poll → merge → scale → send cycle without any sleeping
    pub async fn tick_once(&mut self) -> TickReport {
        self.stats.ticks += 1;
        let tick = self.stats.ticks;

        let outcome = match self.input.poll() {
            Err(e) => {
                self.stats.poll_failures += 1;
                warn!(tick, error = %e, "Error in HID loop, keeping previous state");
                TickOutcome::PollFailed(e.to_string())
            }
            Ok(events) => {
                if !events.is_empty() {
                    debug!(tick, count = events.len(), "Merging input events");
                }
                self.inputs.merge(&events);
                let control = self.axes.scale(&self.inputs);

                match self.transmitter.send(&control).await {
                    Ok(()) => {
                        self.stats.sent += 1;
                        debug!(
                            tick,
                            x = control.x,
                            y = control.y,
                            z = control.z,
                            r = control.r,
                            buttons = control.buttons,
                            "Control sent"
                        );
                        TickOutcome::Sent(control)
                    }
                    Err(e) => {
                        self.stats.send_failures += 1;
                        warn!(tick, error = %e, "Failed to send control message");
                        TickOutcome::SendFailed {
                            control,
                            error: e.to_string(),
                        }
                    }
                }
            }
        };

        if let Err(e) = self.transmitter.heartbeat_if_due().await {
            warn!(tick, error = %e, "Failed to send heartbeat");
        }

        let report = TickReport { tick, outcome };
        self.report_tx.send_replace(Some(report.clone()));
        report
    }

    /// Main loop with graceful shutdown support
    ///
    /// Stops within one tick interval of `shutdown` being cancelled; an
    /// in-flight send is abandoned rather than awaited.
    pub async fn run_until_shutdown(mut self, shutdown: CancellationToken) -> Supervisor<ShuttingDown> {
        info!("Reading joystick input...");
        let mut ticker = tokio::time::interval(self.timing.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                report = self.tick_once() => report,
            };

            if let TickOutcome::PollFailed(_) = report.outcome {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.timing.poll_backoff) => {}
                }
                ticker.reset();
            }
        }

        info!("Shutdown requested, leaving tick loop");
        self.transition()
    }
}

impl Supervisor<ShuttingDown> {
    /// Logs the final statistics and hands them back
    pub fn finish(self) -> TickStats {
        let stats = self.stats;
        info!(
            "Supervisor stopped after {} ticks: {} sent, {} poll failures, {} send failures",
            stats.ticks, stats.sent, stats.poll_failures, stats.send_failures
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::event_collector::{CollectorError, RawEvent};
    use crate::link::transmitter::test_support::RecordingLink;
    use crate::link::ControlLink;
    use crate::mapping::OutputMode;
    use mavlink::common::MavMessage;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Script = Arc<Mutex<VecDeque<Result<Vec<RawEvent>, CollectorError>>>>;

    /// Plays back scripted poll results, then reports no new events
    struct ScriptedInput {
        script: Script,
    }

    impl InputSource for ScriptedInput {
        fn poll(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn read_error() -> CollectorError {
        CollectorError::Read(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.supervisor.tick_interval_ms = Some(5);
        config.supervisor.poll_backoff_ms = 5;
        config
    }

    fn supervisor(
        script: Vec<Result<Vec<RawEvent>, CollectorError>>,
        link: Arc<RecordingLink>,
        config: &AppConfig,
    ) -> Supervisor<Running> {
        let input = ScriptedInput {
            script: Arc::new(Mutex::new(script.into())),
        };
        let link: Arc<dyn ControlLink> = link;
        let strategy = config
            .supervisor
            .mode
            .create_strategy(&config.override_output)
            .unwrap();
        let transmitter = Transmitter::new(link, strategy, Duration::from_millis(200), None);
        Supervisor::create(Box::new(input), transmitter, config).start()
    }

    fn manual_control(message: &MavMessage) -> (i16, i16, i16, i16, u16) {
        match message {
            MavMessage::MANUAL_CONTROL(data) => (data.x, data.y, data.z, data.r, data.buttons),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn centred_inverted_pitch_sends_zero() {
        let link = Arc::new(RecordingLink::default());
        let mut supervisor = supervisor(
            vec![Ok(vec![RawEvent::absolute("ABS_Y", 128)])],
            link.clone(),
            &config(),
        );

        supervisor.tick_once().await;
        let (x, _, _, _, _) = manual_control(&link.messages()[0]);
        assert_eq!(x, 0);
    }

    #[tokio::test]
    async fn throttle_endpoints_reach_the_wire() {
        let link = Arc::new(RecordingLink::default());
        let mut supervisor = supervisor(
            vec![
                Ok(vec![RawEvent::absolute("ABS_RZ", 0)]),
                Ok(vec![RawEvent::absolute("ABS_RZ", 255)]),
            ],
            link.clone(),
            &config(),
        );

        supervisor.tick_once().await;
        supervisor.tick_once().await;
        let messages = link.messages();
        assert_eq!(manual_control(&messages[0]).2, 0);
        assert_eq!(manual_control(&messages[1]).2, 1000);
    }

    #[tokio::test]
    async fn quiet_ticks_keep_sending_the_same_state() {
        let link = Arc::new(RecordingLink::default());
        let mut supervisor = supervisor(
            vec![Ok(vec![
                RawEvent::absolute("ABS_X", 200),
                RawEvent::key("BTN_BASE5", 1),
            ])],
            link.clone(),
            &config(),
        );

        supervisor.tick_once().await;
        supervisor.tick_once().await;
        supervisor.tick_once().await;

        let messages = link.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], messages[2]);
        assert_eq!(messages[0], messages[1]);
        assert_eq!(manual_control(&messages[2]).4, 1 << 5);
    }

    #[tokio::test]
    async fn send_failure_is_followed_by_a_fresh_send() {
        let link = Arc::new(RecordingLink::failing_on(vec![0]));
        let mut supervisor = supervisor(
            vec![
                Ok(vec![RawEvent::absolute("ABS_X", 0)]),
                Ok(vec![RawEvent::absolute("ABS_X", 255)]),
            ],
            link.clone(),
            &config(),
        );

        let first = supervisor.tick_once().await;
        assert!(matches!(first.outcome, TickOutcome::SendFailed { .. }));

        let second = supervisor.tick_once().await;
        match second.outcome {
            TickOutcome::Sent(control) => assert_eq!(control.y, 1000),
            other => panic!("expected a send, got {:?}", other),
        }

        // Only the fresh message made it out, the failed one was never retried
        let messages = link.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(manual_control(&messages[0]).1, 1000);
        assert_eq!(supervisor.stats().send_failures, 1);
        assert_eq!(supervisor.stats().sent, 1);
    }

    #[tokio::test]
    async fn poll_failure_keeps_state_and_skips_send() {
        let link = Arc::new(RecordingLink::default());
        let mut supervisor = supervisor(
            vec![
                Ok(vec![RawEvent::absolute("ABS_Z", 255)]),
                Err(read_error()),
                Ok(vec![RawEvent::absolute("ABS_X", 0)]),
            ],
            link.clone(),
            &config(),
        );

        supervisor.tick_once().await;
        let failed = supervisor.tick_once().await;
        assert!(matches!(failed.outcome, TickOutcome::PollFailed(_)));
        assert_eq!(link.messages().len(), 1);

        supervisor.tick_once().await;
        let messages = link.messages();
        assert_eq!(messages.len(), 2);
        // Yaw from before the failure survives alongside the recovered roll
        assert_eq!(manual_control(&messages[1]), (0, -1000, 0, 1000, 0));
    }

    #[tokio::test]
    async fn override_mode_sends_rc_channels_override() {
        let link = Arc::new(RecordingLink::default());
        let mut config = config();
        config.supervisor.mode = OutputMode::Override;
        let mut supervisor = supervisor(
            vec![Ok(vec![RawEvent::absolute("ABS_Y", 255)])],
            link.clone(),
            &config,
        );

        supervisor.tick_once().await;
        match &link.messages()[0] {
            MavMessage::RC_CHANNELS_OVERRIDE(data) => assert_eq!(data.chan1_raw, 2000),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn reports_are_published() {
        let link = Arc::new(RecordingLink::default());
        let mut supervisor = supervisor(vec![], link, &config());
        let rx = supervisor.subscribe();

        supervisor.tick_once().await;
        let report = rx.borrow().clone().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.outcome, TickOutcome::Sent(ScaledControl::default()));
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let link = Arc::new(RecordingLink::default());
        let supervisor = supervisor(vec![Err(read_error())], link.clone(), &config());
        let shutdown = CancellationToken::new();

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            stopper.cancel();
        });

        let stopped = tokio::time::timeout(
            Duration::from_secs(2),
            supervisor.run_until_shutdown(shutdown),
        )
        .await
        .expect("loop did not stop");
        let stats = stopped.finish();

        assert_eq!(stats.poll_failures, 1);
        assert!(stats.sent >= 1);
        assert!(stats.sent < stats.ticks);
        assert!(link.messages().len() as u64 >= stats.sent);
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let link = Arc::new(RecordingLink::default());
        let supervisor = supervisor(vec![], link.clone(), &config());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let stats = supervisor.run_until_shutdown(shutdown).await.finish();
        assert_eq!(stats, TickStats::default());
        assert!(link.messages().is_empty());
    }
}
