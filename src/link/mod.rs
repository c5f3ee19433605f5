//! Link to the autopilot
//!
//! [`ControlLink`] is the only thing the pipeline needs from the transport: a
//! handshaken session that can push one MAVLink message at a time. The real
//! implementation lives in [`mavlink_link`]; [`transmitter`] layers the
//! per-tick send policy on top.

pub mod mavlink_link;
pub mod transmitter;

use mavlink::common::MavMessage;
use std::time::Duration;

pub use mavlink_link::{normalize_endpoint, MavlinkLink};
pub use transmitter::Transmitter;

/// System/component pair learned from the handshake heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIds {
    pub system: u8,
    pub component: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to open MAVLink connection '{address}': {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No heartbeat received within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Send did not complete within {0:?}")]
    SendTimeout(Duration),

    #[error("Previous send is still blocked on the link")]
    SendInFlight,
}

/// A connected, handshaken session to the autopilot
///
/// `send` may block on the underlying transport; callers run it on a blocking
/// worker under a timeout.
pub trait ControlLink: Send + Sync + 'static {
    fn send(&self, message: &MavMessage) -> Result<(), LinkError>;

    fn target(&self) -> TargetIds;
}
