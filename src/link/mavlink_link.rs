//! MAVLink connection and handshake
//!
//! Opens the transport through the `mavlink` crate and blocks until the first
//! HEARTBEAT arrives; the header of that heartbeat names the system and
//! component every control message is addressed to. The whole exchange is
//! bounded by the handshake timeout, and running out of time is fatal.

use crate::config::LinkConfig;
use crate::link::{ControlLink, LinkError, TargetIds};
use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, Message};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Connection = Box<dyn MavConnection<MavMessage> + Send + Sync>;

/// Prefixes that name a network transport, short or native form
const NETWORK_PREFIXES: [&str; 7] = [
    "tcp:", "udp:", "tcpout:", "tcpin:", "udpin:", "udpout:", "udpbcast:",
];

/// Device path behind a serial endpoint, `None` for network endpoints
///
/// Anything without a network prefix is a serial device, either bare
/// (`/dev/ttyS0`) or native (`serial:/dev/ttyS0:57600`).
pub fn serial_device(endpoint: &str) -> Option<&str> {
    if NETWORK_PREFIXES
        .iter()
        .any(|prefix| endpoint.starts_with(prefix))
    {
        return None;
    }
    match endpoint.strip_prefix("serial:") {
        Some(rest) => Some(rest.rsplit_once(':').map_or(rest, |(path, _)| path)),
        None => Some(endpoint),
    }
}

/// Translates the CLI endpoint into a `mavlink::connect` address
///
/// * `/dev/ttyS0` → `serial:/dev/ttyS0:<baud>`
/// * `tcp:host:port` → `tcpout:host:port`
/// * `udp:host:port` → `udpin:host:port`
/// * native addresses pass through unchanged
pub fn normalize_endpoint(endpoint: &str, baud: u32) -> String {
    if let Some(rest) = endpoint.strip_prefix("tcp:") {
        format!("tcpout:{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("udp:") {
        format!("udpin:{}", rest)
    } else if endpoint.starts_with("serial:") || serial_device(endpoint).is_none() {
        endpoint.to_string()
    } else {
        format!("serial:{}:{}", endpoint, baud)
    }
}

/// Tells the blocking handshake to give up once the caller stops waiting,
/// whether by timeout, error or the future being dropped on shutdown
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

pub struct MavlinkLink {
    connection: Connection,
    address: String,
    source_system: u8,
    source_component: u8,
    sequence: AtomicU8,
    target: TargetIds,
}

impl MavlinkLink {
    /// Connects and waits for the handshake heartbeat
    pub async fn connect(endpoint: &str, config: &LinkConfig) -> Result<Self, LinkError> {
        let address = normalize_endpoint(endpoint, config.baud);
        let timeout = config.handshake_timeout();
        info!(
            "Connecting to MAVLink on {} @ {} baud...",
            address, config.baud
        );

        let abort = Arc::new(AtomicBool::new(false));
        let abort_flag = Arc::clone(&abort);
        let _abort_guard = AbortOnDrop(abort);
        let task_address = address.clone();
        let handshake = tokio::task::spawn_blocking(move || {
            let connection = mavlink::connect::<MavMessage>(&task_address).map_err(|source| {
                LinkError::Connect {
                    address: task_address.clone(),
                    source,
                }
            })?;
            let header = wait_heartbeat(connection.as_ref(), &abort_flag)?;
            Ok::<_, LinkError>((connection, header))
        });

        let (connection, header) = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(LinkError::Handshake(format!("handshake task failed: {}", e))),
            Err(_) => return Err(LinkError::HandshakeTimeout(timeout)),
        };

        let target = TargetIds {
            system: header.system_id,
            component: header.component_id,
        };
        info!(
            "Connected. Heartbeat from sys {}, comp {}",
            target.system, target.component
        );

        Ok(Self {
            connection,
            address,
            source_system: config.source_system,
            source_component: config.source_component,
            sequence: AtomicU8::new(0),
            target,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ControlLink for MavlinkLink {
    fn send(&self, message: &MavMessage) -> Result<(), LinkError> {
        let header = MavHeader {
            system_id: self.source_system,
            component_id: self.source_component,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.connection
            .send(&header, message)
            .map(|_| ())
            .map_err(|e| LinkError::Send(e.to_string()))
    }

    fn target(&self) -> TargetIds {
        self.target
    }
}

fn wait_heartbeat(
    connection: &(dyn MavConnection<MavMessage> + Send + Sync),
    abort: &AtomicBool,
) -> Result<MavHeader, LinkError> {
    while !abort.load(Ordering::Relaxed) {
        match connection.recv() {
            Ok((header, MavMessage::HEARTBEAT(heartbeat))) => {
                debug!(
                    "Heartbeat from sys {} comp {} ({:?})",
                    header.system_id, header.component_id, heartbeat.mavtype
                );
                return Ok(header);
            }
            Ok((_, other)) => {
                debug!("Ignoring {} while waiting for heartbeat", other.message_name());
            }
            Err(MessageReadError::Io(e))
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(MessageReadError::Io(e)) => {
                return Err(LinkError::Handshake(format!("read failed: {}", e)));
            }
            Err(e) => warn!("Discarding unreadable frame during handshake: {}", e),
        }
    }
    Err(LinkError::Handshake("aborted".to_string()))
}
