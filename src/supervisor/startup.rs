//! Preflight checks run before the link handshake
//!
//! Anything wrong here is fatal: the process logs the reason and exits
//! non-zero instead of starting a loop that can never send.

use crate::link::mavlink_link::serial_device;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Serial port {0} not found")]
    SerialNotFound(PathBuf),

    #[error("Failed to access serial device {path}: {source}")]
    SerialAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HID device {0} not found")]
    HidNotFound(PathBuf),

    #[error("HID device {0} is not a character device")]
    NotCharDevice(PathBuf),

    #[error("Failed to access HID device {path}: {source}")]
    HidAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the transport string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Device(PathBuf),
    Network(String),
}

impl Transport {
    /// Same split as the address handed to `mavlink::connect`
    pub fn parse(endpoint: &str) -> Self {
        match serial_device(endpoint) {
            Some(path) => Transport::Device(PathBuf::from(path)),
            None => Transport::Network(endpoint.to_string()),
        }
    }
}

/// Checks that a serial transport's device exists and can be opened
///
/// Network endpoints are only checked by the handshake itself.
pub async fn validate_transport(endpoint: &str) -> Result<Transport, StartupError> {
    let transport = Transport::parse(endpoint);

    match &transport {
        Transport::Device(path) => {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(StartupError::SerialNotFound(path.clone()));
            }
            tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .await
                .map_err(|source| StartupError::SerialAccess {
                    path: path.clone(),
                    source,
                })?;
            info!("Serial device {} is accessible", path.display());
        }
        Transport::Network(address) => {
            info!("Using network endpoint {}", address);
        }
    }

    Ok(transport)
}

/// Checks that the HID path is an openable character device
pub async fn validate_hid(path: &Path) -> Result<(), StartupError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StartupError::HidNotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(StartupError::HidAccess {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.file_type().is_char_device() {
        return Err(StartupError::NotCharDevice(path.to_path_buf()));
    }

    tokio::fs::File::open(path)
        .await
        .map_err(|source| StartupError::HidAccess {
            path: path.to_path_buf(),
            source,
        })?;

    info!("HID device {} is accessible", path.display());
    Ok(())
}
