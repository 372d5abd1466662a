//! Radio abstraction for both roles
//!
//! The scanner and broadcaster talk to the radio only through these traits,
//! so platform backends and test doubles are interchangeable.

use std::fmt;

use async_trait::async_trait;
use bleuchat_core::RadioError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// Radio-level address of a remote device
///
/// This differs per role and per platform; the room identifies people by the
/// `PeerId` in their hello instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ----------------------------------------------------------------------------
// Central Role
// ----------------------------------------------------------------------------

/// Adapter-level events seen while acting as a central
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralRadioEvent {
    /// An advertiser of the room service was seen
    Discovered {
        device: DeviceId,
        local_name: Option<String>,
    },
    Disconnected { device: DeviceId },
}

/// Scanning and GATT client operations
#[async_trait]
pub trait CentralRadio: Send + Sync {
    /// Begin discovery filtered to the room service
    async fn start_scan(&self) -> Result<(), RadioError>;

    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Adapter event stream; taken once by the scanner
    async fn events(&self) -> Result<BoxStream<'static, CentralRadioEvent>, RadioError>;

    async fn connect(&self, device: &DeviceId) -> Result<(), RadioError>;

    /// Subscribe to the message characteristic
    ///
    /// The stream yields one item per notification and ends when the link
    /// drops.
    async fn subscribe(&self, device: &DeviceId) -> Result<BoxStream<'static, Vec<u8>>, RadioError>;

    /// Read the peer's hello from the name characteristic
    async fn read_hello(&self, device: &DeviceId) -> Result<Vec<u8>, RadioError>;

    /// Write our hello to the peer's name characteristic
    async fn write_hello(&self, device: &DeviceId, hello: &[u8]) -> Result<(), RadioError>;

    async fn disconnect(&self, device: &DeviceId) -> Result<(), RadioError>;
}

// ----------------------------------------------------------------------------
// Peripheral Role
// ----------------------------------------------------------------------------

/// GATT server events seen while advertising
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralRadioEvent {
    /// A central enabled notifications on the message characteristic
    Subscribed { device: DeviceId },
    /// A central wrote its hello to the name characteristic
    HelloWritten { device: DeviceId, bytes: Vec<u8> },
    /// A central unsubscribed or disconnected
    Unsubscribed { device: DeviceId },
}

/// Advertising and GATT server operations
#[async_trait]
pub trait PeripheralRadio: Send + Sync {
    /// Advertise the room service; reads of the name characteristic return `hello`
    async fn start_advertising(&self, hello: &[u8], local_name: &str) -> Result<(), RadioError>;

    async fn stop_advertising(&self) -> Result<(), RadioError>;

    /// GATT server event stream; taken once by the broadcaster
    async fn events(&self) -> Result<BoxStream<'static, PeripheralRadioEvent>, RadioError>;

    /// Send one notification to one subscriber
    async fn notify(&self, device: &DeviceId, bytes: &[u8]) -> Result<(), RadioError>;

    /// Send one notification to several subscribers
    ///
    /// Returns the subscribers the write failed for. Backends whose stack fans
    /// out notifications itself override this to write once.
    async fn notify_many(&self, devices: &[DeviceId], bytes: &[u8]) -> Vec<(DeviceId, RadioError)> {
        let mut failed = Vec::new();
        for device in devices {
            if let Err(e) = self.notify(device, bytes).await {
                failed.push((device.clone(), e));
            }
        }
        failed
    }

    /// Whether this platform can advertise at all
    fn supports_advertising(&self) -> bool {
        true
    }
}
