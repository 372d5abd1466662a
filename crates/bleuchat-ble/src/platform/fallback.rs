//! Peripheral stand-in for platforms without advertising support

use async_trait::async_trait;
use bleuchat_core::RadioError;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::warn;

use crate::radio::{DeviceId, PeripheralRadio, PeripheralRadioEvent};

/// Scan-only peripheral: never advertises, never gains subscribers
#[derive(Debug, Default)]
pub struct ScanOnlyPeripheral;

impl ScanOnlyPeripheral {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeripheralRadio for ScanOnlyPeripheral {
    async fn start_advertising(&self, _hello: &[u8], local_name: &str) -> Result<(), RadioError> {
        warn!(
            "BLE advertising not supported on this platform; '{}' will not be discoverable",
            local_name
        );
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), RadioError> {
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, PeripheralRadioEvent>, RadioError> {
        Ok(stream::empty().boxed())
    }

    async fn notify(&self, device: &DeviceId, _bytes: &[u8]) -> Result<(), RadioError> {
        Err(RadioError::WriteFailure {
            device: device.to_string(),
            reason: "advertising not supported".to_string(),
        })
    }

    fn supports_advertising(&self) -> bool {
        false
    }
}
