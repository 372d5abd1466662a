//! Platform radio backends and detection

mod btleplug_central;
mod fallback;
#[cfg(target_os = "linux")]
mod linux_peripheral;

use std::sync::Arc;

use bleuchat_core::RadioError;
#[cfg(target_os = "linux")]
use tracing::warn;

pub use btleplug_central::BtleplugCentral;
pub use fallback::ScanOnlyPeripheral;
#[cfg(target_os = "linux")]
pub use linux_peripheral::BluerPeripheral;

use crate::radio::{CentralRadio, PeripheralRadio};

/// Radios for the current platform
///
/// Scanning is required. Advertising falls back to scan-only where the
/// platform or adapter cannot act as a peripheral.
pub async fn default_radios(
) -> Result<(Arc<dyn CentralRadio>, Arc<dyn PeripheralRadio>), RadioError> {
    let central: Arc<dyn CentralRadio> = Arc::new(BtleplugCentral::new().await?);
    Ok((central, default_peripheral().await))
}

#[cfg(target_os = "linux")]
async fn default_peripheral() -> Arc<dyn PeripheralRadio> {
    match BluerPeripheral::new().await {
        Ok(peripheral) => Arc::new(peripheral),
        Err(e) => {
            warn!("BlueZ peripheral unavailable, running scan-only: {}", e);
            Arc::new(ScanOnlyPeripheral::new())
        }
    }
}

#[cfg(not(target_os = "linux"))]
async fn default_peripheral() -> Arc<dyn PeripheralRadio> {
    Arc::new(ScanOnlyPeripheral::new())
}
