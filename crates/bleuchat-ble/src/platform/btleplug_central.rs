//! Central role over btleplug

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bleuchat_core::RadioError;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::{
    BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID, BLEUCHAT_NAME_CHARACTERISTIC_UUID,
    BLEUCHAT_SERVICE_UUID,
};
use crate::radio::{CentralRadio, CentralRadioEvent, DeviceId};

type PeripheralIndex = Arc<RwLock<HashMap<DeviceId, PeripheralId>>>;

/// Scanner radio backed by the first btleplug adapter
pub struct BtleplugCentral {
    adapter: Adapter,
    peripherals: PeripheralIndex,
}

impl BtleplugCentral {
    pub async fn new() -> Result<Self, RadioError> {
        let manager = Manager::new().await.map_err(|e| RadioError::AdapterUnavailable {
            reason: format!("failed to create BLE manager: {}", e),
        })?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| RadioError::AdapterUnavailable {
                reason: format!("failed to list BLE adapters: {}", e),
            })?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| RadioError::AdapterUnavailable {
                reason: "no BLE adapters available".to_string(),
            })?;

        info!("BLE central adapter initialized");
        Ok(Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn peripheral(&self, device: &DeviceId) -> Result<Peripheral, RadioError> {
        let id = self
            .peripherals
            .read()
            .await
            .get(device)
            .cloned()
            .ok_or_else(|| RadioError::Backend {
                reason: format!("unknown device {}", device),
            })?;
        self.adapter.peripheral(&id).await.map_err(backend)
    }
}

fn backend(error: btleplug::Error) -> RadioError {
    RadioError::Backend {
        reason: error.to_string(),
    }
}

fn device_id(id: &PeripheralId) -> DeviceId {
    DeviceId::new(format!("{:?}", id))
}

fn characteristic(
    peripheral: &Peripheral,
    device: &DeviceId,
    uuid: Uuid,
) -> Result<Characteristic, RadioError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid && c.service_uuid == BLEUCHAT_SERVICE_UUID)
        .ok_or_else(|| RadioError::SubscriptionFailure {
            device: device.to_string(),
            reason: format!("characteristic {} not found", uuid),
        })
}

#[async_trait]
impl CentralRadio for BtleplugCentral {
    async fn start_scan(&self) -> Result<(), RadioError> {
        self.adapter
            .start_scan(ScanFilter {
                services: vec![BLEUCHAT_SERVICE_UUID],
            })
            .await
            .map_err(backend)
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.adapter.stop_scan().await.map_err(backend)
    }

    async fn events(&self) -> Result<BoxStream<'static, CentralRadioEvent>, RadioError> {
        let events = self.adapter.events().await.map_err(backend)?;
        let adapter = self.adapter.clone();
        let index = self.peripherals.clone();

        Ok(events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                let index = index.clone();
                async move {
                    match event {
                        CentralEvent::DeviceDiscovered(id) => {
                            let device = device_id(&id);
                            index.write().await.insert(device.clone(), id.clone());
                            let local_name = match adapter.peripheral(&id).await {
                                Ok(peripheral) => peripheral
                                    .properties()
                                    .await
                                    .ok()
                                    .flatten()
                                    .and_then(|p| p.local_name),
                                Err(_) => None,
                            };
                            Some(CentralRadioEvent::Discovered { device, local_name })
                        }
                        CentralEvent::DeviceDisconnected(id) => {
                            Some(CentralRadioEvent::Disconnected {
                                device: device_id(&id),
                            })
                        }
                        _ => None,
                    }
                }
            })
            .boxed())
    }

    async fn connect(&self, device: &DeviceId) -> Result<(), RadioError> {
        let peripheral = self.peripheral(device).await?;
        let failure = |e: btleplug::Error| RadioError::DiscoveryFailure {
            device: device.to_string(),
            reason: e.to_string(),
        };
        peripheral.connect().await.map_err(failure)?;
        peripheral.discover_services().await.map_err(failure)?;
        debug!("Connected to {} and discovered services", device);
        Ok(())
    }

    async fn subscribe(&self, device: &DeviceId) -> Result<BoxStream<'static, Vec<u8>>, RadioError> {
        let peripheral = self.peripheral(device).await?;
        let message = characteristic(&peripheral, device, BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID)?;
        peripheral.subscribe(&message).await.map_err(backend)?;
        let notifications = peripheral.notifications().await.map_err(backend)?;

        Ok(notifications
            .filter_map(|n| {
                future::ready((n.uuid == BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID).then_some(n.value))
            })
            .boxed())
    }

    async fn read_hello(&self, device: &DeviceId) -> Result<Vec<u8>, RadioError> {
        let peripheral = self.peripheral(device).await?;
        let name = characteristic(&peripheral, device, BLEUCHAT_NAME_CHARACTERISTIC_UUID)?;
        peripheral.read(&name).await.map_err(backend)
    }

    async fn write_hello(&self, device: &DeviceId, hello: &[u8]) -> Result<(), RadioError> {
        let peripheral = self.peripheral(device).await?;
        let name = characteristic(&peripheral, device, BLEUCHAT_NAME_CHARACTERISTIC_UUID)?;
        peripheral
            .write(&name, hello, WriteType::WithResponse)
            .await
            .map_err(|e| RadioError::WriteFailure {
                device: device.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), RadioError> {
        let peripheral = self.peripheral(device).await?;
        peripheral.disconnect().await.map_err(backend)
    }
}
