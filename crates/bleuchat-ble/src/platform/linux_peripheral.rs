//! Peripheral role over BlueZ
//!
//! BlueZ fans a notification out to every subscribed central itself, so this
//! backend writes each fragment once. Subscription is inferred from the hello
//! write, which every central performs after enabling notifications.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bleuchat_core::RadioError;
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest, ReqError, Service,
};
use bluer::{Adapter, Address, DeviceEvent, DeviceProperty, Session};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::protocol::{
    BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID, BLEUCHAT_NAME_CHARACTERISTIC_UUID,
    BLEUCHAT_SERVICE_UUID,
};
use crate::radio::{DeviceId, PeripheralRadio, PeripheralRadioEvent};

/// GATT server and advertiser on the default BlueZ adapter
pub struct BluerPeripheral {
    _session: Session,
    adapter: Adapter,
    hello: Arc<RwLock<Vec<u8>>>,
    notifier: Arc<Mutex<Option<CharacteristicNotifier>>>,
    watched: Arc<Mutex<HashSet<Address>>>,
    event_tx: mpsc::UnboundedSender<PeripheralRadioEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<PeripheralRadioEvent>>>,
    app: Mutex<Option<ApplicationHandle>>,
    advertisement: Mutex<Option<AdvertisementHandle>>,
}

impl BluerPeripheral {
    pub async fn new() -> Result<Self, RadioError> {
        let session = Session::new()
            .await
            .map_err(|e| RadioError::AdapterUnavailable {
                reason: format!("BlueZ session: {}", e),
            })?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| RadioError::AdapterUnavailable {
                reason: format!("BLE adapter: {}", e),
            })?;

        if !adapter.is_powered().await.unwrap_or(false) {
            adapter.set_powered(true).await.map_err(|e| RadioError::AdapterUnavailable {
                reason: format!("failed to power on adapter: {}", e),
            })?;
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        info!("BlueZ adapter {} initialized for advertising", adapter.name());
        Ok(Self {
            _session: session,
            adapter,
            hello: Arc::new(RwLock::new(Vec::new())),
            notifier: Arc::new(Mutex::new(None)),
            watched: Arc::new(Mutex::new(HashSet::new())),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            app: Mutex::new(None),
            advertisement: Mutex::new(None),
        })
    }

    fn application(&self) -> Application {
        let hello = self.hello.clone();
        let name_read = CharacteristicRead {
            read: true,
            fun: Box::new(move |_req: CharacteristicReadRequest| {
                let hello = hello.clone();
                Box::pin(async move { Ok::<_, ReqError>(hello.read().await.clone()) })
            }),
            ..Default::default()
        };

        let adapter = self.adapter.clone();
        let events = self.event_tx.clone();
        let watched = self.watched.clone();
        let name_write = CharacteristicWrite {
            write: true,
            method: CharacteristicWriteMethod::Fun(Box::new(
                move |bytes: Vec<u8>, req: CharacteristicWriteRequest| {
                    let adapter = adapter.clone();
                    let events = events.clone();
                    let watched = watched.clone();
                    Box::pin(async move {
                        let address = req.device_address;
                        let device = DeviceId::new(address.to_string());
                        forward(
                            &events,
                            PeripheralRadioEvent::Subscribed {
                                device: device.clone(),
                            },
                        );
                        forward(&events, PeripheralRadioEvent::HelloWritten { device, bytes });
                        if watched.lock().await.insert(address) {
                            watch_device(adapter, address, events, watched).await;
                        }
                        Ok::<_, ReqError>(())
                    })
                },
            )),
            ..Default::default()
        };

        let slot = self.notifier.clone();
        let message_notify = CharacteristicNotify {
            notify: true,
            method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
                let slot = slot.clone();
                Box::pin(async move {
                    debug!("Notification session opened");
                    *slot.lock().await = Some(notifier);
                })
            })),
            ..Default::default()
        };

        Application {
            services: vec![Service {
                uuid: BLEUCHAT_SERVICE_UUID,
                primary: true,
                characteristics: vec![
                    Characteristic {
                        uuid: BLEUCHAT_NAME_CHARACTERISTIC_UUID,
                        read: Some(name_read),
                        write: Some(name_write),
                        ..Default::default()
                    },
                    Characteristic {
                        uuid: BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID,
                        notify: Some(message_notify),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

/// Report `address` as unsubscribed once BlueZ sees it disconnect
async fn watch_device(
    adapter: Adapter,
    address: Address,
    events: mpsc::UnboundedSender<PeripheralRadioEvent>,
    watched: Arc<Mutex<HashSet<Address>>>,
) {
    let device_events = match adapter.device(address) {
        Ok(device) => device.events().await,
        Err(e) => Err(e),
    };
    let mut device_events = match device_events {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Cannot watch {} for disconnects: {}", address, e);
            watched.lock().await.remove(&address);
            return;
        }
    };

    tokio::spawn(async move {
        while let Some(event) = device_events.next().await {
            if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                break;
            }
        }
        watched.lock().await.remove(&address);
        forward(
            &events,
            PeripheralRadioEvent::Unsubscribed {
                device: DeviceId::new(address.to_string()),
            },
        );
    });
}

fn forward(events: &mpsc::UnboundedSender<PeripheralRadioEvent>, event: PeripheralRadioEvent) {
    if events.send(event).is_err() {
        debug!("Peripheral event stream closed, dropping GATT event");
    }
}

#[async_trait]
impl PeripheralRadio for BluerPeripheral {
    async fn start_advertising(&self, hello: &[u8], local_name: &str) -> Result<(), RadioError> {
        *self.hello.write().await = hello.to_vec();

        let mut app = self.app.lock().await;
        if app.is_none() {
            let handle = self
                .adapter
                .serve_gatt_application(self.application())
                .await
                .map_err(|e| RadioError::Backend {
                    reason: format!("failed to register GATT service: {}", e),
                })?;
            *app = Some(handle);
            debug!("GATT service registered");
        }

        let advertisement = Advertisement {
            service_uuids: vec![BLEUCHAT_SERVICE_UUID].into_iter().collect(),
            local_name: Some(local_name.to_string()),
            discoverable: Some(true),
            ..Default::default()
        };
        let handle = self
            .adapter
            .advertise(advertisement)
            .await
            .map_err(|e| RadioError::Backend {
                reason: format!("failed to start advertising: {}", e),
            })?;
        *self.advertisement.lock().await = Some(handle);
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), RadioError> {
        // Dropping the handle withdraws the advertisement; the GATT service
        // stays up for centrals already linked.
        if self.advertisement.lock().await.take().is_some() {
            debug!("Advertisement withdrawn");
        }
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, PeripheralRadioEvent>, RadioError> {
        let receiver = self
            .event_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| RadioError::Backend {
                reason: "peripheral event stream already taken".to_string(),
            })?;
        Ok(stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }

    async fn notify(&self, device: &DeviceId, bytes: &[u8]) -> Result<(), RadioError> {
        match self
            .notify_many(std::slice::from_ref(device), bytes)
            .await
            .pop()
        {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }

    async fn notify_many(&self, devices: &[DeviceId], bytes: &[u8]) -> Vec<(DeviceId, RadioError)> {
        let mut slot = self.notifier.lock().await;
        let result = match slot.as_mut() {
            Some(notifier) if !notifier.is_stopped() => notifier
                .notify(bytes.to_vec())
                .await
                .map_err(|e| e.to_string()),
            _ => Err("no active notification session".to_string()),
        };

        match result {
            Ok(()) => Vec::new(),
            Err(reason) => {
                *slot = None;
                devices
                    .iter()
                    .map(|device| {
                        (
                            device.clone(),
                            RadioError::WriteFailure {
                                device: device.to_string(),
                                reason: reason.clone(),
                            },
                        )
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_survives_closed_stream() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let device = DeviceId::new("AA:BB:CC:DD:EE:FF");

        forward(&tx, PeripheralRadioEvent::Subscribed { device: device.clone() });
        assert_eq!(
            rx.try_recv().unwrap(),
            PeripheralRadioEvent::Subscribed { device: device.clone() }
        );

        drop(rx);
        forward(&tx, PeripheralRadioEvent::Unsubscribed { device });
    }
}
