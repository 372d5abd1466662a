//! Bluetooth Low Energy services for BleuChat rooms
//!
//! Every device plays both radio roles at once:
//!
//! - [`scanner`] - central role: scan windows, connect, hello exchange, notification pump
//! - [`broadcaster`] - peripheral role: advertise windows, subscriber set, message fan-out
//! - [`chat_room`] - both roles wired to one `bleuchat-core` room coordinator
//! - [`radio`] - the radio traits the services drive
//! - [`platform`] - btleplug central and BlueZ peripheral backends
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bleuchat_ble::{default_radios, ChatRoom};
//! use bleuchat_core::{ChannelObserver, PeerId, StaticIdentity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = Arc::new(StaticIdentity::new(PeerId::random(), "Alice"));
//! let (observer, mut updates) = ChannelObserver::new();
//! let (central, peripheral) = default_radios().await?;
//!
//! let room = ChatRoom::builder(identity, Box::new(observer)).build(central, peripheral)?;
//! room.refresh().await?;
//! room.send_message("hello room").await?;
//!
//! while let Some(update) = updates.recv().await {
//!     println!("{:?}", update);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! - **Linux**: scanning via btleplug, advertising and GATT server via `bluer`
//! - **Other platforms**: scanning only

pub mod broadcaster;
pub mod chat_room;
pub mod platform;
pub mod protocol;
pub mod radio;
pub mod scanner;
mod timer;

// Public API exports
pub use broadcaster::PeripheralBroadcaster;
pub use chat_room::{ChatRoom, ChatRoomBuilder};
pub use platform::{default_radios, BtleplugCentral, ScanOnlyPeripheral};
#[cfg(target_os = "linux")]
pub use platform::BluerPeripheral;
pub use protocol::{
    advertised_name, BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID, BLEUCHAT_NAME_CHARACTERISTIC_UUID,
    BLEUCHAT_SERVICE_UUID,
};
pub use radio::{
    CentralRadio, CentralRadioEvent, DeviceId, PeripheralRadio, PeripheralRadioEvent,
};
pub use scanner::CentralScanner;
pub use timer::OneShotTimer;
