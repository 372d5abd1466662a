//! GATT layout of the BleuChat service

use uuid::Uuid;

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// BleuChat room service
pub const BLEUCHAT_SERVICE_UUID: Uuid = Uuid::from_u128(0x7A1E_0001_5C3B_4F0E_9D2A_B1E0C4A7F3D2);

/// Name characteristic: read returns the peripheral's hello, write receives
/// the central's hello
pub const BLEUCHAT_NAME_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7A1E_0002_5C3B_4F0E_9D2A_B1E0C4A7F3D2);

/// Message characteristic: notifications carry envelope fragments
pub const BLEUCHAT_MESSAGE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7A1E_0003_5C3B_4F0E_9D2A_B1E0C4A7F3D2);

/// Longest local name placed in an advertisement
pub const MAX_ADVERTISED_NAME_LEN: usize = 20;

/// Truncate a display name to fit the advertising payload
pub fn advertised_name(display_name: &str) -> String {
    display_name.chars().take(MAX_ADVERTISED_NAME_LEN).collect()
}
