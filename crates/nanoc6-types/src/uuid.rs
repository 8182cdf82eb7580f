//! Bluetooth UUIDs for NanoC6 devices.
//!
//! This module contains all the UUIDs needed to talk to NanoC6 sensors
//! over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

/// Bluetooth SIG base UUID that 16-bit and 32-bit aliases expand onto.
pub const BLUETOOTH_BASE: Uuid = Uuid::from_u128(BASE_BITS);

// --- Nordic UART Service (command channel) ---

/// Nordic UART service exposed by NanoC6 readings firmware.
pub const UART_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// Command characteristic (read, write, notify).
///
/// Centrals write commands here and read or receive the response from the
/// same characteristic.
pub const UART_COMMAND: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

// --- Environmental Sensing (info firmware) ---

/// Environmental Sensing service alias used by the info firmware.
pub const ENVIRONMENTAL_SENSING_SHORT: u16 = 0x181a;

/// Temperature characteristic alias used by the info firmware.
pub const TEMPERATURE_SHORT: u16 = 0x2a6e;

/// Environmental Sensing service.
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = uuid!("0000181a-0000-1000-8000-00805f9b34fb");

/// Temperature characteristic.
pub const TEMPERATURE: Uuid = uuid!("00002a6e-0000-1000-8000-00805f9b34fb");

// --- Standard GATT ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Client Characteristic Configuration descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit alias onto the Bluetooth base UUID.
pub const fn from_short(alias: u16) -> Uuid {
    from_u32(alias as u32)
}

/// Expand a 32-bit alias onto the Bluetooth base UUID.
pub const fn from_u32(alias: u32) -> Uuid {
    Uuid::from_u128(BASE_BITS | ((alias as u128) << 96))
}

/// Return the 16-bit alias of a UUID if it lies on the Bluetooth base.
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let bits = uuid.as_u128();
    let alias = bits >> 96;
    if bits & ALIAS_MASK == BASE_BITS && alias <= u16::MAX as u128 {
        Some(alias as u16)
    } else {
        None
    }
}

const BASE_BITS: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const ALIAS_MASK: u128 = (1u128 << 96) - 1;
