//! GATT attribute model shared by centrals and peripherals.
//!
//! Mirrors the capability surface a browser exposes through Web Bluetooth:
//! UUIDs can be given as numeric aliases or strings, and characteristics
//! advertise a set of properties.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;
use crate::uuid::{from_short, from_u32};

/// Broadcast property bit.
pub const FLAG_BROADCAST: u8 = 0x01;
/// Read property bit.
pub const FLAG_READ: u8 = 0x02;
/// Write-without-response property bit.
pub const FLAG_WRITE_NO_RESPONSE: u8 = 0x04;
/// Write property bit.
pub const FLAG_WRITE: u8 = 0x08;
/// Notify property bit.
pub const FLAG_NOTIFY: u8 = 0x10;
/// Indicate property bit.
pub const FLAG_INDICATE: u8 = 0x20;
/// Authenticated signed writes property bit.
pub const FLAG_AUTHENTICATED_SIGNED_WRITES: u8 = 0x40;
/// Extended properties bit.
pub const FLAG_EXTENDED_PROPERTIES: u8 = 0x80;

/// Properties of a GATT characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    /// Reliable write, from the extended properties descriptor.
    pub reliable_write: bool,
    /// Writable auxiliaries, from the extended properties descriptor.
    pub writable_auxiliaries: bool,
}

impl CharacteristicProperties {
    /// Decode the properties byte of a characteristic declaration.
    ///
    /// Extended properties live in a separate descriptor and are left unset.
    pub fn from_bits(bits: u8) -> Self {
        Self {
            broadcast: bits & FLAG_BROADCAST != 0,
            read: bits & FLAG_READ != 0,
            write_without_response: bits & FLAG_WRITE_NO_RESPONSE != 0,
            write: bits & FLAG_WRITE != 0,
            notify: bits & FLAG_NOTIFY != 0,
            indicate: bits & FLAG_INDICATE != 0,
            authenticated_signed_writes: bits & FLAG_AUTHENTICATED_SIGNED_WRITES != 0,
            reliable_write: false,
            writable_auxiliaries: false,
        }
    }

    /// Encode into a properties byte.
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.broadcast {
            bits |= FLAG_BROADCAST;
        }
        if self.read {
            bits |= FLAG_READ;
        }
        if self.write_without_response {
            bits |= FLAG_WRITE_NO_RESPONSE;
        }
        if self.write {
            bits |= FLAG_WRITE;
        }
        if self.notify {
            bits |= FLAG_NOTIFY;
        }
        if self.indicate {
            bits |= FLAG_INDICATE;
        }
        if self.authenticated_signed_writes {
            bits |= FLAG_AUTHENTICATED_SIGNED_WRITES;
        }
        if self.reliable_write || self.writable_auxiliaries {
            bits |= FLAG_EXTENDED_PROPERTIES;
        }
        bits
    }

    /// Whether a central can write to the characteristic in any mode.
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }

    /// Whether the characteristic can push value changes.
    pub fn can_subscribe(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A service, characteristic or descriptor UUID as accepted in request
/// options: either a numeric alias or a string.
///
/// Numeric aliases and 4 or 8 hex digit strings expand onto the Bluetooth
/// base UUID; full UUID strings parse directly.
///
/// ```
/// use nanoc6_types::gatt::BluetoothUuid;
/// use nanoc6_types::uuid::ENVIRONMENTAL_SENSING_SERVICE;
///
/// assert_eq!(BluetoothUuid::Alias(0x181A).resolve().unwrap(), ENVIRONMENTAL_SENSING_SERVICE);
/// assert_eq!(BluetoothUuid::from("181a").resolve().unwrap(), ENVIRONMENTAL_SENSING_SERVICE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BluetoothUuid {
    /// Numeric 16 or 32-bit alias.
    Alias(u32),
    /// Hex alias or full UUID string.
    Name(String),
}

impl BluetoothUuid {
    /// Resolve to a full 128-bit UUID.
    pub fn resolve(&self) -> Result<Uuid, ParseError> {
        match self {
            BluetoothUuid::Alias(alias) => Ok(from_u32(*alias)),
            BluetoothUuid::Name(name) => name.parse::<ResolvedUuid>().map(|r| r.0),
        }
    }
}

impl From<u16> for BluetoothUuid {
    fn from(alias: u16) -> Self {
        BluetoothUuid::Alias(alias as u32)
    }
}

impl From<&str> for BluetoothUuid {
    fn from(name: &str) -> Self {
        BluetoothUuid::Name(name.to_string())
    }
}

impl From<Uuid> for BluetoothUuid {
    fn from(uuid: Uuid) -> Self {
        BluetoothUuid::Name(uuid.to_string())
    }
}

impl fmt::Display for BluetoothUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BluetoothUuid::Alias(alias) => write!(f, "0x{:04X}", alias),
            BluetoothUuid::Name(name) => f.write_str(name),
        }
    }
}

struct ResolvedUuid(Uuid);

impl FromStr for ResolvedUuid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let is_hex = !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
        match hex.len() {
            4 if is_hex => u16::from_str_radix(hex, 16)
                .map(|alias| ResolvedUuid(from_short(alias)))
                .map_err(|_| ParseError::InvalidUuid(s.to_string())),
            8 if is_hex => u32::from_str_radix(hex, 16)
                .map(|alias| ResolvedUuid(from_u32(alias)))
                .map_err(|_| ParseError::InvalidUuid(s.to_string())),
            _ => Uuid::parse_str(trimmed)
                .map(ResolvedUuid)
                .map_err(|_| ParseError::InvalidUuid(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{TEMPERATURE, UART_SERVICE};

    #[test]
    fn test_properties_from_bits() {
        let props = CharacteristicProperties::from_bits(FLAG_READ | FLAG_WRITE | FLAG_NOTIFY);
        assert!(props.read);
        assert!(props.write);
        assert!(props.notify);
        assert!(!props.write_without_response);
        assert!(props.is_writable());
        assert!(props.can_subscribe());
        assert_eq!(props.bits(), 0x1A);
    }

    #[test]
    fn test_properties_read_only() {
        let props = CharacteristicProperties::from_bits(FLAG_READ);
        assert!(!props.is_writable());
        assert!(!props.can_subscribe());
    }

    #[test]
    fn test_properties_extended_bit() {
        let props = CharacteristicProperties {
            reliable_write: true,
            ..Default::default()
        };
        assert_eq!(props.bits(), FLAG_EXTENDED_PROPERTIES);
    }

    #[test]
    fn test_resolve_aliases() {
        assert_eq!(BluetoothUuid::from(0x2A6Eu16).resolve().unwrap(), TEMPERATURE);
        assert_eq!(BluetoothUuid::from("0x2a6e").resolve().unwrap(), TEMPERATURE);
        assert_eq!(
            BluetoothUuid::from("00002a6e").resolve().unwrap(),
            TEMPERATURE
        );
    }

    #[test]
    fn test_resolve_full_uuid() {
        let uuid = BluetoothUuid::from("6E400001-B5A3-F393-E0A9-E50E24DCCA9E");
        assert_eq!(uuid.resolve().unwrap(), UART_SERVICE);
        assert_eq!(BluetoothUuid::from(UART_SERVICE).resolve().unwrap(), UART_SERVICE);
    }

    #[test]
    fn test_resolve_invalid() {
        assert!(BluetoothUuid::from("heart_rate").resolve().is_err());
        assert!(BluetoothUuid::from("").resolve().is_err());
        assert!(BluetoothUuid::from("12345").resolve().is_err());
    }

    #[test]
    fn test_untagged_serde() {
        let uuids: Vec<BluetoothUuid> = serde_json::from_str(r#"[6154, "181a"]"#).unwrap();
        assert_eq!(uuids[0], BluetoothUuid::Alias(0x180A));
        assert_eq!(uuids[1], BluetoothUuid::Name("181a".to_string()));
    }
}
