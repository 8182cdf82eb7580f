//! Legacy BLE advertising payloads.
//!
//! An advertising payload is a sequence of AD structures, each encoded as
//! `[length, type, value...]` where `length` counts the type byte and the
//! value. Legacy advertising limits the whole payload to 31 bytes.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Maximum size of a legacy advertising payload.
pub const MAX_PAYLOAD_LEN: usize = 31;

/// Flags AD type.
pub const AD_FLAGS: u8 = 0x01;
/// Incomplete list of 16-bit service UUIDs.
pub const AD_INCOMPLETE_SERVICES_16: u8 = 0x02;
/// Complete list of 16-bit service UUIDs.
pub const AD_COMPLETE_SERVICES_16: u8 = 0x03;
/// Shortened local name.
pub const AD_SHORT_NAME: u8 = 0x08;
/// Complete local name.
pub const AD_COMPLETE_NAME: u8 = 0x09;
/// TX power level.
pub const AD_TX_POWER: u8 = 0x0A;
/// Service data with a 16-bit UUID.
pub const AD_SERVICE_DATA_16: u8 = 0x16;
/// Manufacturer specific data.
pub const AD_MANUFACTURER_DATA: u8 = 0xFF;

/// LE General Discoverable Mode.
pub const FLAG_GENERAL_DISCOVERABLE: u8 = 0x02;
/// BR/EDR Not Supported.
pub const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// TX power advertised by the readings firmware.
pub const READINGS_TX_POWER: i8 = 0x1A;

/// Builder for an advertising payload.
///
/// ```
/// use nanoc6_types::advertising::AdvertisingPayload;
///
/// let payload = AdvertisingPayload::new()
///     .name("NanoC6-D4E5F6")
///     .service(0x181A)
///     .build()
///     .unwrap();
/// assert_eq!(&payload[..3], &[0x02, 0x01, 0x0A]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AdvertisingPayload {
    limited_discovery: bool,
    br_edr: bool,
    name: Option<String>,
    services: Vec<u16>,
    tx_power: Option<i8>,
}

impl AdvertisingPayload {
    /// Create a builder for a general discoverable, LE-only device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise in limited discoverable mode.
    pub fn limited_discovery(mut self, limited: bool) -> Self {
        self.limited_discovery = limited;
        self
    }

    /// Advertise BR/EDR support.
    pub fn br_edr(mut self, br_edr: bool) -> Self {
        self.br_edr = br_edr;
        self
    }

    /// Set the complete local name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a 16-bit service UUID. Each service is emitted as its own structure.
    pub fn service(mut self, uuid: u16) -> Self {
        self.services.push(uuid);
        self
    }

    /// Set the TX power level.
    pub fn tx_power(mut self, level: i8) -> Self {
        self.tx_power = Some(level);
        self
    }

    /// The flags byte: the discovery base plus the BR/EDR bit, summed.
    pub fn flags(&self) -> u8 {
        let base: u8 = if self.limited_discovery { 0x02 } else { 0x06 };
        let br_edr: u8 = if self.br_edr { 0x00 } else { 0x04 };
        base.wrapping_add(br_edr)
    }

    /// Encode the payload.
    ///
    /// Returns [`ParseError::PayloadTooLarge`] when it exceeds 31 bytes.
    pub fn build(&self) -> Result<Bytes, ParseError> {
        let mut buf = BytesMut::with_capacity(MAX_PAYLOAD_LEN);
        append(&mut buf, AD_FLAGS, &[self.flags()]);
        if let Some(level) = self.tx_power {
            append(&mut buf, AD_TX_POWER, &[level as u8]);
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            append(&mut buf, AD_COMPLETE_NAME, name.as_bytes());
        }
        for uuid in &self.services {
            append(&mut buf, AD_COMPLETE_SERVICES_16, &uuid.to_le_bytes());
        }
        check_len(buf.freeze())
    }
}

/// The fixed payload advertised by the readings firmware:
/// flags `0x06`, TX power `0x1A`, then the complete local name.
pub fn readings_payload(name: &str) -> Result<Bytes, ParseError> {
    let mut buf = BytesMut::with_capacity(MAX_PAYLOAD_LEN);
    append(&mut buf, AD_FLAGS, &[FLAG_GENERAL_DISCOVERABLE | FLAG_BR_EDR_NOT_SUPPORTED]);
    append(&mut buf, AD_TX_POWER, &[READINGS_TX_POWER as u8]);
    append(&mut buf, AD_COMPLETE_NAME, name.as_bytes());
    check_len(buf.freeze())
}

fn append(buf: &mut BytesMut, ad_type: u8, value: &[u8]) {
    buf.put_u8(value.len().saturating_add(1).min(u8::MAX as usize) as u8);
    buf.put_u8(ad_type);
    buf.put_slice(value);
}

fn check_len(payload: Bytes) -> Result<Bytes, ParseError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ParseError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(payload)
}

/// Fields decoded from an advertising payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisingData {
    pub flags: Option<u8>,
    /// Complete or shortened local name.
    pub name: Option<String>,
    /// 16-bit service UUIDs from complete and incomplete lists.
    pub services: Vec<u16>,
    pub tx_power: Option<i8>,
    /// Manufacturer data keyed by company identifier.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Service data keyed by 16-bit service UUID.
    pub service_data: BTreeMap<u16, Vec<u8>>,
}

/// Decode an advertising payload.
///
/// A zero length byte ends the payload (trailing padding). Unknown AD types
/// are skipped. A structure that runs past the end of the buffer is an error.
pub fn parse_advertising(data: &[u8]) -> Result<AdvertisingData, ParseError> {
    let mut buf = data;
    let mut parsed = AdvertisingData::default();

    while buf.has_remaining() {
        let len = buf.get_u8() as usize;
        if len == 0 {
            break;
        }
        if buf.remaining() < len {
            return Err(ParseError::InsufficientBytes {
                expected: len,
                actual: buf.remaining(),
            });
        }
        let ad_type = buf.get_u8();
        let mut value = &buf[..len - 1];
        buf.advance(len - 1);

        match ad_type {
            AD_FLAGS if !value.is_empty() => parsed.flags = Some(value[0]),
            AD_INCOMPLETE_SERVICES_16 | AD_COMPLETE_SERVICES_16 => {
                while value.remaining() >= 2 {
                    parsed.services.push(value.get_u16_le());
                }
            }
            AD_COMPLETE_NAME => {
                parsed.name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_SHORT_NAME if parsed.name.is_none() => {
                parsed.name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TX_POWER if !value.is_empty() => parsed.tx_power = Some(value[0] as i8),
            AD_MANUFACTURER_DATA if value.len() >= 2 => {
                let company = value.get_u16_le();
                parsed.manufacturer_data.insert(company, value.to_vec());
            }
            AD_SERVICE_DATA_16 if value.len() >= 2 => {
                let uuid = value.get_u16_le();
                parsed.service_data.insert(uuid, value.to_vec());
            }
            _ => {}
        }
    }

    Ok(parsed)
}
