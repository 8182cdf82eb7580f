//! Platform-agnostic types for NanoC6 environmental sensors.
//!
//! This crate provides the records, identifiers and wire formats shared by
//! the device side, the BLE central in `nanoc6-core` and the readings
//! service. It performs no I/O.
//!
//! # Features
//!
//! - Reading and device records as stored by the hosted backend
//! - MAC address parsing and device naming
//! - UUID constants and GATT characteristic properties
//! - The command protocol spoken over the UART characteristic
//! - Advertising payload building and parsing
//! - Device request options and scan filter matching
//!
//! # Example
//!
//! ```
//! use nanoc6_types::{MacAddress, Reading};
//!
//! let mac: MacAddress = "a1:b2:c3:d4:e5:f6".parse().unwrap();
//! assert_eq!(mac.device_name(), "NanoC6-D4E5F6");
//!
//! let reading: Reading = serde_json::from_str(r#"{"id":1,"temperature":21.5}"#).unwrap();
//! assert_eq!(reading.temperature(), Some(21.5));
//! ```

pub mod advertising;
pub mod error;
pub mod filter;
pub mod gatt;
pub mod protocol;
pub mod types;
pub mod uuid;

pub use advertising::{AdvertisingData, AdvertisingPayload, parse_advertising, readings_payload};
pub use error::{ParseError, ParseResult};
pub use filter::{AdvertisedDevice, DeviceMatcher, RequestDeviceOptions, ScanFilter};
pub use gatt::{BluetoothUuid, CharacteristicProperties};
pub use protocol::{Command, Response};
pub use types::{
    DEFAULT_SENSOR, DEVICE_NAME_PREFIX, Device, MacAddress, NewDevice, NewReading, Reading,
    SensorSample, device_name_for,
};
pub use uuid as uuids;
