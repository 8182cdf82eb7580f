//! Core record types for NanoC6 devices and their readings.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ParseError;

/// Prefix of every NanoC6 advertised device name.
pub const DEVICE_NAME_PREFIX: &str = "NanoC6-";

/// Sensor identifier stored with readings from the ENV IV unit.
pub const DEFAULT_SENSOR: &str = "m5_env_4";

/// A reading record as returned by the backend.
///
/// Readings are opaque: the backend owns the schema and this type keeps every
/// column exactly as received. Accessors expose the columns the rest of the
/// workspace knows about; serializing a `Reading` reproduces the original
/// JSON object.
///
/// # Example
///
/// ```
/// use nanoc6_types::Reading;
///
/// let json = r#"{"id":7,"temperature":21.5,"room":"lab"}"#;
/// let reading: Reading = serde_json::from_str(json).unwrap();
///
/// assert_eq!(reading.id(), Some(7));
/// assert_eq!(reading.temperature(), Some(21.5));
/// assert_eq!(reading.get("room").and_then(|v| v.as_str()), Some("lab"));
/// assert_eq!(serde_json::to_string(&reading).unwrap(), json);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(Map<String, Value>);

impl Reading {
    /// Create a reading from a raw column map.
    pub fn from_columns(columns: Map<String, Value>) -> Self {
        Self(columns)
    }

    /// Borrow the raw column map.
    pub fn columns(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the reading and return the raw column map.
    pub fn into_columns(self) -> Map<String, Value> {
        self.0
    }

    /// Look up an arbitrary column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Row identifier.
    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// Creation timestamp, if present and RFC 3339 formatted.
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        self.0
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
    }

    /// MAC address of the reporting device.
    pub fn mac_address(&self) -> Option<&str> {
        self.0.get("mac_address").and_then(Value::as_str)
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> Option<f64> {
        self.number("temperature")
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> Option<f64> {
        self.number("humidity")
    }

    /// Pressure in hPa.
    pub fn pressure(&self) -> Option<f64> {
        self.number("pressure")
    }

    /// Sensor model identifier.
    pub fn sensor(&self) -> Option<&str> {
        self.0.get("sensor").and_then(Value::as_str)
    }

    // Form-encoded inserts can leave numeric columns stored as text.
    fn number(&self, column: &str) -> Option<f64> {
        match self.0.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for Reading {
    fn from(columns: Map<String, Value>) -> Self {
        Self(columns)
    }
}

/// Payload for inserting a new reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    /// MAC address of the reporting device (12 uppercase hex digits).
    pub mac_address: String,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Pressure in hPa.
    pub pressure: f32,
    /// Sensor model identifier.
    pub sensor: String,
}

impl NewReading {
    /// Build an insert payload from a sensor sample.
    pub fn from_sample(mac: &MacAddress, sample: &SensorSample) -> Self {
        Self {
            mac_address: mac.to_string(),
            temperature: sample.temperature,
            humidity: sample.humidity,
            pressure: sample.pressure,
            sensor: DEFAULT_SENSOR.to_string(),
        }
    }
}

/// A single environmental sample taken by a device.
///
/// This is the body a device returns for a readings request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Pressure in hPa.
    pub pressure: f32,
    /// Unix timestamp (seconds) when the sample was taken.
    #[serde(deserialize_with = "deserialize_seconds")]
    pub timestamp: i64,
}

/// Unix seconds, accepting fractional values and dropping the fraction.
fn deserialize_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {}", n))),
        other => Err(serde::de::Error::custom(format!(
            "expected a timestamp, got {}",
            other
        ))),
    }
}

/// A registered device row.
///
/// Lookups only select `id`, so every column is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Row identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// MAC address of the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Advertised device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Last time the device announced itself, as stored by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<Value>,
}

/// Payload for registering a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDevice {
    /// MAC address of the device.
    pub mac_address: String,
    /// Advertised device name.
    pub name: String,
    /// Registration time as a Unix timestamp (seconds).
    pub connected_at: i64,
}

impl NewDevice {
    /// Build a registration payload for `mac` at `now`.
    pub fn new(mac: &MacAddress, now: OffsetDateTime) -> Self {
        Self {
            mac_address: mac.to_string(),
            name: mac.device_name(),
            connected_at: now.unix_timestamp(),
        }
    }
}

/// A 48-bit Bluetooth/Wi-Fi MAC address.
///
/// The canonical text form is 12 uppercase hex digits without separators,
/// which is how devices identify themselves to the backend.
///
/// # Example
///
/// ```
/// use nanoc6_types::MacAddress;
///
/// let mac: MacAddress = "a1:b2:c3:d4:e5:f6".parse().unwrap();
/// assert_eq!(mac.to_string(), "A1B2C3D4E5F6");
/// assert_eq!(mac.device_name(), "NanoC6-D4E5F6");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create a MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create a MAC address from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let bytes: [u8; 6] = bytes
            .try_into()
            .map_err(|_| ParseError::InsufficientBytes {
                expected: 6,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Raw address bytes.
    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Colon separated form (`A1:B2:C3:D4:E5:F6`).
    pub fn to_colon_string(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// The name the device advertises under.
    pub fn device_name(&self) -> String {
        let hex = self.to_string();
        format!("{}{}", DEVICE_NAME_PREFIX, &hex[6..])
    }
}

/// Advertised name for an optional MAC address.
pub fn device_name_for(mac: Option<&MacAddress>) -> String {
    match mac {
        Some(mac) => mac.device_name(),
        None => format!("{}UNKNOWN", DEVICE_NAME_PREFIX),
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
