//! Command protocol spoken over the UART command characteristic.
//!
//! A central writes a [`Command`] and the device answers by updating the
//! same characteristic with a [`Response`] (read back, or pushed as a
//! notification).

use bytes::Bytes;

use crate::error::ParseError;
use crate::types::SensorSample;

/// Initial characteristic value of the readings firmware.
pub const READY: &[u8] = b"Ready";
/// Characteristic value while in pairing mode.
pub const PAIRING: &[u8] = b"PAIRING";
/// Registration succeeded.
pub const REGISTERED: &[u8] = b"REGISTERED";
/// Registration failed.
pub const REGISTER_FAILED: &[u8] = b"REGISTER_FAILED";
/// Acknowledgement from the UART firmware.
pub const ACK: &[u8] = b"ACK";

const GET_READINGS: &[u8] = b"GET_READINGS";
const REGISTER: &[u8] = b"REGISTER";
const OK: &[u8] = b"OK";

/// A command written by a central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the device to publish its current sample.
    GetReadings,
    /// Ask the device to register itself with the backend.
    Register,
    /// Acknowledge a response; the UART firmware disconnects on it.
    Acknowledge,
    /// Anything else, echoed back by the readings firmware.
    Other(Bytes),
}

impl Command {
    /// Decode a written value. Never fails: unknown values become [`Command::Other`].
    pub fn decode(value: &[u8]) -> Self {
        match value {
            GET_READINGS => Command::GetReadings,
            REGISTER => Command::Register,
            OK => Command::Acknowledge,
            other => Command::Other(Bytes::copy_from_slice(other)),
        }
    }

    /// Encode for writing to the command characteristic.
    pub fn encode(&self) -> Bytes {
        match self {
            Command::GetReadings => Bytes::from_static(GET_READINGS),
            Command::Register => Bytes::from_static(REGISTER),
            Command::Acknowledge => Bytes::from_static(OK),
            Command::Other(raw) => raw.clone(),
        }
    }
}

/// A characteristic value produced by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ready,
    Pairing,
    Registered,
    RegisterFailed,
    Ack,
    /// A sample serialized as JSON.
    Readings(SensorSample),
    /// Any other value, such as an echoed command or a MAC address.
    Raw(Bytes),
}

impl Response {
    /// Decode a characteristic value.
    ///
    /// Values that parse as a [`SensorSample`] object become
    /// [`Response::Readings`]; everything unrecognised is kept raw. Device
    /// firmware writes the sample as a Python dict literal
    /// (`{'temperature': 21.5, ...}`), which is accepted alongside JSON.
    pub fn decode(value: &[u8]) -> Self {
        match value {
            READY => Response::Ready,
            PAIRING => Response::Pairing,
            REGISTERED => Response::Registered,
            REGISTER_FAILED => Response::RegisterFailed,
            ACK => Response::Ack,
            other => match decode_sample(other) {
                Some(sample) => Response::Readings(sample),
                None => Response::Raw(Bytes::copy_from_slice(other)),
            },
        }
    }

    /// Encode into a characteristic value.
    pub fn encode(&self) -> Result<Bytes, ParseError> {
        Ok(match self {
            Response::Ready => Bytes::from_static(READY),
            Response::Pairing => Bytes::from_static(PAIRING),
            Response::Registered => Bytes::from_static(REGISTERED),
            Response::RegisterFailed => Bytes::from_static(REGISTER_FAILED),
            Response::Ack => Bytes::from_static(ACK),
            Response::Readings(sample) => serde_json::to_vec(sample)
                .map(Bytes::from)
                .map_err(|e| ParseError::InvalidValue(e.to_string()))?,
            Response::Raw(raw) => raw.clone(),
        })
    }

    /// Extract the sample from a readings response.
    pub fn into_sample(self) -> Result<SensorSample, ParseError> {
        match self {
            Response::Readings(sample) => Ok(sample),
            other => Err(ParseError::InvalidValue(format!(
                "expected readings, got {}",
                other.describe()
            ))),
        }
    }

    /// Short human-readable description used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Response::Ready => "Ready".to_string(),
            Response::Pairing => "PAIRING".to_string(),
            Response::Registered => "REGISTERED".to_string(),
            Response::RegisterFailed => "REGISTER_FAILED".to_string(),
            Response::Ack => "ACK".to_string(),
            Response::Readings(_) => "readings".to_string(),
            Response::Raw(raw) => format!("{:?}", String::from_utf8_lossy(raw)),
        }
    }
}

/// Parse a sample from JSON or from a Python dict literal.
fn decode_sample(value: &[u8]) -> Option<SensorSample> {
    if let Ok(sample) = serde_json::from_slice(value) {
        return Some(sample);
    }
    let text = std::str::from_utf8(value).ok()?.trim();
    if !text.starts_with("{'") {
        return None;
    }
    serde_json::from_str(&python_literal_to_json(text)).ok()
}

/// Rewrite the quoting and constants of a flat Python literal as JSON.
fn python_literal_to_json(text: &str) -> String {
    let mut json = String::with_capacity(text.len());
    let mut in_string = false;
    let mut word = String::new();

    let flush = |word: &mut String, json: &mut String| {
        match word.as_str() {
            "True" => json.push_str("true"),
            "False" => json.push_str("false"),
            "None" => json.push_str("null"),
            _ => json.push_str(word),
        }
        word.clear();
    };

    for c in text.chars() {
        if in_string {
            match c {
                '\'' => {
                    in_string = false;
                    json.push('"');
                }
                '"' => json.push_str("\\\""),
                _ => json.push(c),
            }
        } else if c.is_ascii_alphabetic() {
            word.push(c);
        } else {
            flush(&mut word, &mut json);
            if c == '\'' {
                in_string = true;
                json.push('"');
            } else {
                json.push(c);
            }
        }
    }
    flush(&mut word, &mut json);
    json
}
