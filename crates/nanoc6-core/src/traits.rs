//! Trait abstractions for NanoC6 device operations.
//!
//! This module provides the [`SensorDevice`] trait that abstracts over
//! real Bluetooth devices and mock devices for testing.

use async_trait::async_trait;
use bytes::Bytes;

use nanoc6_types::{Command, Response, SensorSample};

use crate::error::{Error, Result};

/// Trait abstracting NanoC6 device operations.
///
/// Everything a central can do goes through the single command
/// characteristic: write a [`Command`], then read the [`Response`] the device
/// left in the characteristic.
///
/// # Example
///
/// ```ignore
/// use nanoc6_core::{SensorDevice, Result};
///
/// async fn print_reading<D: SensorDevice>(device: &D) -> Result<()> {
///     let sample = device.request_readings().await?;
///     println!("Temperature: {:.1} °C", sample.temperature);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SensorDevice: Send + Sync {
    // --- Connection Management ---

    /// Check if the device is connected.
    async fn is_connected(&self) -> bool;

    /// Connect to the device.
    ///
    /// For devices that are already connected, this should be a no-op.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Disconnect from the device.
    async fn disconnect(&self) -> Result<()>;

    // --- Device Identity ---

    /// Get the device name, if available.
    fn name(&self) -> Option<&str>;

    /// Get the device address or identifier.
    ///
    /// On Linux/Windows this is typically the MAC address.
    /// On macOS this is a UUID since MAC addresses are not exposed.
    fn address(&self) -> &str;

    /// Read the current RSSI (signal strength) in dBm.
    async fn read_rssi(&self) -> Result<i16>;

    // --- Command Characteristic ---

    /// Write a command to the command characteristic.
    async fn write_command(&self, command: &Command) -> Result<()>;

    /// Read the raw value of the command characteristic.
    async fn read_value(&self) -> Result<Bytes>;

    /// Write a command and read back the device's response.
    async fn send_command(&self, command: &Command) -> Result<Response> {
        self.write_command(command).await?;
        let value = self.read_value().await?;
        Ok(Response::decode(&value))
    }

    /// Ask the device for a fresh sample.
    async fn request_readings(&self) -> Result<SensorSample> {
        match self.send_command(&Command::GetReadings).await? {
            Response::Readings(sample) => Ok(sample),
            other => Err(Error::unexpected_response("GET_READINGS", other.describe())),
        }
    }

    /// Ask the device to register itself with the backend.
    ///
    /// Returns `false` if the device reported that registration failed.
    async fn register(&self) -> Result<bool> {
        match self.send_command(&Command::Register).await? {
            Response::Registered => Ok(true),
            Response::RegisterFailed => Ok(false),
            other => Err(Error::unexpected_response("REGISTER", other.describe())),
        }
    }

    /// Acknowledge the last response. Info firmware drops the connection.
    async fn acknowledge(&self) -> Result<()> {
        self.write_command(&Command::Acknowledge).await
    }
}
