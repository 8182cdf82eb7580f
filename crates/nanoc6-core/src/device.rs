//! NanoC6 device connection and communication.
//!
//! This module provides the central-side interface for connecting to
//! NanoC6 devices over Bluetooth Low Energy and driving their command
//! characteristic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use nanoc6_types::uuid::{TEMPERATURE, UART_COMMAND};
use nanoc6_types::{CharacteristicProperties, Command, MacAddress, RequestDeviceOptions, Response};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{ScanOptions, find_device, find_device_with_options};
use crate::traits::SensorDevice;
use crate::util::{advertised_device, create_identifier, format_peripheral_id, mac_address};

/// Represents a connected NanoC6 device.
///
/// # Note on Clone
///
/// This struct intentionally does not implement `Clone`. A `Device` represents
/// an active BLE connection with associated state (services discovered,
/// notification handlers, etc.). If you need to share a device across
/// multiple tasks, wrap it in `Arc<Device>`.
///
/// # Cleanup
///
/// You MUST call [`Device::disconnect`] before dropping the device to properly
/// release BLE resources. If a Device is dropped without calling disconnect,
/// a warning will be logged.
pub struct Device {
    /// Kept alive for the lifetime of the peripheral connection.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    /// Device address or identifier (MAC address on Linux/Windows, UUID on macOS).
    address: String,
    mac_address: Option<MacAddress>,
    /// Services this connection may use; `None` allows every service.
    allowed_services: Option<Vec<Uuid>>,
    /// Discovered characteristics by UUID.
    characteristics_cache: RwLock<HashMap<Uuid, Characteristic>>,
    /// Handles for spawned notification tasks (for cleanup).
    notification_handles: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    /// Whether disconnect has been called (for Drop warning).
    disconnected: AtomicBool,
    config: ConnectionConfig,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("mac_address", &self.mac_address)
            .finish_non_exhaustive()
    }
}

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a device gets to answer a command.
///
/// Registration goes through the backend, so this is longer than a read.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default delay between reads while waiting for a response.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration for BLE connection timeouts and behavior.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use nanoc6_core::device::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .response_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for BLE write operations.
    pub write_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// How long to wait for the device to answer a command.
    pub response_timeout: Duration,
    /// Delay between reads while waiting for an answer.
    pub poll_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(15),
            response_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Create a config for fast, reliable environments.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the command response timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the response poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Signal strength quality levels based on RSSI values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalQuality {
    /// Signal too weak for reliable operation (< -85 dBm).
    Poor,
    /// Usable but may have issues (-85 to -75 dBm).
    Fair,
    /// Good signal strength (-75 to -60 dBm).
    Good,
    /// Excellent signal strength (> -60 dBm).
    Excellent,
}

impl SignalQuality {
    /// Determine signal quality from RSSI value in dBm.
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r > -60 => SignalQuality::Excellent,
            r if r > -75 => SignalQuality::Good,
            r if r > -85 => SignalQuality::Fair,
            _ => SignalQuality::Poor,
        }
    }

    /// Get a human-readable description of the signal quality.
    pub fn description(&self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Excellent signal",
            SignalQuality::Good => "Good signal",
            SignalQuality::Fair => "Fair signal - connection may be unstable",
            SignalQuality::Poor => "Poor signal - consider moving closer",
        }
    }

    /// Check if the signal is strong enough for reliable operations.
    pub fn is_usable(&self) -> bool {
        !matches!(self, SignalQuality::Poor)
    }
}

/// A discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<GattCharacteristic>,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// Descriptor UUIDs.
    pub descriptors: Vec<Uuid>,
}

impl From<&Characteristic> for GattCharacteristic {
    fn from(characteristic: &Characteristic) -> Self {
        Self {
            uuid: characteristic.uuid,
            service_uuid: characteristic.service_uuid,
            properties: CharacteristicProperties::from_bits(characteristic.properties.bits()),
            descriptors: characteristic.descriptors.iter().map(|d| d.uuid).collect(),
        }
    }
}

impl Device {
    /// Connect to a NanoC6 device by name or MAC address.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nanoc6_core::device::Device;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let device = Device::connect("NanoC6-D4E5F6").await?;
    ///     println!("Connected to {:?}", device);
    ///     device.disconnect().await?;
    ///     Ok(())
    /// }
    /// ```
    #[tracing::instrument(level = "info", skip_all, fields(identifier = %identifier))]
    pub async fn connect(identifier: &str) -> Result<Self> {
        Self::connect_with_config(identifier, ConnectionConfig::default()).await
    }

    /// Connect to a device with full configuration.
    #[tracing::instrument(level = "info", skip_all, fields(identifier = %identifier))]
    pub async fn connect_with_config(identifier: &str, config: ConnectionConfig) -> Result<Self> {
        let (adapter, peripheral) = Self::locate(identifier, &config).await?;
        Self::from_peripheral_with_config(adapter, peripheral, config).await
    }

    /// Connect to a device that must also satisfy `request`.
    ///
    /// Only the services named by the request's filters and optional
    /// services are visible through the resulting connection.
    #[tracing::instrument(level = "info", skip_all, fields(identifier = %identifier))]
    pub async fn connect_with_options(
        identifier: &str,
        request: &RequestDeviceOptions,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let matcher = request.compile()?;
        let (adapter, peripheral) = Self::locate(identifier, &config).await?;

        if let Some(properties) = peripheral.properties().await?
            && !matcher.matches(&advertised_device(&properties))
        {
            warn!("{} does not match the requested filters", identifier);
            return Err(Error::device_not_found(identifier));
        }

        let mut device = Self::from_peripheral_with_config(adapter, peripheral, config).await?;
        device.allowed_services = Some(matcher.allowed_services());
        Ok(device)
    }

    /// Find a peripheral, falling back to an unfiltered scan.
    async fn locate(identifier: &str, config: &ConnectionConfig) -> Result<(Adapter, Peripheral)> {
        match find_device(identifier).await {
            Ok(result) => Ok(result),
            Err(_) => {
                let options = ScanOptions::default()
                    .duration(config.connection_timeout)
                    .all_devices();
                find_device_with_options(identifier, options).await
            }
        }
    }

    /// Create a Device from an already-discovered peripheral.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn from_peripheral(adapter: Adapter, peripheral: Peripheral) -> Result<Self> {
        Self::from_peripheral_with_config(adapter, peripheral, ConnectionConfig::default()).await
    }

    /// Create a Device from an already-discovered peripheral with full configuration.
    #[tracing::instrument(level = "info", skip_all, fields(connect_timeout = ?config.connection_timeout))]
    pub async fn from_peripheral_with_config(
        adapter: Adapter,
        peripheral: Peripheral,
        config: ConnectionConfig,
    ) -> Result<Self> {
        info!("Connecting to device...");
        let device_id = format_peripheral_id(&peripheral.id());
        match timeout(config.connection_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(Error::connection_failed(
                    Some(device_id),
                    ConnectionFailureReason::BleError(e.to_string()),
                ));
            }
            Err(_) => {
                warn!(
                    "Connection to {} timed out after {:?}",
                    device_id, config.connection_timeout
                );
                return Err(Error::connection_failed(
                    Some(device_id),
                    ConnectionFailureReason::Timeout,
                ));
            }
        }
        info!("Connected!");

        info!("Discovering services...");
        timeout(config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", config.discovery_timeout))??;

        let services = peripheral.services();
        debug!("Found {} services", services.len());

        let mut characteristics_cache = HashMap::new();
        for service in &services {
            debug!("  Service: {}", service.uuid);
            for char in &service.characteristics {
                debug!("    Characteristic: {}", char.uuid);
                characteristics_cache.insert(char.uuid, char.clone());
            }
        }

        let properties = peripheral.properties().await?;
        let name = properties.as_ref().and_then(|p| p.local_name.clone());
        let mac = properties.as_ref().and_then(mac_address);

        let address = properties
            .as_ref()
            .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));

        Ok(Self {
            adapter,
            peripheral,
            name,
            address,
            mac_address: mac,
            allowed_services: None,
            characteristics_cache: RwLock::new(characteristics_cache),
            notification_handles: tokio::sync::Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            config,
        })
    }

    /// Check if the device is connected (queries BLE stack state).
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Get the current connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the current signal quality based on RSSI.
    pub async fn signal_quality(&self) -> Option<SignalQuality> {
        self.read_rssi().await.ok().map(SignalQuality::from_rssi)
    }

    /// Disconnect from the device.
    ///
    /// Aborts all active notification handlers, then disconnects the
    /// peripheral.
    #[tracing::instrument(level = "info", skip(self), fields(device_name = ?self.name))]
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from device...");
        self.disconnected.store(true, Ordering::SeqCst);

        {
            let mut handles = self.notification_handles.lock().await;
            for handle in handles.drain(..) {
                handle.abort();
            }
        }

        self.peripheral.disconnect().await?;
        Ok(())
    }

    /// Get the device name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the device address or identifier.
    ///
    /// On Linux and Windows, this returns the Bluetooth MAC address (e.g., "AA:BB:CC:DD:EE:FF").
    /// On macOS, this returns a UUID identifier since MAC addresses are not exposed.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The MAC address, when the platform exposes it.
    pub fn mac_address(&self) -> Option<MacAddress> {
        self.mac_address
    }

    /// Read the current RSSI (signal strength) of the connection.
    pub async fn read_rssi(&self) -> Result<i16> {
        let properties = self.peripheral.properties().await?;
        properties
            .and_then(|p| p.rssi)
            .ok_or_else(|| Error::InvalidData("RSSI not available".to_string()))
    }

    fn service_allowed(&self, service: &Uuid) -> bool {
        self.allowed_services
            .as_ref()
            .is_none_or(|allowed| allowed.contains(service))
    }

    /// Services visible to this connection.
    pub fn services(&self) -> Vec<GattService> {
        self.peripheral
            .services()
            .iter()
            .filter(|s| self.service_allowed(&s.uuid))
            .map(|s| GattService {
                uuid: s.uuid,
                primary: s.primary,
                characteristics: s.characteristics.iter().map(GattCharacteristic::from).collect(),
            })
            .collect()
    }

    /// Characteristics of one service.
    pub fn characteristics(&self, service: Uuid) -> Result<Vec<GattCharacteristic>> {
        self.services()
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| s.characteristics)
            .ok_or_else(|| Error::characteristic_not_found(service.to_string(), self.peripheral.services().len()))
    }

    /// Descriptor UUIDs of one characteristic.
    pub async fn descriptors(&self, uuid: Uuid) -> Result<Vec<Uuid>> {
        let characteristic = self.find_characteristic(uuid).await?;
        Ok(characteristic.descriptors.iter().map(|d| d.uuid).collect())
    }

    /// Find a characteristic by UUID using the cached lookup table.
    async fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        let service_count = self.peripheral.services().len();
        {
            let cache = self.characteristics_cache.read().await;
            if let Some(char) = cache.get(&uuid) {
                if !self.service_allowed(&char.service_uuid) {
                    debug!("Characteristic {} is outside the allowed services", uuid);
                    return Err(Error::characteristic_not_found(uuid.to_string(), service_count));
                }
                return Ok(char.clone());
            }
            if !cache.is_empty() {
                return Err(Error::characteristic_not_found(uuid.to_string(), service_count));
            }
        }

        warn!("Characteristics cache empty, falling back to service search for {}", uuid);
        self.peripheral
            .services()
            .iter()
            .filter(|s| self.service_allowed(&s.uuid))
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string(), service_count))
    }

    /// The command characteristic: the UART command characteristic on the
    /// readings firmware, the temperature characteristic on the info firmware.
    pub async fn command_characteristic(&self) -> Result<Uuid> {
        for uuid in [UART_COMMAND, TEMPERATURE] {
            if self.find_characteristic(uuid).await.is_ok() {
                return Ok(uuid);
            }
        }
        Err(Error::characteristic_not_found(
            UART_COMMAND.to_string(),
            self.peripheral.services().len(),
        ))
    }

    /// Read a characteristic value by UUID.
    pub async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.find_characteristic(uuid).await?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(&characteristic))
            .await
            .map_err(|_| Error::timeout(format!("read characteristic {}", uuid), self.config.read_timeout))??;
        Ok(data)
    }

    /// Write a value to a characteristic and wait for the acknowledgement.
    pub async fn write_characteristic(&self, uuid: Uuid, data: &[u8]) -> Result<()> {
        self.write_with_type(uuid, data, WriteType::WithResponse).await
    }

    /// Write a value to a characteristic without waiting for an acknowledgement.
    pub async fn write_without_response(&self, uuid: Uuid, data: &[u8]) -> Result<()> {
        self.write_with_type(uuid, data, WriteType::WithoutResponse).await
    }

    async fn write_with_type(&self, uuid: Uuid, data: &[u8], write_type: WriteType) -> Result<()> {
        let characteristic = self.find_characteristic(uuid).await?;
        let properties = GattCharacteristic::from(&characteristic).properties;
        if !properties.is_writable() {
            return Err(Error::WriteFailed {
                uuid: uuid.to_string(),
                reason: "characteristic is not writable".to_string(),
            });
        }

        timeout(
            self.config.write_timeout,
            self.peripheral.write(&characteristic, data, write_type),
        )
        .await
        .map_err(|_| Error::timeout(format!("write characteristic {}", uuid), self.config.write_timeout))??;
        Ok(())
    }

    /// Subscribe to notifications on a characteristic.
    ///
    /// The callback will be invoked for each notification received.
    /// The notification handler task is tracked and will be aborted when
    /// `disconnect()` is called.
    pub async fn subscribe_to_notifications<F>(&self, uuid: Uuid, callback: F) -> Result<()>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let characteristic = self.find_characteristic(uuid).await?;

        self.peripheral.subscribe(&characteristic).await?;

        let mut stream = self.peripheral.notifications().await?;
        let char_uuid = characteristic.uuid;

        let handle = tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(notification) = stream.next().await {
                if notification.uuid == char_uuid {
                    callback(&notification.value);
                }
            }
        });

        self.notification_handles.lock().await.push(handle);

        Ok(())
    }

    /// Unsubscribe from notifications on a characteristic.
    pub async fn unsubscribe_from_notifications(&self, uuid: Uuid) -> Result<()> {
        let characteristic = self.find_characteristic(uuid).await?;
        self.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    /// Get the number of cached characteristics.
    pub async fn cached_characteristic_count(&self) -> usize {
        self.characteristics_cache.read().await.len()
    }

    /// Write a command and wait for the device to replace it with an answer.
    ///
    /// Devices that handle a command asynchronously (registration) leave the
    /// written value in place until they are done, so the characteristic is
    /// polled until it changes.
    #[tracing::instrument(level = "debug", skip(self), fields(device_name = ?self.name))]
    pub async fn send_command(&self, command: &Command) -> Result<Response> {
        let uuid = self.command_characteristic().await?;
        let written = command.encode();
        self.write_characteristic(uuid, &written).await?;

        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let value = Bytes::from(self.read_characteristic(uuid).await?);
            if value != written {
                let response = Response::decode(&value);
                debug!("Response: {}", response.describe());
                return Ok(response);
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(
                    format!("response to {:?}", String::from_utf8_lossy(&written)),
                    self.config.response_timeout,
                ));
            }
            sleep(self.config.poll_interval).await;
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if !self.disconnected.load(Ordering::SeqCst) {
            self.disconnected.store(true, Ordering::SeqCst);

            warn!(
                device_name = ?self.name,
                device_address = %self.address,
                "Device dropped without calling disconnect() - performing best-effort cleanup. \
                 For reliable cleanup, call device.disconnect().await before dropping."
            );

            if let Ok(mut handles) = self.notification_handles.try_lock() {
                for handle in handles.drain(..) {
                    handle.abort();
                }
            }

            let peripheral = self.peripheral.clone();
            let address = self.address.clone();

            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        debug!(
                            device_address = %address,
                            error = %e,
                            "Best-effort disconnect failed (device may already be disconnected)"
                        );
                    } else {
                        debug!(device_address = %address, "Best-effort disconnect completed");
                    }
                });
            }
        }
    }
}

#[async_trait]
impl SensorDevice for Device {
    async fn is_connected(&self) -> bool {
        Device::is_connected(self).await
    }

    async fn disconnect(&self) -> Result<()> {
        Device::disconnect(self).await
    }

    fn name(&self) -> Option<&str> {
        Device::name(self)
    }

    fn address(&self) -> &str {
        Device::address(self)
    }

    async fn read_rssi(&self) -> Result<i16> {
        Device::read_rssi(self).await
    }

    async fn write_command(&self, command: &Command) -> Result<()> {
        let uuid = self.command_characteristic().await?;
        self.write_characteristic(uuid, &command.encode()).await
    }

    async fn read_value(&self) -> Result<Bytes> {
        let uuid = self.command_characteristic().await?;
        Ok(Bytes::from(self.read_characteristic(uuid).await?))
    }

    async fn send_command(&self, command: &Command) -> Result<Response> {
        Device::send_command(self, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_quality() {
        assert_eq!(SignalQuality::from_rssi(-50), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-70), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-80), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-95), SignalQuality::Poor);
        assert!(SignalQuality::Fair.is_usable());
        assert!(!SignalQuality::Poor.is_usable());
    }

    #[test]
    fn test_connection_config_presets() {
        let fast = ConnectionConfig::fast();
        let slow = ConnectionConfig::challenging_environment();
        assert!(fast.connection_timeout < slow.connection_timeout);
        assert!(fast.response_timeout < slow.response_timeout);

        let config = ConnectionConfig::new()
            .response_timeout(Duration::from_secs(3))
            .poll_interval(Duration::from_millis(50));
        assert_eq!(config.response_timeout, Duration::from_secs(3));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
    }
}
