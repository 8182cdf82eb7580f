//! Mock device and backend implementations for testing.
//!
//! This module provides a mock device and a mock readings store that can be
//! used for unit testing without BLE hardware or a hosted backend.
//!
//! The [`MockDevice`] implements the [`SensorDevice`] trait by running the
//! same [`GattPeripheral`] state machine the firmware runs, so commands are
//! answered exactly as a real device would answer them. The [`MockBackend`]
//! implements [`ReadingsBackend`] on in-memory tables.
//!
//! # Features
//!
//! - **Failure injection**: Set the device or backend to fail on operations
//! - **Latency simulation**: Add artificial delays to simulate slow BLE responses
//! - **Action log**: Inspect what the simulated BLE stack was told to do

use std::sync::RwLock as StdRwLock;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicI64, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use nanoc6_types::{
    Command, Device, MacAddress, NewDevice, NewReading, Reading, SensorSample,
};

use crate::backend::ReadingsBackend;
use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::peripheral::{Action, ConnHandle, GattPeripheral, PeripheralEvent, Profile, WriteOutcome};
use crate::query::ReadingQuery;
use crate::traits::SensorDevice;

/// A mock NanoC6 device for testing.
///
/// Implements [`SensorDevice`] trait for use in generic code and testing.
///
/// # Example
///
/// ```
/// use nanoc6_core::{MockDeviceBuilder, SensorDevice};
///
/// #[tokio::main]
/// async fn main() {
///     let device = MockDeviceBuilder::new().temperature(19.5).build();
///     device.connect().await.unwrap();
///
///     let sample = device.request_readings().await.unwrap();
///     assert_eq!(sample.temperature, 19.5);
/// }
/// ```
pub struct MockDevice {
    name: String,
    address: String,
    peripheral: Mutex<GattPeripheral>,
    /// Current connection handle (0 = disconnected).
    conn: AtomicU16,
    next_conn: AtomicU16,
    sample: RwLock<SensorSample>,
    register_succeeds: AtomicBool,
    actions: RwLock<Vec<Action>>,
    rssi: AtomicI16,
    read_count: AtomicU32,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    fail_count: AtomicU32,
    remaining_failures: AtomicU32,
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("conn", &self.conn.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockDevice {
    /// Create a new mock device running `profile` with default values.
    pub fn new(profile: Profile, mac: MacAddress) -> Self {
        MockDeviceBuilder::new().profile(profile).mac(mac).auto_connect(false).build()
    }

    fn default_sample() -> SensorSample {
        SensorSample {
            temperature: 22.5,
            humidity: 45.0,
            pressure: 1013.2,
            timestamp: 1_700_000_000,
        }
    }

    /// Connect to the mock device.
    pub async fn connect(&self) -> Result<()> {
        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.take_transient_failure() || self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::DeviceNotFound(DeviceNotFoundReason::NotFound {
                identifier: self.name.clone(),
            }));
        }
        if self.is_connected_sync() {
            return Ok(());
        }

        let mut peripheral = self.peripheral.lock().await;
        if !peripheral.is_active() {
            // A shut-down peripheral no longer advertises.
            return Err(Error::device_not_found(self.name.clone()));
        }
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let outcome = peripheral.handle(PeripheralEvent::Connected(conn))?;
        self.conn.store(conn, Ordering::Relaxed);
        self.complete(&mut peripheral, outcome).await?;
        Ok(())
    }

    /// Disconnect from the mock device.
    pub async fn disconnect(&self) -> Result<()> {
        let conn = self.conn.swap(0, Ordering::Relaxed);
        if conn != 0 {
            let mut peripheral = self.peripheral.lock().await;
            let outcome = peripheral.handle(PeripheralEvent::Disconnected(conn))?;
            self.complete(&mut peripheral, outcome).await?;
        }
        Ok(())
    }

    /// Check if connected (sync method for internal use).
    pub fn is_connected_sync(&self) -> bool {
        self.conn.load(Ordering::Relaxed) != 0
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Read RSSI (signal strength).
    pub async fn read_rssi(&self) -> Result<i16> {
        self.check_connected()?;
        self.check_should_fail().await?;
        Ok(self.rssi.load(Ordering::Relaxed))
    }

    /// Write a command as a connected central.
    pub async fn write_command(&self, command: &Command) -> Result<()> {
        let conn = self.check_connected()?;
        self.check_should_fail().await?;

        let mut peripheral = self.peripheral.lock().await;
        let outcome = peripheral.handle(PeripheralEvent::Write {
            conn,
            value: command.encode(),
        })?;
        self.complete(&mut peripheral, outcome).await
    }

    /// Read the command characteristic.
    pub async fn read_value(&self) -> Result<Bytes> {
        self.check_connected()?;
        self.check_should_fail().await?;
        Ok(self.peripheral.lock().await.value().clone())
    }

    async fn complete(&self, peripheral: &mut GattPeripheral, outcome: WriteOutcome) -> Result<()> {
        let mut pending = match outcome {
            WriteOutcome::Done(actions) => actions,
            WriteOutcome::ReadingsRequested => {
                self.read_count.fetch_add(1, Ordering::Relaxed);
                let sample = *self.sample.read().await;
                peripheral.publish_readings(&sample)?
            }
            WriteOutcome::RegistrationRequested { .. } => {
                peripheral.registration_result(self.register_succeeds.load(Ordering::Relaxed))
            }
        };

        // Dropped centrals are reported back to the peripheral like the BLE
        // stack would, which may produce further actions.
        while !pending.is_empty() {
            let actions = std::mem::take(&mut pending);
            for action in &actions {
                match action {
                    Action::Disconnect(conn) => {
                        if self
                            .conn
                            .compare_exchange(*conn, 0, Ordering::Relaxed, Ordering::Relaxed)
                            .is_ok()
                        {
                            debug!("Peripheral dropped connection {}", conn);
                        }
                        if peripheral.is_connected(*conn)
                            && let WriteOutcome::Done(more) =
                                peripheral.handle(PeripheralEvent::Disconnected(*conn))?
                        {
                            pending.extend(more);
                        }
                    }
                    Action::Shutdown => self.conn.store(0, Ordering::Relaxed),
                    _ => {}
                }
            }
            self.actions.write().await.extend(actions);
        }
        Ok(())
    }

    fn check_connected(&self) -> Result<ConnHandle> {
        match self.conn.load(Ordering::Relaxed) {
            0 => Err(Error::NotConnected),
            conn => Ok(conn),
        }
    }

    fn take_transient_failure(&self) -> bool {
        self.remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn check_should_fail(&self) -> Result<()> {
        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.take_transient_failure() || self.should_fail.load(Ordering::Relaxed) {
            Err(Error::InvalidData(self.fail_message.read().await.clone()))
        } else {
            Ok(())
        }
    }

    // --- Test control methods ---

    /// Set the sample the device reports.
    pub async fn set_sample(&self, sample: SensorSample) {
        *self.sample.write().await = sample;
    }

    /// Set temperature directly.
    pub async fn set_temperature(&self, temp: f32) {
        self.sample.write().await.temperature = temp;
    }

    /// Choose whether backend registration succeeds on the device.
    pub fn set_register_succeeds(&self, succeeds: bool) {
        self.register_succeeds.store(succeeds, Ordering::Relaxed);
    }

    /// Set RSSI (signal strength) for testing.
    pub fn set_rssi(&self, rssi: i16) {
        self.rssi.store(rssi, Ordering::Relaxed);
    }

    /// Make the device fail on next operation.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Current characteristic value, read without a connection.
    pub async fn value(&self) -> Bytes {
        self.peripheral.lock().await.value().clone()
    }

    /// Every action the simulated BLE stack was asked to perform.
    pub async fn actions(&self) -> Vec<Action> {
        self.actions.read().await.clone()
    }

    /// Get the number of readings the device published.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Set simulated read latency.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Configure transient failures.
    ///
    /// The device will fail the next `count` operations, then succeed.
    /// This is useful for testing retry logic.
    pub fn set_transient_failures(&self, count: u32) {
        self.fail_count.store(count, Ordering::Relaxed);
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Reset transient failure counter.
    pub fn reset_transient_failures(&self) {
        self.remaining_failures
            .store(self.fail_count.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Get the number of remaining transient failures.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SensorDevice for MockDevice {
    async fn is_connected(&self) -> bool {
        self.is_connected_sync()
    }

    async fn connect(&self) -> Result<()> {
        MockDevice::connect(self).await
    }

    async fn disconnect(&self) -> Result<()> {
        MockDevice::disconnect(self).await
    }

    fn name(&self) -> Option<&str> {
        Some(MockDevice::name(self))
    }

    fn address(&self) -> &str {
        MockDevice::address(self)
    }

    async fn read_rssi(&self) -> Result<i16> {
        MockDevice::read_rssi(self).await
    }

    async fn write_command(&self, command: &Command) -> Result<()> {
        MockDevice::write_command(self, command).await
    }

    async fn read_value(&self) -> Result<Bytes> {
        MockDevice::read_value(self).await
    }
}

/// Builder for creating mock devices with custom settings.
#[derive(Debug)]
pub struct MockDeviceBuilder {
    name: Option<String>,
    mac: MacAddress,
    profile: Profile,
    sample: SensorSample,
    register_succeeds: bool,
    auto_connect: bool,
}

impl Default for MockDeviceBuilder {
    fn default() -> Self {
        Self {
            name: None,
            mac: MacAddress::new([
                0x4C,
                0x75,
                0x25,
                rand::random::<u8>(),
                rand::random::<u8>(),
                rand::random::<u8>(),
            ]),
            profile: Profile::Readings,
            sample: MockDevice::default_sample(),
            register_succeeds: true,
            auto_connect: true,
        }
    }
}

impl MockDeviceBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the device name (defaults to the advertised name).
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn mac(mut self, mac: MacAddress) -> Self {
        self.mac = mac;
        self
    }

    /// Set the firmware profile.
    #[must_use]
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn temperature(mut self, temp: f32) -> Self {
        self.sample.temperature = temp;
        self
    }

    #[must_use]
    pub fn humidity(mut self, humidity: f32) -> Self {
        self.sample.humidity = humidity;
        self
    }

    #[must_use]
    pub fn pressure(mut self, pressure: f32) -> Self {
        self.sample.pressure = pressure;
        self
    }

    /// Set whether registration requests succeed.
    #[must_use]
    pub fn register_succeeds(mut self, succeeds: bool) -> Self {
        self.register_succeeds = succeeds;
        self
    }

    /// Set whether to auto-connect.
    #[must_use]
    pub fn auto_connect(mut self, auto: bool) -> Self {
        self.auto_connect = auto;
        self
    }

    /// Build the mock device.
    ///
    /// The peripheral is started, and connected to when `auto_connect` is set.
    #[must_use]
    pub fn build(self) -> MockDevice {
        let mut peripheral = GattPeripheral::new(self.profile, self.mac);
        // Names derived from a MAC address always fit the payload.
        let mut actions = peripheral.start().unwrap_or_default();

        let mut conn = 0;
        if self.auto_connect {
            conn = 1;
            if let Ok(WriteOutcome::Done(more)) = peripheral.handle(PeripheralEvent::Connected(conn)) {
                actions.extend(more);
            }
        }

        MockDevice {
            name: self.name.unwrap_or_else(|| peripheral.advertised_name()),
            address: self.mac.to_string(),
            peripheral: Mutex::new(peripheral),
            conn: AtomicU16::new(conn),
            next_conn: AtomicU16::new(conn + 1),
            sample: RwLock::new(self.sample),
            register_succeeds: AtomicBool::new(self.register_succeeds),
            actions: RwLock::new(actions),
            rssi: AtomicI16::new(-50),
            read_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            read_latency_ms: AtomicU64::new(0),
            connect_latency_ms: AtomicU64::new(0),
            fail_count: AtomicU32::new(0),
            remaining_failures: AtomicU32::new(0),
        }
    }
}

/// An in-memory readings store.
///
/// Failures are injected as transport errors by default; set a status with
/// [`set_fail_status`](Self::set_fail_status) to fail like an HTTP backend
/// answering with an error status.
///
/// # Example
///
/// ```
/// use nanoc6_core::{MockBackend, ReadingsBackend};
/// use nanoc6_types::MacAddress;
///
/// #[tokio::main]
/// async fn main() {
///     let backend = MockBackend::new();
///     let mac: MacAddress = "A1B2C3D4E5F6".parse().unwrap();
///     backend.add_device(&mac);
///     assert!(backend.is_registered(&mac).await.unwrap());
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockBackend {
    readings: StdRwLock<Vec<Reading>>,
    devices: StdRwLock<Vec<Device>>,
    next_id: AtomicI64,
    null_result: AtomicBool,
    should_fail: AtomicBool,
    fail_status: AtomicU16,
    fail_message: StdRwLock<String>,
    request_count: AtomicU32,
}

impl MockBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Create a backend whose `readings` table holds `readings`.
    pub fn with_readings(readings: Vec<Reading>) -> Self {
        let next_id = readings.iter().filter_map(Reading::id).max().unwrap_or(0) + 1;
        Self {
            readings: StdRwLock::new(readings),
            next_id: AtomicI64::new(next_id),
            ..Default::default()
        }
    }

    /// Make selects answer with no result at all.
    pub fn set_null_result(&self, null: bool) {
        self.null_result.store(null, Ordering::Relaxed);
    }

    /// Make every operation fail.
    pub fn set_should_fail(&self, fail: bool, message: Option<String>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().unwrap_or_else(|e| e.into_inner()) = msg;
        }
    }

    /// Fail with this HTTP status instead of a transport error.
    pub fn set_fail_status(&self, status: Option<u16>) {
        self.fail_status.store(status.unwrap_or(0), Ordering::Relaxed);
    }

    /// Register a device directly.
    pub fn add_device(&self, mac: &MacAddress) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.devices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Device {
                id: Some(id),
                mac_address: Some(mac.to_string()),
                name: Some(mac.device_name()),
                connected_at: None,
            });
    }

    /// Stored readings in insertion order.
    pub fn readings(&self) -> Vec<Reading> {
        self.readings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Registered devices in registration order.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of operations attempted, including failed ones.
    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self) -> Result<()> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if !self.should_fail.load(Ordering::Relaxed) {
            return Ok(());
        }

        let message = self
            .fail_message
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let message = if message.is_empty() {
            "Mock failure".to_string()
        } else {
            message
        };
        match self.fail_status.load(Ordering::Relaxed) {
            0 => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message,
            ))),
            status => Err(Error::backend(status, message)),
        }
    }

    fn now() -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReadingsBackend for MockBackend {
    async fn select_readings(&self, query: &ReadingQuery) -> Result<Option<Vec<Reading>>> {
        self.check_should_fail()?;
        if self.null_result.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let readings = self.readings.read().unwrap_or_else(|e| e.into_inner());
        Ok(Some(query.apply(readings.iter())))
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<()> {
        self.check_should_fail()?;

        let mut row = match serde_json::to_value(reading) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(Error::InvalidData("reading is not an object".to_string())),
            Err(e) => return Err(Error::InvalidData(e.to_string())),
        };
        row.insert(
            "id".to_string(),
            json!(self.next_id.fetch_add(1, Ordering::Relaxed)),
        );
        row.insert("created_at".to_string(), json!(Self::now()));

        self.readings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Reading::from_columns(row));
        Ok(())
    }

    async fn find_device(&self, mac: &MacAddress) -> Result<Option<Device>> {
        self.check_should_fail()?;
        let mac = mac.to_string();
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        Ok(devices
            .iter()
            .find(|d| d.mac_address.as_deref() == Some(mac.as_str()))
            .cloned())
    }

    async fn register_device(&self, device: &NewDevice) -> Result<Device> {
        self.check_should_fail()?;

        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        if devices
            .iter()
            .any(|d| d.mac_address.as_deref() == Some(device.mac_address.as_str()))
        {
            return Err(Error::backend(409, "duplicate key value violates unique constraint"));
        }

        let row = Device {
            id: Some(self.next_id.fetch_add(1, Ordering::Relaxed)),
            mac_address: Some(device.mac_address.clone()),
            name: Some(device.name.clone()),
            connected_at: Some(device.connected_at.into()),
        };
        devices.push(row.clone());
        Ok(row)
    }

    async fn touch_device(&self, mac: &MacAddress, connected_at: i64) -> Result<()> {
        self.check_should_fail()?;
        let mac = mac.to_string();
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        for device in devices
            .iter_mut()
            .filter(|d| d.mac_address.as_deref() == Some(mac.as_str()))
        {
            device.connected_at = Some(connected_at.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SensorDevice;
    use nanoc6_types::Response;

    fn mac() -> MacAddress {
        "A1B2C3D4E5F6".parse().unwrap()
    }

    #[tokio::test]
    async fn test_mock_device_connect() {
        let device = MockDevice::new(Profile::Readings, mac());
        assert!(!device.is_connected_sync());

        device.connect().await.unwrap();
        assert!(device.is_connected_sync());

        device.disconnect().await.unwrap();
        assert!(!device.is_connected_sync());

        // Disconnect restarts advertising
        let actions = device.actions().await;
        assert!(matches!(actions.last(), Some(Action::Advertise(_))));
    }

    #[tokio::test]
    async fn test_mock_device_request_readings() {
        let device = MockDeviceBuilder::new().temperature(25.0).humidity(60.0).build();

        let sample = device.request_readings().await.unwrap();
        assert!((sample.temperature - 25.0).abs() < 0.01);
        assert!((sample.humidity - 60.0).abs() < 0.01);
        assert_eq!(device.read_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_device_initial_value() {
        let device = MockDeviceBuilder::new().mac(mac()).build();
        assert_eq!(&device.read_value().await.unwrap()[..], b"Ready");
        assert_eq!(device.name(), "NanoC6-D4E5F6");
        assert_eq!(device.address(), "A1B2C3D4E5F6");
    }

    #[tokio::test]
    async fn test_mock_device_register() {
        let device = MockDeviceBuilder::new().build();
        assert!(device.register().await.unwrap());

        device.set_register_succeeds(false);
        assert!(!device.register().await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_device_echo() {
        let device = MockDeviceBuilder::new().build();
        let response = device
            .send_command(&Command::Other(Bytes::from_static(b"ping")))
            .await
            .unwrap();
        assert_eq!(response, Response::Raw(Bytes::from_static(b"ping")));
    }

    #[tokio::test]
    async fn test_mock_device_readings_unexpected_on_uart() {
        let device = MockDeviceBuilder::new().profile(Profile::Uart).build();
        let result = device.request_readings().await;
        assert!(matches!(result, Err(Error::UnexpectedResponse { .. })));
    }

    #[tokio::test]
    async fn test_mock_uart_acknowledge_disconnects() {
        let device = MockDeviceBuilder::new().profile(Profile::Uart).mac(mac()).build();
        assert_eq!(&device.read_value().await.unwrap()[..], &mac().bytes());

        device.acknowledge().await.unwrap();
        assert!(!device.is_connected_sync());

        // The service resets to the MAC address once the central is gone
        let actions = device.actions().await;
        assert!(actions.contains(&Action::SetValue(Bytes::from_static(b"ACK"))));
        assert_eq!(&device.value().await[..], &mac().bytes());
    }

    #[tokio::test]
    async fn test_mock_pairing_shuts_down_after_register() {
        let device = MockDeviceBuilder::new().profile(Profile::Pairing).build();
        assert_eq!(&device.read_value().await.unwrap()[..], b"PAIRING");

        device.write_command(&Command::Register).await.unwrap();
        assert!(!device.is_connected_sync());
        assert_eq!(&device.value().await[..], b"REGISTERED");
        assert!(device.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_device_fail() {
        let device = MockDeviceBuilder::new().build();
        device.set_should_fail(true, Some("Test error")).await;

        let result = device.request_readings().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Test error"));
    }

    #[tokio::test]
    async fn test_mock_device_not_connected() {
        let device = MockDeviceBuilder::new().auto_connect(false).build();
        let result = device.request_readings().await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_mock_device_transient_failures() {
        let device = MockDeviceBuilder::new().build();
        device.set_transient_failures(2);

        assert!(device.read_rssi().await.is_err());
        assert!(device.read_rssi().await.is_err());
        assert!(device.read_rssi().await.is_ok());
        assert_eq!(device.remaining_failures(), 0);

        device.reset_transient_failures();
        assert_eq!(device.remaining_failures(), 2);
    }

    #[tokio::test]
    async fn test_mock_device_read_rssi() {
        let device = MockDeviceBuilder::new().build();
        device.set_rssi(-65);
        assert_eq!(device.read_rssi().await.unwrap(), -65);
    }

    #[tokio::test]
    async fn test_trait_object() {
        let device = MockDeviceBuilder::new().name("Trait Test").build();
        let trait_device: &dyn SensorDevice = &device;

        assert_eq!(trait_device.name(), Some("Trait Test"));
        assert!(trait_device.is_connected().await);
        assert!(trait_device.request_readings().await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_insert_assigns_id_and_time() {
        let backend = MockBackend::new();
        let sample = MockDevice::default_sample();
        backend
            .insert_reading(&NewReading::from_sample(&mac(), &sample))
            .await
            .unwrap();

        let rows = backend.readings();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), Some(1));
        assert!(rows[0].created_at().is_some());
        assert_eq!(rows[0].mac_address(), Some("A1B2C3D4E5F6"));
    }

    #[tokio::test]
    async fn test_backend_register_and_find() {
        let backend = MockBackend::new();
        assert!(!backend.is_registered(&mac()).await.unwrap());

        let device = NewDevice::new(&mac(), OffsetDateTime::now_utc());
        backend.register_device(&device).await.unwrap();
        assert!(backend.is_registered(&mac()).await.unwrap());

        let duplicate = backend.register_device(&device).await;
        assert!(matches!(duplicate, Err(Error::Backend { status: 409, .. })));
    }

    #[tokio::test]
    async fn test_backend_touch_device() {
        let backend = MockBackend::new();
        backend.add_device(&mac());
        backend.touch_device(&mac(), 42).await.unwrap();
        assert_eq!(backend.devices()[0].connected_at, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_backend_failure_kinds() {
        let backend = MockBackend::new();
        backend.set_should_fail(true, None);
        let err = backend.find_device(&mac()).await.unwrap_err();
        assert!(!err.is_backend_status());

        backend.set_fail_status(Some(503));
        let err = backend.find_device(&mac()).await.unwrap_err();
        assert!(err.is_backend_status());
        assert_eq!(backend.request_count(), 2);
    }
}
