//! Device-side GATT command handling.
//!
//! [`GattPeripheral`] is the state machine a NanoC6 runs behind its single
//! command characteristic. It performs no I/O: BLE stack events go in and
//! [`Action`]s for the stack come out. Work that needs the sensor or the
//! backend is handed back to the caller as a [`WriteOutcome`] and completed
//! with [`GattPeripheral::publish_readings`] or
//! [`GattPeripheral::registration_result`].
//!
//! # Example
//!
//! ```
//! use nanoc6_core::peripheral::{Action, GattPeripheral, PeripheralEvent, Profile, WriteOutcome};
//! use nanoc6_types::MacAddress;
//!
//! let mac: MacAddress = "A1B2C3D4E5F6".parse().unwrap();
//! let mut peripheral = GattPeripheral::new(Profile::Uart, mac);
//! peripheral.start().unwrap();
//!
//! peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
//! let outcome = peripheral
//!     .handle(PeripheralEvent::Write { conn: 1, value: b"OK".to_vec().into() })
//!     .unwrap();
//! assert!(matches!(outcome, WriteOutcome::Done(actions) if actions.contains(&Action::Disconnect(1))));
//! ```

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::{debug, info};
use uuid::Uuid;

use nanoc6_types::advertising::{AdvertisingPayload, readings_payload};
use nanoc6_types::gatt::{CharacteristicProperties, FLAG_NOTIFY, FLAG_READ, FLAG_WRITE};
use nanoc6_types::protocol::{self, Command, Response};
use nanoc6_types::uuid::{
    ENVIRONMENTAL_SENSING_SERVICE, ENVIRONMENTAL_SENSING_SHORT, TEMPERATURE, UART_COMMAND,
    UART_SERVICE,
};
use nanoc6_types::{DEVICE_NAME_PREFIX, MacAddress, ParseError, SensorSample};

/// Connection handle assigned by the BLE stack to a central.
pub type ConnHandle = u16;

/// Which firmware behaviour the peripheral implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Normal operation: readings on request, registration, echo.
    Readings,
    /// Temporary pairing mode: waits for `REGISTER`, then shuts down.
    Pairing,
    /// Info firmware: characteristic holds the MAC address, every write is
    /// acknowledged and `OK` ends the connection.
    Uart,
}

impl Profile {
    /// Service the command characteristic lives in.
    pub fn service_uuid(&self) -> Uuid {
        match self {
            Profile::Readings | Profile::Pairing => UART_SERVICE,
            Profile::Uart => ENVIRONMENTAL_SENSING_SERVICE,
        }
    }

    /// The command characteristic.
    pub fn characteristic_uuid(&self) -> Uuid {
        match self {
            Profile::Readings | Profile::Pairing => UART_COMMAND,
            Profile::Uart => TEMPERATURE,
        }
    }

    /// Properties of the command characteristic.
    pub fn properties(&self) -> CharacteristicProperties {
        match self {
            Profile::Readings => CharacteristicProperties::from_bits(FLAG_READ | FLAG_WRITE | FLAG_NOTIFY),
            Profile::Pairing | Profile::Uart => CharacteristicProperties::from_bits(FLAG_READ | FLAG_WRITE),
        }
    }
}

/// Something the BLE stack reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    Connected(ConnHandle),
    Disconnected(ConnHandle),
    /// A central wrote to the command characteristic.
    Write { conn: ConnHandle, value: Bytes },
}

/// Something the BLE stack should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Store a new characteristic value.
    SetValue(Bytes),
    /// Push the current value to a central.
    Notify { conn: ConnHandle, value: Bytes },
    /// Drop a central.
    Disconnect(ConnHandle),
    /// Start advertising with this payload.
    Advertise(Bytes),
    StopAdvertising,
    /// Leave the current mode and release the radio.
    Shutdown,
}

/// Result of handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Fully handled.
    Done(Vec<Action>),
    /// The caller must sample the sensor and call
    /// [`GattPeripheral::publish_readings`].
    ReadingsRequested,
    /// The caller must register with the backend and call
    /// [`GattPeripheral::registration_result`].
    RegistrationRequested { conn: ConnHandle },
}

impl WriteOutcome {
    fn none() -> Self {
        WriteOutcome::Done(Vec::new())
    }
}

/// GATT command state machine.
#[derive(Debug, Clone)]
pub struct GattPeripheral {
    profile: Profile,
    mac: MacAddress,
    value: Bytes,
    centrals: BTreeSet<ConnHandle>,
    advertising: bool,
    active: bool,
}

impl GattPeripheral {
    /// Create a peripheral. Call [`start`](Self::start) before feeding events.
    pub fn new(profile: Profile, mac: MacAddress) -> Self {
        Self {
            profile,
            mac,
            value: Self::initial_value(profile, &mac),
            centrals: BTreeSet::new(),
            advertising: false,
            active: false,
        }
    }

    fn initial_value(profile: Profile, mac: &MacAddress) -> Bytes {
        match profile {
            Profile::Readings => Bytes::from_static(protocol::READY),
            Profile::Pairing => Bytes::from_static(protocol::PAIRING),
            Profile::Uart => Bytes::copy_from_slice(&mac.bytes()),
        }
    }

    /// The advertised name.
    ///
    /// The readings firmware uses the last six hex digits of the MAC, the
    /// info firmware the whole address.
    pub fn advertised_name(&self) -> String {
        match self.profile {
            Profile::Readings | Profile::Pairing => self.mac.device_name(),
            Profile::Uart => format!("{}{}", DEVICE_NAME_PREFIX, self.mac),
        }
    }

    /// The advertising payload for the current profile.
    pub fn advertising_payload(&self) -> Result<Bytes, ParseError> {
        match self.profile {
            Profile::Readings | Profile::Pairing => readings_payload(&self.advertised_name()),
            Profile::Uart => AdvertisingPayload::new()
                .name(self.advertised_name())
                .service(ENVIRONMENTAL_SENSING_SHORT)
                .build(),
        }
    }

    /// Register the service: set the initial value and start advertising.
    pub fn start(&mut self) -> Result<Vec<Action>, ParseError> {
        let payload = self.advertising_payload()?;
        self.value = Self::initial_value(self.profile, &self.mac);
        self.active = true;
        self.advertising = true;
        info!("Advertising as {}", self.advertised_name());
        Ok(vec![Action::SetValue(self.value.clone()), Action::Advertise(payload)])
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Current characteristic value, as a central would read it.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Connected centrals.
    pub fn centrals(&self) -> impl Iterator<Item = ConnHandle> + '_ {
        self.centrals.iter().copied()
    }

    pub fn is_connected(&self, conn: ConnHandle) -> bool {
        self.centrals.contains(&conn)
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Whether the peripheral is running (started and not shut down).
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Handle a BLE stack event.
    pub fn handle(&mut self, event: PeripheralEvent) -> Result<WriteOutcome, ParseError> {
        if !self.active {
            debug!("Ignoring {:?} while inactive", event);
            return Ok(WriteOutcome::none());
        }

        match event {
            PeripheralEvent::Connected(conn) => {
                debug!("Central {} connected", conn);
                self.centrals.insert(conn);
                // Legacy advertising stops once a central connects.
                self.advertising = false;
                Ok(WriteOutcome::none())
            }
            PeripheralEvent::Disconnected(conn) => {
                debug!("Central {} disconnected", conn);
                self.centrals.remove(&conn);
                self.on_disconnect().map(WriteOutcome::Done)
            }
            PeripheralEvent::Write { conn, value } => {
                // Writes from unknown handles still land in the attribute.
                self.on_write(conn, value)
            }
        }
    }

    fn on_disconnect(&mut self) -> Result<Vec<Action>, ParseError> {
        let payload = self.advertising_payload()?;
        self.advertising = true;

        match self.profile {
            Profile::Readings | Profile::Pairing => Ok(vec![Action::Advertise(payload)]),
            Profile::Uart => {
                // The info firmware resets its whole service.
                let mut actions = vec![Action::StopAdvertising];
                actions.extend(self.centrals.iter().map(|c| Action::Disconnect(*c)));
                self.centrals.clear();
                self.value = Self::initial_value(self.profile, &self.mac);
                actions.push(Action::SetValue(self.value.clone()));
                actions.push(Action::Advertise(payload));
                Ok(actions)
            }
        }
    }

    fn on_write(&mut self, conn: ConnHandle, value: Bytes) -> Result<WriteOutcome, ParseError> {
        let command = Command::decode(&value);
        debug!("Write from {}: {:?}", conn, command);

        match (self.profile, command) {
            (Profile::Uart, Command::Acknowledge) => {
                self.value = Bytes::from_static(protocol::ACK);
                Ok(WriteOutcome::Done(vec![
                    Action::SetValue(self.value.clone()),
                    Action::Disconnect(conn),
                ]))
            }
            (Profile::Uart, _) => {
                self.value = Bytes::from_static(protocol::ACK);
                Ok(WriteOutcome::Done(vec![Action::SetValue(self.value.clone())]))
            }
            (Profile::Readings, Command::GetReadings) => {
                if self.centrals.is_empty() {
                    Ok(WriteOutcome::none())
                } else {
                    Ok(WriteOutcome::ReadingsRequested)
                }
            }
            (Profile::Readings | Profile::Pairing, Command::Register) => {
                Ok(WriteOutcome::RegistrationRequested { conn })
            }
            (_, _) => {
                self.value = value;
                Ok(WriteOutcome::Done(vec![Action::SetValue(self.value.clone())]))
            }
        }
    }

    /// Complete a readings request with a fresh sample.
    ///
    /// Nothing is published when no central is connected anymore.
    pub fn publish_readings(&mut self, sample: &SensorSample) -> Result<Vec<Action>, ParseError> {
        if self.centrals.is_empty() {
            return Ok(Vec::new());
        }
        self.value = Response::Readings(*sample).encode()?;

        let mut actions = vec![Action::SetValue(self.value.clone())];
        if self.profile.properties().notify {
            actions.extend(self.centrals.iter().map(|conn| Action::Notify {
                conn: *conn,
                value: self.value.clone(),
            }));
        }
        Ok(actions)
    }

    /// Complete a registration request.
    ///
    /// In pairing mode a successful registration ends the mode.
    pub fn registration_result(&mut self, registered: bool) -> Vec<Action> {
        self.value = if registered {
            Bytes::from_static(protocol::REGISTERED)
        } else {
            Bytes::from_static(protocol::REGISTER_FAILED)
        };

        let mut actions = vec![Action::SetValue(self.value.clone())];
        if registered && self.profile == Profile::Pairing {
            actions.extend(self.shutdown());
        }
        actions
    }

    /// Stop advertising, drop every central and deactivate.
    pub fn shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.advertising {
            actions.push(Action::StopAdvertising);
        }
        actions.extend(self.centrals.iter().map(|c| Action::Disconnect(*c)));
        actions.push(Action::Shutdown);
        self.centrals.clear();
        self.advertising = false;
        self.active = false;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        "A1B2C3D4E5F6".parse().unwrap()
    }

    fn started(profile: Profile) -> GattPeripheral {
        let mut peripheral = GattPeripheral::new(profile, mac());
        peripheral.start().unwrap();
        peripheral
    }

    fn write(peripheral: &mut GattPeripheral, conn: ConnHandle, value: &'static [u8]) -> WriteOutcome {
        peripheral
            .handle(PeripheralEvent::Write {
                conn,
                value: Bytes::from_static(value),
            })
            .unwrap()
    }

    fn sample() -> SensorSample {
        SensorSample {
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1012.0,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_start_sets_initial_values() {
        let mut readings = GattPeripheral::new(Profile::Readings, mac());
        let actions = readings.start().unwrap();
        assert_eq!(actions[0], Action::SetValue(Bytes::from_static(b"Ready")));
        assert!(matches!(actions[1], Action::Advertise(_)));
        assert!(readings.is_advertising());

        let pairing = started(Profile::Pairing);
        assert_eq!(&pairing.value()[..], b"PAIRING");

        let uart = started(Profile::Uart);
        assert_eq!(&uart.value()[..], &[0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
    }

    #[test]
    fn test_advertised_names() {
        assert_eq!(started(Profile::Readings).advertised_name(), "NanoC6-D4E5F6");
        assert_eq!(started(Profile::Uart).advertised_name(), "NanoC6-A1B2C3D4E5F6");
    }

    #[test]
    fn test_events_ignored_before_start() {
        let mut peripheral = GattPeripheral::new(Profile::Readings, mac());
        let outcome = peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        assert_eq!(outcome, WriteOutcome::Done(vec![]));
        assert!(!peripheral.is_connected(1));
    }

    #[test]
    fn test_connect_stops_advertising_and_disconnect_restarts() {
        let mut peripheral = started(Profile::Readings);
        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        assert!(peripheral.is_connected(1));
        assert!(!peripheral.is_advertising());

        let outcome = peripheral.handle(PeripheralEvent::Disconnected(1)).unwrap();
        let WriteOutcome::Done(actions) = outcome else {
            panic!("expected actions");
        };
        assert!(matches!(actions[..], [Action::Advertise(_)]));
        assert!(peripheral.is_advertising());
        assert!(!peripheral.is_connected(1));
    }

    #[test]
    fn test_get_readings_requires_connection() {
        let mut peripheral = started(Profile::Readings);
        assert_eq!(
            write(&mut peripheral, 1, b"GET_READINGS"),
            WriteOutcome::Done(vec![])
        );

        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        assert_eq!(
            write(&mut peripheral, 1, b"GET_READINGS"),
            WriteOutcome::ReadingsRequested
        );
    }

    #[test]
    fn test_publish_readings_notifies_every_central() {
        let mut peripheral = started(Profile::Readings);
        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        peripheral.handle(PeripheralEvent::Connected(2)).unwrap();

        let actions = peripheral.publish_readings(&sample()).unwrap();
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[1], Action::Notify { conn: 1, .. }));
        assert!(matches!(actions[2], Action::Notify { conn: 2, .. }));
        assert_eq!(Response::decode(peripheral.value()), Response::Readings(sample()));
    }

    #[test]
    fn test_publish_readings_after_disconnect_is_noop() {
        let mut peripheral = started(Profile::Readings);
        assert!(peripheral.publish_readings(&sample()).unwrap().is_empty());
        assert_eq!(&peripheral.value()[..], b"Ready");
    }

    #[test]
    fn test_unknown_write_is_echoed() {
        let mut peripheral = started(Profile::Readings);
        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        let outcome = write(&mut peripheral, 1, b"hello");
        assert_eq!(
            outcome,
            WriteOutcome::Done(vec![Action::SetValue(Bytes::from_static(b"hello"))])
        );
        assert_eq!(&peripheral.value()[..], b"hello");
    }

    #[test]
    fn test_register_outcomes() {
        let mut peripheral = started(Profile::Readings);
        peripheral.handle(PeripheralEvent::Connected(3)).unwrap();
        assert_eq!(
            write(&mut peripheral, 3, b"REGISTER"),
            WriteOutcome::RegistrationRequested { conn: 3 }
        );

        let actions = peripheral.registration_result(false);
        assert_eq!(actions, vec![Action::SetValue(Bytes::from_static(b"REGISTER_FAILED"))]);

        let actions = peripheral.registration_result(true);
        assert_eq!(actions, vec![Action::SetValue(Bytes::from_static(b"REGISTERED"))]);
        assert!(peripheral.is_active());
    }

    #[test]
    fn test_pairing_registration_shuts_down() {
        let mut peripheral = started(Profile::Pairing);
        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        assert_eq!(
            write(&mut peripheral, 1, b"REGISTER"),
            WriteOutcome::RegistrationRequested { conn: 1 }
        );

        let actions = peripheral.registration_result(true);
        assert_eq!(actions[0], Action::SetValue(Bytes::from_static(b"REGISTERED")));
        assert!(actions.contains(&Action::Disconnect(1)));
        assert_eq!(actions.last(), Some(&Action::Shutdown));
        assert!(!peripheral.is_active());
    }

    #[test]
    fn test_pairing_ignores_readings_requests() {
        let mut peripheral = started(Profile::Pairing);
        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        let outcome = write(&mut peripheral, 1, b"GET_READINGS");
        assert!(matches!(outcome, WriteOutcome::Done(_)));
        assert_eq!(&peripheral.value()[..], b"GET_READINGS");
    }

    #[test]
    fn test_uart_ok_acks_and_disconnects() {
        let mut peripheral = started(Profile::Uart);
        peripheral.handle(PeripheralEvent::Connected(7)).unwrap();

        let outcome = write(&mut peripheral, 7, b"OK");
        assert_eq!(
            outcome,
            WriteOutcome::Done(vec![
                Action::SetValue(Bytes::from_static(b"ACK")),
                Action::Disconnect(7),
            ])
        );
    }

    #[test]
    fn test_uart_other_writes_ack() {
        let mut peripheral = started(Profile::Uart);
        peripheral.handle(PeripheralEvent::Connected(7)).unwrap();
        let outcome = write(&mut peripheral, 7, b"GET_READINGS");
        assert_eq!(
            outcome,
            WriteOutcome::Done(vec![Action::SetValue(Bytes::from_static(b"ACK"))])
        );
    }

    #[test]
    fn test_uart_disconnect_resets_service() {
        let mut peripheral = started(Profile::Uart);
        peripheral.handle(PeripheralEvent::Connected(1)).unwrap();
        peripheral.handle(PeripheralEvent::Connected(2)).unwrap();
        write(&mut peripheral, 1, b"hi");

        let WriteOutcome::Done(actions) =
            peripheral.handle(PeripheralEvent::Disconnected(1)).unwrap()
        else {
            panic!("expected actions");
        };
        assert_eq!(actions[0], Action::StopAdvertising);
        assert!(actions.contains(&Action::Disconnect(2)));
        assert!(matches!(actions.last(), Some(Action::Advertise(_))));
        assert_eq!(&peripheral.value()[..], &mac().bytes());
        assert_eq!(peripheral.centrals().count(), 0);
    }

    #[test]
    fn test_profile_properties() {
        assert!(Profile::Readings.properties().notify);
        assert!(!Profile::Pairing.properties().notify);
        assert!(Profile::Uart.properties().write);
        assert_eq!(Profile::Uart.service_uuid(), ENVIRONMENTAL_SENSING_SERVICE);
    }
}
