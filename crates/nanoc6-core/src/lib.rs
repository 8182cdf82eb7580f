//! Core library for NanoC6 environmental sensor nodes.
//!
//! This crate covers both halves of a NanoC6 deployment: talking to nodes
//! over Bluetooth Low Energy, and talking to the hosted readings backend.
//!
//! # Features
//!
//! - **Device discovery**: Scan for nearby nodes with request filters
//! - **Command protocol**: `GET_READINGS`, `REGISTER` and `OK` over one characteristic
//! - **Readings backend**: Select, insert and register through a PostgREST client
//! - **Node firmware logic**: The GATT peripheral state machines and the
//!   reading/registration agent, driven by explicit events so they run on any
//!   BLE stack and under test
//!
//! # Platform Differences
//!
//! Device identification varies by platform due to differences in BLE implementations:
//!
//! - **macOS**: Devices are identified by a UUID assigned by CoreBluetooth. This UUID
//!   is stable for a given device on a given Mac, but differs between Macs.
//!
//! - **Linux/Windows**: Devices are identified by their Bluetooth MAC address
//!   (e.g., `4C:75:25:D4:E5:F6`). This is consistent across machines.
//!
//! The [`Device::address()`] method returns the appropriate identifier for the platform.
//!
//! # Quick Start
//!
//! ```no_run
//! use nanoc6_core::{Device, SensorDevice, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = scan::scan_for_devices().await?;
//!     println!("Found {} devices", devices.len());
//!
//!     let device = Device::connect("NanoC6-D4E5F6").await?;
//!     let sample = device.request_readings().await?;
//!     println!("Temperature: {:.1} C", sample.temperature);
//!     device.acknowledge().await?;
//!     device.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod backend;
pub mod device;
pub mod error;
pub mod loader;
pub mod mock;
pub mod peripheral;
pub mod query;
pub mod retry;
pub mod scan;
pub mod supabase;
pub mod traits;
pub mod util;

pub use nanoc6_types::types;
pub use nanoc6_types::uuid;

pub use agent::{Agent, AgentConfig, AgentEvent, Clock, Indicator, ManualClock, MonotonicClock, Sensor};
pub use backend::ReadingsBackend;
pub use device::{ConnectionConfig, Device, GattCharacteristic, GattService, SignalQuality};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use loader::{ReadingsPage, load_readings, load_readings_with};
pub use mock::{MockBackend, MockDevice, MockDeviceBuilder};
pub use peripheral::{Action, ConnHandle, GattPeripheral, PeripheralEvent, Profile, WriteOutcome};
pub use query::ReadingQuery;
pub use retry::{RetryConfig, with_retry};
pub use scan::{DiscoveredDevice, ScanOptions, scan_with_retry};
pub use supabase::SupabaseClient;
pub use traits::SensorDevice;
pub use util::{create_identifier, format_peripheral_id};

/// Type alias for a shared device reference.
///
/// `Device` does not implement `Clone`; wrap it in `Arc` to use one
/// connection from several tasks.
pub type SharedDevice = std::sync::Arc<Device>;

pub use nanoc6_types::{
    Command, MacAddress, NewDevice, NewReading, Reading, RequestDeviceOptions, Response,
    ScanFilter, SensorSample,
};
