//! Hardware integration tests for nanoc6-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package nanoc6-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure devices via environment variables:
//! - `NANOC6_DEVICE`: node running the readings firmware
//! - `NANOC6_INFO_DEVICE`: node running the info firmware
//!
//! Example:
//! ```
//! NANOC6_DEVICE="NanoC6-D4E5F6" cargo test --package nanoc6-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use nanoc6_core::scan::{ScanOptions, scan_with_options};
use nanoc6_core::uuid::{ENVIRONMENTAL_SENSING_SERVICE, UART_SERVICE};
use nanoc6_core::{Device, RequestDeviceOptions, SensorDevice, SignalQuality};
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn get_device(env_key: &str) -> Option<String> {
    env::var(env_key).ok().filter(|s| !s.is_empty())
}

async fn connect(identifier: &str) -> Device {
    match timeout(BLE_TIMEOUT, Device::connect(identifier)).await {
        Ok(Ok(d)) => d,
        Ok(Err(e)) => panic!("Failed to connect to {}: {}", identifier, e),
        Err(_) => panic!("Connection timed out after {:?}", BLE_TIMEOUT),
    }
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_devices() {
    let options = ScanOptions::new().duration_secs(10);

    let devices = timeout(BLE_TIMEOUT, scan_with_options(options))
        .await
        .expect("Scan timed out")
        .expect("Scan failed");

    println!("Found {} NanoC6 devices", devices.len());
    for device in &devices {
        println!(
            "  {} ({}) rssi={:?}",
            device.name.as_deref().unwrap_or("Unknown"),
            device.identifier,
            device.rssi
        );
        assert!(device.is_nanoc6);
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_unfiltered() {
    let options = ScanOptions::new().duration_secs(5).all_devices();

    let devices = timeout(BLE_TIMEOUT, scan_with_options(options))
        .await
        .expect("Scan timed out")
        .expect("Scan failed");

    println!("Found {} BLE devices", devices.len());
}

// =============================================================================
// Readings Firmware
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_request_readings() {
    let Some(identifier) = get_device("NANOC6_DEVICE") else {
        println!("SKIP: No device configured (set NANOC6_DEVICE env var)");
        return;
    };

    let device = connect(&identifier).await;
    if let Some(quality) = device.signal_quality().await {
        println!("{}", quality.description());
    }

    let sample = timeout(Duration::from_secs(15), device.request_readings())
        .await
        .expect("Readings request timed out")
        .expect("Readings request failed");
    println!(
        "Temperature: {:.1} C, humidity: {:.1}%, pressure: {:.1} hPa",
        sample.temperature, sample.humidity, sample.pressure
    );

    device.acknowledge().await.expect("Acknowledge failed");
    let _ = timeout(Duration::from_secs(5), device.disconnect()).await;
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_restricted_services() {
    let Some(identifier) = get_device("NANOC6_DEVICE") else {
        println!("SKIP: No device configured");
        return;
    };

    let device = timeout(
        BLE_TIMEOUT,
        Device::connect_with_options(
            &identifier,
            &RequestDeviceOptions::nanoc6(),
            Default::default(),
        ),
    )
    .await
    .expect("Connect timed out")
    .expect("Connect failed");

    for service in device.services() {
        println!("Service {} ({} characteristics)", service.uuid, service.characteristics.len());
        assert!(service.uuid == UART_SERVICE || service.uuid == ENVIRONMENTAL_SENSING_SERVICE);
    }

    let _ = device.disconnect().await;
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_reconnect_after_disconnect() {
    let Some(identifier) = get_device("NANOC6_DEVICE") else {
        println!("SKIP: No device configured");
        return;
    };

    let device1 = connect(&identifier).await;
    let _ = device1.disconnect().await;

    // The node restarts advertising once the central is gone
    tokio::time::sleep(Duration::from_secs(2)).await;

    let device2 = connect(&identifier).await;
    let rssi = device2.read_rssi().await.expect("RSSI read failed");
    println!("Reconnected, {:?}", SignalQuality::from_rssi(rssi));
    let _ = device2.disconnect().await;
}

// =============================================================================
// Info Firmware
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_info_service_reports_mac() {
    let Some(identifier) = get_device("NANOC6_INFO_DEVICE") else {
        println!("SKIP: No device configured (set NANOC6_INFO_DEVICE env var)");
        return;
    };

    let device = connect(&identifier).await;
    let value = device.read_value().await.expect("Read failed");
    assert_eq!(value.len(), 6, "info firmware exposes the raw MAC address");

    device.acknowledge().await.expect("Acknowledge failed");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!device.is_connected().await, "device drops the central after ACK");
    let _ = device.disconnect().await;
}
