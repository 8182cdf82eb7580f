//! Device discovery and scanning.
//!
//! This module scans for NanoC6 devices (or anything matching a set of
//! [`RequestDeviceOptions`]) using Bluetooth Low Energy.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nanoc6_types::{DeviceMatcher, MacAddress, RequestDeviceOptions};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::{
    advertised_device, create_identifier, format_peripheral_id, identifier_matches, mac_address,
};

/// Progress update for device finding operations.
#[derive(Debug, Clone)]
pub enum FindProgress {
    /// Found device in cache, no scan needed.
    CacheHit,
    /// Starting scan attempt.
    ScanAttempt {
        /// Current attempt number (1-based).
        attempt: u32,
        /// Total number of attempts.
        total: u32,
        /// Duration of this scan attempt.
        duration_secs: u64,
    },
    /// Device found on specific attempt.
    Found { attempt: u32 },
    /// Attempt failed, will retry.
    RetryNeeded { attempt: u32 },
}

/// Callback type for progress updates during device finding.
pub type ProgressCallback = Box<dyn Fn(FindProgress) + Send + Sync>;

/// Information about a discovered device.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// The device name (e.g., "NanoC6-D4E5F6").
    pub name: Option<String>,
    /// The peripheral ID for connecting.
    pub id: PeripheralId,
    /// The BLE address as a string (may be zeros on macOS, use `id` instead).
    pub address: String,
    /// A connection identifier (peripheral ID on macOS, address on other platforms).
    pub identifier: String,
    /// The MAC address, when the platform exposes it.
    pub mac_address: Option<MacAddress>,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
    /// Whether the device looks like a NanoC6.
    pub is_nanoc6: bool,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Which devices to report.
    pub request: RequestDeviceOptions,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            request: RequestDeviceOptions::nanoc6(),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Report only devices matching `request`.
    pub fn request(mut self, request: RequestDeviceOptions) -> Self {
        self.request = request;
        self
    }

    /// Scan for all BLE devices, not just NanoC6.
    pub fn all_devices(self) -> Self {
        self.request(RequestDeviceOptions::accept_all())
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for NanoC6 devices in range.
///
/// Returns a list of discovered devices, or an error if the scan failed.
/// An empty list indicates no devices were found (not an error).
///
/// # Errors
///
/// Returns an error if:
/// - No Bluetooth adapter is available
/// - Bluetooth is not enabled
/// - The scan could not be started or stopped
pub async fn scan_for_devices() -> Result<Vec<DiscoveredDevice>> {
    scan_with_options(ScanOptions::default()).await
}

/// Scan for devices with custom options.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan for devices with retry logic for flaky Bluetooth environments.
///
/// A delay is applied between retries, starting at 500ms and doubling each attempt.
///
/// # Example
///
/// ```ignore
/// use nanoc6_core::scan::{ScanOptions, scan_with_retry};
///
/// // Retry up to 3 times, including when no devices found
/// let devices = scan_with_retry(ScanOptions::default(), 3, true).await?;
/// ```
pub async fn scan_with_retry(
    options: ScanOptions,
    max_retries: u32,
    retry_on_empty: bool,
) -> Result<Vec<DiscoveredDevice>> {
    let mut attempt = 0;
    let mut delay = Duration::from_millis(500);

    loop {
        match scan_with_options(options.clone()).await {
            Ok(devices) if devices.is_empty() && retry_on_empty && attempt < max_retries => {
                attempt += 1;
                warn!("No devices found, retrying ({}/{})...", attempt, max_retries);
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(Duration::from_secs(5));
            }
            Ok(devices) => return Ok(devices),
            Err(e @ Error::InvalidConfig(_)) => return Err(e),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!("Scan failed ({}), retrying ({}/{})...", e, attempt, max_retries);
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(Duration::from_secs(5));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scan for devices using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    let matcher = options.request.compile()?;
    let nanoc6 = RequestDeviceOptions::nanoc6().compile()?;

    info!("Starting BLE scan for {} seconds...", options.duration.as_secs());

    adapter.start_scan(platform_filter(&matcher)).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let peripherals = adapter.peripherals().await?;
    let mut discovered = Vec::new();

    for peripheral in peripherals {
        match process_peripheral(&peripheral, &matcher, &nanoc6).await {
            Ok(Some(device)) => {
                info!("Found device: {:?}", device.name);
                discovered.push(device);
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Error processing peripheral: {}", e);
            }
        }
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

/// Service filter handed to the platform scanner.
///
/// Only used when every request filter names a service; name-only filters
/// have to see every advertisement.
fn platform_filter(matcher: &DeviceMatcher) -> ScanFilter {
    ScanFilter {
        services: matcher.scan_services().unwrap_or_default(),
    }
}

/// Process a peripheral and check it against the request.
async fn process_peripheral(
    peripheral: &Peripheral,
    matcher: &DeviceMatcher,
    nanoc6: &DeviceMatcher,
) -> Result<Option<DiscoveredDevice>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let advertised = advertised_device(&properties);
    if !matcher.matches(&advertised) {
        return Ok(None);
    }

    let id = peripheral.id();
    let address = properties.address.to_string();
    let identifier = create_identifier(&address, &id);

    Ok(Some(DiscoveredDevice {
        name: properties.local_name.clone(),
        mac_address: mac_address(&properties),
        id,
        address,
        identifier,
        rssi: properties.rssi,
        services: properties.services.clone(),
        is_nanoc6: nanoc6.matches(&advertised),
    }))
}

/// Find a specific device by name or address.
pub async fn find_device(identifier: &str) -> Result<(Adapter, Peripheral)> {
    find_device_with_options(identifier, ScanOptions::default()).await
}

/// Find a specific device by name or address with custom options.
///
/// This function uses a retry strategy to improve reliability:
/// 1. First checks if the device is already known (cached from previous scans)
/// 2. Performs up to 3 scan attempts with increasing durations
pub async fn find_device_with_options(
    identifier: &str,
    options: ScanOptions,
) -> Result<(Adapter, Peripheral)> {
    find_device_with_progress(identifier, options, None).await
}

/// Find a specific device with progress callback for UI feedback.
pub async fn find_device_with_progress(
    identifier: &str,
    options: ScanOptions,
    progress: Option<ProgressCallback>,
) -> Result<(Adapter, Peripheral)> {
    let adapter = get_adapter().await?;
    let identifier_lower = identifier.to_lowercase();

    info!("Looking for device: {}", identifier);

    if let Some(peripheral) = find_peripheral_by_identifier(&adapter, &identifier_lower).await? {
        info!("Found device in cache (no scan needed)");
        if let Some(ref cb) = progress {
            cb(FindProgress::CacheHit);
        }
        return Ok((adapter, peripheral));
    }

    let max_attempts: u32 = 3;
    let base_duration = options.duration.as_millis() as u64 / 2;
    let base_duration = Duration::from_millis(base_duration.max(2000));

    for attempt in 1..=max_attempts {
        let scan_duration = base_duration * attempt;
        let duration_secs = scan_duration.as_secs();

        info!("Scan attempt {}/{} ({}s)...", attempt, max_attempts, duration_secs);

        if let Some(ref cb) = progress {
            cb(FindProgress::ScanAttempt {
                attempt,
                total: max_attempts,
                duration_secs,
            });
        }

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) =
            find_peripheral_by_identifier(&adapter, &identifier_lower).await?
        {
            info!("Found device on attempt {}", attempt);
            if let Some(ref cb) = progress {
                cb(FindProgress::Found { attempt });
            }
            return Ok((adapter, peripheral));
        }

        if attempt < max_attempts {
            warn!("Device not found, retrying...");
            if let Some(ref cb) = progress {
                cb(FindProgress::RetryNeeded { attempt });
            }
        }
    }

    warn!("Device not found after {} attempts: {}", max_attempts, identifier);
    Err(Error::device_not_found(identifier))
}

/// Search through known peripherals to find one matching the identifier.
async fn find_peripheral_by_identifier(
    adapter: &Adapter,
    identifier_lower: &str,
) -> Result<Option<Peripheral>> {
    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Ok(Some(props)) = peripheral.properties().await {
            let address = props.address.to_string();
            let peripheral_id = format_peripheral_id(&peripheral.id());

            if identifier_matches(
                identifier_lower,
                &peripheral_id,
                &address,
                props.local_name.as_deref(),
            ) {
                debug!("Matched {} ({:?})", peripheral_id, props.local_name);
                return Ok(Some(peripheral));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanoc6_types::uuid::UART_SERVICE;
    use nanoc6_types::ScanFilter as RequestFilter;

    #[test]
    fn test_default_options_target_nanoc6() {
        let options = ScanOptions::default();
        assert_eq!(options.duration, Duration::from_secs(5));
        assert_eq!(options.request, RequestDeviceOptions::nanoc6());
    }

    #[test]
    fn test_all_devices() {
        let options = ScanOptions::new().duration_secs(2).all_devices();
        assert!(options.request.accept_all_devices);
        assert_eq!(options.duration, Duration::from_secs(2));
    }

    #[test]
    fn test_platform_filter_requires_services_in_every_filter() {
        let matcher = RequestDeviceOptions::nanoc6().compile().unwrap();
        assert!(platform_filter(&matcher).services.is_empty());

        let request = RequestDeviceOptions {
            accept_all_devices: false,
            filters: vec![RequestFilter {
                services: Some(vec![UART_SERVICE.into()]),
                ..Default::default()
            }],
            optional_services: Vec::new(),
        };
        let matcher = request.compile().unwrap();
        assert_eq!(platform_filter(&matcher).services, vec![UART_SERVICE]);
    }
}
