//! Device request options and scan filters.
//!
//! These follow the shape of a browser `requestDevice` call: either accept
//! every device, or list filters of which at least one must match. Options
//! are validated once with [`RequestDeviceOptions::compile`], which resolves
//! every UUID and yields a [`DeviceMatcher`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::advertising::AdvertisingData;
use crate::error::ParseError;
use crate::gatt::BluetoothUuid;
use crate::types::DEVICE_NAME_PREFIX;
use crate::uuid::{UART_SERVICE, from_short};

/// Longest device name a filter may match, in bytes.
pub const MAX_NAME_LEN: usize = 248;

/// Options for requesting a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDeviceOptions {
    pub accept_all_devices: bool,
    pub filters: Vec<ScanFilter>,
    /// Services the caller may access beyond those named by filters.
    pub optional_services: Vec<BluetoothUuid>,
}

/// A single scan filter. Every criterion present must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<BluetoothUuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_data: Option<Vec<ManufacturerDataFilter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_data: Option<Vec<ServiceDataFilter>>,
}

/// Match manufacturer data by company identifier and masked prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManufacturerDataFilter {
    pub company_identifier: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_prefix: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<u8>>,
}

/// Match service data by service UUID and masked prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDataFilter {
    pub service: BluetoothUuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_prefix: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<u8>>,
}

impl RequestDeviceOptions {
    /// Options matching NanoC6 devices: by name prefix or by the UART service.
    pub fn nanoc6() -> Self {
        Self {
            accept_all_devices: false,
            filters: vec![
                ScanFilter {
                    name_prefix: Some(DEVICE_NAME_PREFIX.to_string()),
                    ..Default::default()
                },
                ScanFilter {
                    services: Some(vec![BluetoothUuid::from(UART_SERVICE)]),
                    ..Default::default()
                },
            ],
            optional_services: vec![BluetoothUuid::Alias(0x181A)],
        }
    }

    /// Accept every device.
    pub fn accept_all() -> Self {
        Self {
            accept_all_devices: true,
            ..Default::default()
        }
    }

    /// Validate the options and resolve all UUIDs.
    pub fn compile(&self) -> Result<DeviceMatcher, ParseError> {
        if self.accept_all_devices && !self.filters.is_empty() {
            return Err(ParseError::InvalidFilter(
                "filters cannot be combined with acceptAllDevices".to_string(),
            ));
        }
        if !self.accept_all_devices && self.filters.is_empty() {
            return Err(ParseError::InvalidFilter(
                "either filters or acceptAllDevices is required".to_string(),
            ));
        }

        let filters = self
            .filters
            .iter()
            .enumerate()
            .map(|(i, f)| {
                f.compile()
                    .map_err(|e| ParseError::InvalidFilter(format!("filters[{}]: {}", i, reason(e))))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let optional_services = self
            .optional_services
            .iter()
            .map(BluetoothUuid::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeviceMatcher {
            accept_all: self.accept_all_devices,
            filters,
            optional_services,
        })
    }
}

fn reason(err: ParseError) -> String {
    match err {
        ParseError::InvalidFilter(msg) => msg,
        other => other.to_string(),
    }
}

impl ScanFilter {
    fn compile(&self) -> Result<CompiledFilter, ParseError> {
        let is_empty = self.name.is_none()
            && self.name_prefix.is_none()
            && self.services.is_none()
            && self.manufacturer_data.is_none()
            && self.service_data.is_none();
        if is_empty {
            return Err(ParseError::InvalidFilter("filter has no criteria".to_string()));
        }

        if let Some(name) = &self.name
            && name.len() > MAX_NAME_LEN
        {
            return Err(ParseError::InvalidFilter("name is too long".to_string()));
        }
        if let Some(prefix) = &self.name_prefix {
            if prefix.is_empty() {
                return Err(ParseError::InvalidFilter("namePrefix is empty".to_string()));
            }
            if prefix.len() > MAX_NAME_LEN {
                return Err(ParseError::InvalidFilter("namePrefix is too long".to_string()));
            }
        }

        let services = match &self.services {
            Some(list) if list.is_empty() => {
                return Err(ParseError::InvalidFilter("services is empty".to_string()));
            }
            Some(list) => list
                .iter()
                .map(BluetoothUuid::resolve)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let manufacturer_data = match &self.manufacturer_data {
            Some(list) if list.is_empty() => {
                return Err(ParseError::InvalidFilter("manufacturerData is empty".to_string()));
            }
            Some(list) => list
                .iter()
                .map(|f| {
                    DataPattern::new(f.data_prefix.as_deref(), f.mask.as_deref())
                        .map(|pattern| (f.company_identifier, pattern))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let service_data = match &self.service_data {
            Some(list) if list.is_empty() => {
                return Err(ParseError::InvalidFilter("serviceData is empty".to_string()));
            }
            Some(list) => list
                .iter()
                .map(|f| {
                    let service = f.service.resolve()?;
                    DataPattern::new(f.data_prefix.as_deref(), f.mask.as_deref())
                        .map(|pattern| (service, pattern))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(CompiledFilter {
            name: self.name.clone(),
            name_prefix: self.name_prefix.clone(),
            services,
            manufacturer_data,
            service_data,
        })
    }
}

/// What a scan observed about a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedDevice {
    pub name: Option<String>,
    pub services: Vec<Uuid>,
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
}

impl From<AdvertisingData> for AdvertisedDevice {
    fn from(data: AdvertisingData) -> Self {
        Self {
            name: data.name,
            services: data.services.into_iter().map(from_short).collect(),
            manufacturer_data: data.manufacturer_data,
            service_data: data
                .service_data
                .into_iter()
                .map(|(uuid, value)| (from_short(uuid), value))
                .collect(),
        }
    }
}

/// Validated request options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    accept_all: bool,
    filters: Vec<CompiledFilter>,
    optional_services: Vec<Uuid>,
}

impl DeviceMatcher {
    /// Whether the device satisfies the options.
    pub fn matches(&self, device: &AdvertisedDevice) -> bool {
        self.accept_all || self.filters.iter().any(|f| f.matches(device))
    }

    /// Services a connection made through these options may access.
    pub fn allowed_services(&self) -> Vec<Uuid> {
        let mut allowed: Vec<Uuid> = Vec::new();
        for uuid in self
            .filters
            .iter()
            .flat_map(|f| f.services.iter())
            .chain(self.optional_services.iter())
        {
            if !allowed.contains(uuid) {
                allowed.push(*uuid);
            }
        }
        allowed
    }

    /// Service UUIDs worth passing to the platform scanner, if every filter
    /// names at least one service.
    pub fn scan_services(&self) -> Option<Vec<Uuid>> {
        if self.accept_all || self.filters.iter().any(|f| f.services.is_empty()) {
            return None;
        }
        let mut services: Vec<Uuid> = self.filters.iter().flat_map(|f| f.services.clone()).collect();
        services.dedup();
        Some(services)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CompiledFilter {
    name: Option<String>,
    name_prefix: Option<String>,
    services: Vec<Uuid>,
    manufacturer_data: Vec<(u16, DataPattern)>,
    service_data: Vec<(Uuid, DataPattern)>,
}

impl CompiledFilter {
    fn matches(&self, device: &AdvertisedDevice) -> bool {
        if let Some(name) = &self.name
            && device.name.as_deref() != Some(name.as_str())
        {
            return false;
        }
        if let Some(prefix) = &self.name_prefix {
            match &device.name {
                Some(device_name) if device_name.starts_with(prefix.as_str()) => {}
                _ => return false,
            }
        }
        if !self.services.iter().all(|s| device.services.contains(s)) {
            return false;
        }
        let manufacturer_ok = self.manufacturer_data.iter().all(|(company, pattern)| {
            device
                .manufacturer_data
                .get(company)
                .is_some_and(|data| pattern.matches(data))
        });
        if !manufacturer_ok {
            return false;
        }
        self.service_data.iter().all(|(service, pattern)| {
            device
                .service_data
                .get(service)
                .is_some_and(|data| pattern.matches(data))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DataPattern {
    prefix: Vec<u8>,
    mask: Vec<u8>,
}

impl DataPattern {
    fn new(prefix: Option<&[u8]>, mask: Option<&[u8]>) -> Result<Self, ParseError> {
        match (prefix, mask) {
            (None, None) => Ok(Self::default()),
            (None, Some(_)) => Err(ParseError::InvalidFilter(
                "mask requires dataPrefix".to_string(),
            )),
            (Some(prefix), None) => Ok(Self {
                prefix: prefix.to_vec(),
                mask: vec![0xFF; prefix.len()],
            }),
            (Some(prefix), Some(mask)) if prefix.len() != mask.len() => {
                Err(ParseError::InvalidFilter(format!(
                    "mask length {} does not match dataPrefix length {}",
                    mask.len(),
                    prefix.len()
                )))
            }
            (Some(prefix), Some(mask)) => Ok(Self {
                prefix: prefix.to_vec(),
                mask: mask.to_vec(),
            }),
        }
    }

    fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.prefix.len()
            && self
                .prefix
                .iter()
                .zip(&self.mask)
                .zip(data)
                .all(|((p, m), d)| d & m == p & m)
    }
}
