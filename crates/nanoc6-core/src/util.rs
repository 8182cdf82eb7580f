//! Helpers shared by scanning and connecting.

use btleplug::api::PeripheralProperties;
use btleplug::platform::PeripheralId;

use nanoc6_types::{AdvertisedDevice, MacAddress};

/// Address reported by platforms that hide MAC addresses (macOS).
pub const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they are
/// MAC addresses or D-Bus paths.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are hidden, uses the peripheral ID.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    choose_identifier(address, || format_peripheral_id(peripheral_id))
}

fn choose_identifier(address: &str, peripheral_id: impl FnOnce() -> String) -> String {
    if address == HIDDEN_ADDRESS {
        peripheral_id()
    } else {
        address.to_string()
    }
}

/// Convert scan properties into the form request filters match against.
pub fn advertised_device(properties: &PeripheralProperties) -> AdvertisedDevice {
    AdvertisedDevice {
        name: properties.local_name.clone(),
        services: properties.services.clone(),
        manufacturer_data: properties
            .manufacturer_data
            .iter()
            .map(|(id, data)| (*id, data.clone()))
            .collect(),
        service_data: properties
            .service_data
            .iter()
            .map(|(uuid, data)| (*uuid, data.clone()))
            .collect(),
    }
}

/// MAC address of a peripheral, when the platform exposes it.
pub fn mac_address(properties: &PeripheralProperties) -> Option<MacAddress> {
    let address = properties.address.to_string();
    if address == HIDDEN_ADDRESS {
        return None;
    }
    address.parse().ok()
}

/// Whether a user-supplied identifier selects a peripheral.
///
/// `identifier` must be lowercase. Matches the peripheral ID, the address
/// with or without colons, or a substring of the name.
pub fn identifier_matches(
    identifier: &str,
    peripheral_id: &str,
    address: &str,
    name: Option<&str>,
) -> bool {
    if peripheral_id.to_lowercase().contains(identifier) {
        return true;
    }

    let address = address.to_lowercase();
    if address != HIDDEN_ADDRESS
        && (address == identifier || address.replace(':', "") == identifier.replace(':', ""))
    {
        return true;
    }

    name.is_some_and(|n| n.to_lowercase().contains(identifier))
}
