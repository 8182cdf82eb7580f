//! Trait abstraction over the hosted readings store.
//!
//! [`ReadingsBackend`] covers the two tables the system uses: `readings`,
//! which devices append to and the page reads from, and `devices`, which
//! records registered devices.

use async_trait::async_trait;

use nanoc6_types::{Device, MacAddress, NewDevice, NewReading, Reading};

use crate::error::Result;
use crate::query::ReadingQuery;

/// Operations against the readings store.
///
/// Implemented by [`SupabaseClient`](crate::SupabaseClient) for the hosted
/// backend and by [`MockBackend`](crate::MockBackend) for tests.
///
/// # Example
///
/// ```ignore
/// use nanoc6_core::{ReadingQuery, ReadingsBackend, Result};
///
/// async fn latest<B: ReadingsBackend + ?Sized>(backend: &B) -> Result<usize> {
///     let rows = backend.select_readings(&ReadingQuery::new().limit(10)).await?;
///     Ok(rows.unwrap_or_default().len())
/// }
/// ```
#[async_trait]
pub trait ReadingsBackend: Send + Sync {
    /// Fetch readings matching `query`.
    ///
    /// `Ok(None)` means the store answered with no result at all, which is
    /// distinct from an empty result set.
    async fn select_readings(&self, query: &ReadingQuery) -> Result<Option<Vec<Reading>>>;

    /// Append a reading.
    async fn insert_reading(&self, reading: &NewReading) -> Result<()>;

    /// Look up a registered device by MAC address.
    async fn find_device(&self, mac: &MacAddress) -> Result<Option<Device>>;

    /// Register a device and return the stored row.
    async fn register_device(&self, device: &NewDevice) -> Result<Device>;

    /// Update the last-seen time of a registered device.
    async fn touch_device(&self, mac: &MacAddress, connected_at: i64) -> Result<()>;

    /// Whether a device with this MAC address is registered.
    async fn is_registered(&self, mac: &MacAddress) -> Result<bool> {
        Ok(self.find_device(mac).await?.is_some())
    }
}
