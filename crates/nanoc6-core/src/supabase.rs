//! HTTP client for the hosted readings backend.
//!
//! The backend is a Supabase project; its tables are served by PostgREST
//! under `<project url>/rest/v1`. Every request carries the project API key
//! both as the `apikey` header and as a bearer token.
//!
//! # Example
//!
//! ```no_run
//! use nanoc6_core::{ReadingQuery, ReadingsBackend, SupabaseClient};
//!
//! # async fn example() -> Result<(), nanoc6_core::Error> {
//! let client = SupabaseClient::new("https://example.supabase.co", "anon-key")?;
//!
//! let readings = client.select_readings(&ReadingQuery::new()).await?;
//! println!("{} readings", readings.unwrap_or_default().len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use nanoc6_types::{Device, MacAddress, NewDevice, NewReading, Reading};

use crate::backend::ReadingsBackend;
use crate::error::{Error, Result};
use crate::query::ReadingQuery;

/// Path PostgREST is mounted under.
pub const REST_PATH: &str = "/rest/v1";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Readings table.
pub const READINGS_TABLE: &str = "readings";

/// Devices table.
pub const DEVICES_TABLE: &str = "devices";

/// Client for the Supabase REST API.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct TouchDevice {
    connected_at: i64,
}

impl SupabaseClient {
    /// Create a client for a project URL with the default timeout.
    ///
    /// # Arguments
    ///
    /// * `url` - The project URL (e.g., "https://abc.supabase.co"). A trailing
    ///   `/rest/v1` is accepted.
    /// * `api_key` - The project API key.
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        Self::with_timeout(url, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(url, api_key, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(url: &str, api_key: &str, client: Client) -> Result<Self> {
        let rest_url = rest_url(url)?;
        if api_key.trim().is_empty() {
            return Err(Error::invalid_config("API key must not be empty"));
        }
        // Reject keys that cannot be sent as a header up front.
        HeaderValue::from_str(api_key)
            .map_err(|_| Error::invalid_config("API key contains invalid characters"))?;

        Ok(Self {
            client,
            rest_url,
            api_key: api_key.to_string(),
        })
    }

    /// The PostgREST base URL (ending in `/rest/v1`).
    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::invalid_config("API key contains invalid characters"))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::invalid_config("API key contains invalid characters"))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        let url = format!("{}/{}", self.rest_url, table);
        Ok(self.client.request(method, url).headers(self.headers()?))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} -> {}", operation, status);
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[async_trait]
impl ReadingsBackend for SupabaseClient {
    async fn select_readings(&self, query: &ReadingQuery) -> Result<Option<Vec<Reading>>> {
        let request = self
            .request(Method::GET, READINGS_TABLE)?
            .query(&query.to_params());
        let response = self.send("select readings", request).await?;

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice::<Option<Vec<Reading>>>(&body)
            .map_err(|e| Error::InvalidData(format!("readings response: {}", e)))
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<()> {
        let request = self
            .request(Method::POST, READINGS_TABLE)?
            .header("Prefer", "return=minimal")
            .form(reading);
        self.send("insert reading", request).await?;
        Ok(())
    }

    async fn find_device(&self, mac: &MacAddress) -> Result<Option<Device>> {
        let request = self.request(Method::GET, DEVICES_TABLE)?.query(&[
            ("mac_address", format!("eq.{}", mac)),
            ("select", "id".to_string()),
        ]);
        let response = self.send("find device", request).await?;
        let rows: Vec<Device> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn register_device(&self, device: &NewDevice) -> Result<Device> {
        let request = self
            .request(Method::POST, DEVICES_TABLE)?
            .header("Prefer", "return=representation")
            .json(device);
        let response = self.send("register device", request).await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            warn!("Device registration answered {} instead of 201", status);
            return Err(Error::backend(
                status.as_u16(),
                "device registration was not created",
            ));
        }

        let rows: Vec<Device> = response.json().await.unwrap_or_default();
        Ok(rows.into_iter().next().unwrap_or_else(|| Device {
            id: None,
            mac_address: Some(device.mac_address.clone()),
            name: Some(device.name.clone()),
            connected_at: Some(device.connected_at.into()),
        }))
    }

    async fn touch_device(&self, mac: &MacAddress, connected_at: i64) -> Result<()> {
        let request = self
            .request(Method::PATCH, DEVICES_TABLE)?
            .query(&[("mac_address", format!("eq.{}", mac))])
            .json(&TouchDevice { connected_at });
        self.send("touch device", request).await?;
        Ok(())
    }
}

/// Normalize a project URL into the PostgREST base URL.
fn rest_url(url: &str) -> Result<String> {
    let base = url.trim().trim_end_matches('/');

    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(Error::invalid_config(format!(
            "URL must start with http:// or https://, got: {}",
            url
        )));
    }
    let host = base.split_once("://").map(|(_, rest)| rest).unwrap_or_default();
    if host.is_empty() || host.starts_with('/') {
        return Err(Error::invalid_config(format!("URL has no host: {}", url)));
    }

    if base.ends_with(REST_PATH) {
        Ok(base.to_string())
    } else {
        Ok(format!("{}{}", base, REST_PATH))
    }
}

/// Build a structured error from a non-success response.
///
/// PostgREST reports failures as `{"message": ...}`; Supabase's gateway uses
/// `{"error": ...}` or `{"msg": ...}`.
async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| {
            ["message", "error", "msg"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(String::from))
        })
        .unwrap_or_else(|| status.to_string());

    Error::backend(status.as_u16(), message)
}
