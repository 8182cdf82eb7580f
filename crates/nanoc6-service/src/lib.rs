//! Readings page, JSON API and background BLE collector for NanoC6 sensors.
//!
//! This crate provides a service that:
//! - Polls configured NanoC6 devices over BLE on a schedule
//! - Uploads their readings to the backend
//! - Renders the readings table as an HTML page
//! - Exposes the same readings as JSON
//!
//! # HTTP Endpoints
//!
//! - `GET /` - Readings page, newest first
//! - `GET /api/readings` - Readings as JSON (`device`, `since`, `until`, `limit`, `offset`)
//! - `GET /api/devices/{mac}` - Registered device lookup
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Collector state and per-device stats
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/nanoc6/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [backend]
//! url = "https://project.supabase.co"
//! api_key = "anon-key"
//!
//! [page]
//! title = "Readings"
//! limit = 100
//!
//! [[devices]]
//! address = "NanoC6-D4E5F6"
//! alias = "office"
//! mac = "4C7525D4E5F6"
//! poll_interval = 600
//! ```
//!
//! `NANOC6_BACKEND_URL` and `NANOC6_API_KEY` override the backend settings.

pub mod api;
pub mod collector;
pub mod config;
pub mod page;
pub mod state;

pub use collector::{BleConnector, Collector, CollectorError, Connector};
pub use config::{
    BackendConfig, Config, ConfigError, DeviceConfig, PageConfig, ServerConfig, ValidationError,
};
pub use state::{AppState, CollectorState, DeviceCollectionStats};
