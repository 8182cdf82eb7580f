//! Application state shared across handlers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use nanoc6_core::{ReadingsBackend, SensorSample};

use crate::config::{Config, DeviceConfig};

/// Shared application state.
pub struct AppState {
    /// The readings backend.
    pub backend: Arc<dyn ReadingsBackend>,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// Collector control state.
    pub collector: CollectorState,
}

impl AppState {
    /// Create new application state.
    pub fn new(backend: Arc<dyn ReadingsBackend>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config: RwLock::new(config),
            collector: CollectorState::new(),
        })
    }
}

/// State for tracking and controlling the collector.
pub struct CollectorState {
    /// Whether the collector is currently running.
    running: AtomicBool,
    /// When the collector was started (Unix timestamp).
    started_at: AtomicU64,
    /// Cancelled to stop collector tasks; replaced on restart.
    cancel: Mutex<CancellationToken>,
    /// Per-device collection stats.
    pub device_stats: RwLock<Vec<DeviceCollectionStats>>,
}

impl CollectorState {
    /// Create a new collector state.
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
            device_stats: RwLock::new(Vec::new()),
        }
    }

    /// Check if the collector is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the collector as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// Get the collector start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Token collector tasks watch for the stop signal.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Signal all collector tasks to stop.
    pub fn signal_stop(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Replace a cancelled token so the collector can be started again.
    pub fn reset_stop(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
    }

    /// Apply an update to the stats of one device.
    pub async fn update_stats<F>(&self, device_id: &str, update: F)
    where
        F: FnOnce(&mut DeviceCollectionStats),
    {
        let mut stats = self.device_stats.write().await;
        if let Some(entry) = stats.iter_mut().find(|s| s.device_id == device_id) {
            update(entry);
        }
    }
}

impl Default for CollectorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection statistics for a single device.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceCollectionStats {
    /// Device ID/address.
    pub device_id: String,
    /// Device alias.
    pub alias: Option<String>,
    /// Poll interval in seconds.
    pub poll_interval: u64,
    /// Time of last successful poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_poll_at: Option<OffsetDateTime>,
    /// Time of last failed poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Last sample collected.
    pub last_sample: Option<SensorSample>,
    /// Total successful polls.
    pub success_count: u64,
    /// Total failed polls.
    pub failure_count: u64,
    /// Whether the device is currently being polled.
    pub polling: bool,
}

impl DeviceCollectionStats {
    /// Fresh stats for a configured device.
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            device_id: config.address.clone(),
            alias: config.alias.clone(),
            poll_interval: config.poll_interval,
            last_poll_at: None,
            last_error_at: None,
            last_error: None,
            last_sample: None,
            success_count: 0,
            failure_count: 0,
            polling: false,
        }
    }
}
