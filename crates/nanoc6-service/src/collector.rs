//! Background data collector.
//!
//! Each configured device gets its own task. On every tick the task connects
//! over BLE, asks for a fresh sample, acknowledges it, disconnects and
//! inserts the reading through the backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use nanoc6_core::{
    ConnectionConfig, Device, MacAddress, NewReading, RetryConfig, SensorDevice, SensorSample,
    with_retry,
};

use crate::config::DeviceConfig;
use crate::state::{AppState, DeviceCollectionStats};

/// Opens connections to devices.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the device at `address`.
    async fn connect(&self, address: &str) -> nanoc6_core::Result<Box<dyn SensorDevice>>;
}

/// Connects over Bluetooth Low Energy.
#[derive(Debug, Clone, Default)]
pub struct BleConnector {
    config: ConnectionConfig,
}

impl BleConnector {
    /// Create a connector with custom timeouts.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for BleConnector {
    async fn connect(&self, address: &str) -> nanoc6_core::Result<Box<dyn SensorDevice>> {
        let device = Device::connect_with_config(address, self.config.clone()).await?;
        Ok(Box::new(device))
    }
}

/// Background collector that polls devices on their configured intervals.
pub struct Collector {
    state: Arc<AppState>,
    connector: Arc<dyn Connector>,
    connect_retry: RetryConfig,
    upload_retry: RetryConfig,
    handles: Vec<JoinHandle<()>>,
}

impl Collector {
    /// Create a collector that connects over BLE.
    pub fn new(state: Arc<AppState>) -> Self {
        Self::with_connector(state, Arc::new(BleConnector::default()))
    }

    /// Create a collector with a custom connector.
    pub fn with_connector(state: Arc<AppState>, connector: Arc<dyn Connector>) -> Self {
        Self {
            state,
            connector,
            connect_retry: RetryConfig::for_connect(),
            upload_retry: RetryConfig::for_backend(),
            handles: Vec::new(),
        }
    }

    /// Set the retry policy for connecting and for uploads.
    #[must_use]
    pub fn retry(mut self, connect: RetryConfig, upload: RetryConfig) -> Self {
        self.connect_retry = connect;
        self.upload_retry = upload;
        self
    }

    /// Start collecting data from all configured devices.
    ///
    /// This spawns a separate task for each device that polls at the configured interval.
    /// Returns immediately; collection happens in the background.
    pub async fn start(&mut self) {
        let devices = self.state.config.read().await.devices.clone();

        if devices.is_empty() {
            info!("No devices configured for collection");
            return;
        }

        info!("Starting collector for {} device(s)", devices.len());

        self.state.collector.reset_stop();
        *self.state.collector.device_stats.write().await =
            devices.iter().map(DeviceCollectionStats::new).collect();
        self.state.collector.set_running(true);

        let cancel = self.state.collector.cancel_token();
        for device_config in devices {
            let task = DeviceTask {
                state: Arc::clone(&self.state),
                connector: Arc::clone(&self.connector),
                connect_retry: self.connect_retry.clone(),
                upload_retry: self.upload_retry.clone(),
                config: device_config,
            };
            let cancel = cancel.clone();
            self.handles
                .push(tokio::spawn(async move { task.run(cancel).await }));
        }
    }

    /// Stop all device tasks and wait for them to finish.
    pub async fn stop(&mut self) {
        self.state.collector.signal_stop();
        for result in futures::future::join_all(self.handles.drain(..)).await {
            if let Err(e) = result
                && !e.is_cancelled()
            {
                error!("Collector task failed: {}", e);
            }
        }
        info!("Collector stopped");
    }

    /// Number of running device tasks.
    pub fn task_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

struct DeviceTask {
    state: Arc<AppState>,
    connector: Arc<dyn Connector>,
    connect_retry: RetryConfig,
    upload_retry: RetryConfig,
    config: DeviceConfig,
}

impl DeviceTask {
    async fn run(self, cancel: CancellationToken) {
        let device_id = self.config.address.as_str();
        let poll_interval = Duration::from_secs(self.config.poll_interval);

        info!(
            "Starting collector for {} (alias: {}, interval: {}s)",
            device_id,
            self.config.display_name(),
            self.config.poll_interval
        );

        let mut interval_timer = interval(poll_interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Collector for {} stopped", device_id);
                    return;
                }
                _ = interval_timer.tick() => {}
            }

            self.state
                .collector
                .update_stats(device_id, |s| s.polling = true)
                .await;

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    self.state.collector.update_stats(device_id, |s| s.polling = false).await;
                    return;
                }
                result = self.poll() => result,
            };

            match result {
                Ok(sample) => {
                    consecutive_failures = 0;
                    debug!(
                        "Collected reading from {}: {:.1} C",
                        device_id, sample.temperature
                    );
                    self.state
                        .collector
                        .update_stats(device_id, |s| {
                            s.polling = false;
                            s.success_count += 1;
                            s.last_poll_at = Some(OffsetDateTime::now_utc());
                            s.last_sample = Some(sample);
                        })
                        .await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!(
                            "Failed to poll {}: {} (attempt {})",
                            device_id, e, consecutive_failures
                        );
                    } else if consecutive_failures == 4 {
                        error!(
                            "Failed to poll {} after {} attempts, will continue trying silently",
                            device_id, consecutive_failures
                        );
                    }
                    let message = e.to_string();
                    self.state
                        .collector
                        .update_stats(device_id, |s| {
                            s.polling = false;
                            s.failure_count += 1;
                            s.last_error_at = Some(OffsetDateTime::now_utc());
                            s.last_error = Some(message);
                        })
                        .await;
                }
            }
        }
    }

    /// Poll the device once and upload the sample.
    async fn poll(&self) -> Result<SensorSample, CollectorError> {
        let address = self.config.address.as_str();
        let device = with_retry(&self.connect_retry, "connect", || {
            self.connector.connect(address)
        })
        .await
        .map_err(CollectorError::Connect)?;

        let result = self.exchange(device.as_ref()).await;
        if let Err(e) = device.disconnect().await {
            debug!("Disconnect from {} failed: {}", address, e);
        }
        let (mac, sample) = result?;

        let reading = NewReading::from_sample(&mac, &sample);
        let backend = &self.state.backend;
        with_retry(&self.upload_retry, "insert reading", || {
            backend.insert_reading(&reading)
        })
        .await
        .map_err(CollectorError::Upload)?;

        Ok(sample)
    }

    async fn exchange(
        &self,
        device: &dyn SensorDevice,
    ) -> Result<(MacAddress, SensorSample), CollectorError> {
        let mac = self.resolve_mac(device)?;
        let sample = device
            .request_readings()
            .await
            .map_err(CollectorError::Read)?;
        if let Err(e) = device.acknowledge().await {
            // Info firmware drops the link right after acknowledging.
            debug!("Acknowledge to {} failed: {}", self.config.address, e);
        }
        Ok((mac, sample))
    }

    /// MAC address to report readings under.
    fn resolve_mac(&self, device: &dyn SensorDevice) -> Result<MacAddress, CollectorError> {
        self.config
            .mac
            .as_deref()
            .into_iter()
            .chain([self.config.address.as_str(), device.address()])
            .find_map(|candidate| candidate.parse().ok())
            .ok_or_else(|| CollectorError::UnknownMac(self.config.address.clone()))
    }
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to connect: {0}")]
    Connect(nanoc6_core::Error),
    #[error("Failed to read: {0}")]
    Read(nanoc6_core::Error),
    #[error("Failed to upload: {0}")]
    Upload(nanoc6_core::Error),
    #[error("No MAC address known for {0}; set `mac` in the device config")]
    UnknownMac(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use nanoc6_core::{Error, MockBackend, MockDeviceBuilder, Profile};

    use crate::config::Config;

    const MAC: &str = "4C:75:25:D4:E5:F6";

    struct MockConnector {
        profile: Profile,
        connects: AtomicU32,
        fail: bool,
    }

    impl MockConnector {
        fn new(profile: Profile) -> Self {
            Self {
                profile,
                connects: AtomicU32::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, address: &str) -> nanoc6_core::Result<Box<dyn SensorDevice>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::device_not_found(address));
            }
            let device = MockDeviceBuilder::new()
                .mac(MAC.parse().unwrap())
                .profile(self.profile)
                .temperature(23.0)
                .build();
            Ok(Box::new(device))
        }
    }

    fn state_with(devices: Vec<DeviceConfig>) -> (Arc<AppState>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let config = Config {
            devices,
            ..Default::default()
        };
        (AppState::new(backend.clone(), config), backend)
    }

    fn task(state: &Arc<AppState>, connector: Arc<dyn Connector>, config: DeviceConfig) -> DeviceTask {
        DeviceTask {
            state: Arc::clone(state),
            connector,
            connect_retry: RetryConfig::none(),
            upload_retry: RetryConfig::none(),
            config,
        }
    }

    #[tokio::test]
    async fn test_poll_uploads_reading() {
        let (state, backend) = state_with(Vec::new());
        let task = task(
            &state,
            Arc::new(MockConnector::new(Profile::Readings)),
            DeviceConfig::new(MAC),
        );

        let sample = task.poll().await.unwrap();
        assert_eq!(sample.temperature, 23.0);

        let readings = backend.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].mac_address(), Some("4C7525D4E5F6"));
        assert_eq!(readings[0].temperature(), Some(23.0));
    }

    #[tokio::test]
    async fn test_poll_resolves_mac_from_config() {
        let (state, backend) = state_with(Vec::new());
        let config = DeviceConfig {
            mac: Some("A1B2C3D4E5F6".to_string()),
            ..DeviceConfig::new("NanoC6-D4E5F6")
        };
        let task = task(&state, Arc::new(MockConnector::new(Profile::Readings)), config);

        task.poll().await.unwrap();
        assert_eq!(backend.readings()[0].mac_address(), Some("A1B2C3D4E5F6"));
    }

    #[tokio::test]
    async fn test_poll_resolves_mac_from_device() {
        let (state, backend) = state_with(Vec::new());
        let task = task(
            &state,
            Arc::new(MockConnector::new(Profile::Readings)),
            DeviceConfig::new("NanoC6-D4E5F6"),
        );

        task.poll().await.unwrap();
        assert_eq!(backend.readings()[0].mac_address(), Some("4C7525D4E5F6"));
    }

    #[tokio::test]
    async fn test_poll_connect_failure() {
        let (state, backend) = state_with(Vec::new());
        let connector = Arc::new(MockConnector {
            fail: true,
            ..MockConnector::new(Profile::Readings)
        });
        let task = task(&state, connector.clone(), DeviceConfig::new(MAC));

        let err = task.poll().await.unwrap_err();
        assert!(matches!(err, CollectorError::Connect(_)));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(backend.readings().is_empty());
    }

    #[tokio::test]
    async fn test_poll_wrong_firmware() {
        let (state, backend) = state_with(Vec::new());
        let task = task(
            &state,
            Arc::new(MockConnector::new(Profile::Uart)),
            DeviceConfig::new(MAC),
        );

        let err = task.poll().await.unwrap_err();
        assert!(matches!(err, CollectorError::Read(_)));
        assert!(backend.readings().is_empty());
    }

    #[tokio::test]
    async fn test_poll_upload_failure() {
        let (state, backend) = state_with(Vec::new());
        backend.set_should_fail(true, Some("offline".to_string()));
        let task = task(
            &state,
            Arc::new(MockConnector::new(Profile::Readings)),
            DeviceConfig::new(MAC),
        );

        let err = task.poll().await.unwrap_err();
        assert!(matches!(err, CollectorError::Upload(_)));
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn test_collector_start_and_stop() {
        let (state, backend) = state_with(vec![DeviceConfig::new(MAC)]);
        let mut collector =
            Collector::with_connector(Arc::clone(&state), Arc::new(MockConnector::new(Profile::Readings)))
                .retry(RetryConfig::none(), RetryConfig::none());

        collector.start().await;
        assert!(state.collector.is_running());
        assert_eq!(collector.task_count(), 1);

        // The first tick fires immediately.
        let mut polled = false;
        for _ in 0..100 {
            if state.collector.device_stats.read().await[0].success_count > 0 {
                polled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(polled);
        assert_eq!(backend.readings().len(), 1);

        collector.stop().await;
        assert!(!state.collector.is_running());
        assert_eq!(collector.task_count(), 0);

        let stats = state.collector.device_stats.read().await;
        assert!(stats[0].last_sample.is_some());
        assert!(!stats[0].polling);
    }

    #[tokio::test]
    async fn test_collector_without_devices() {
        let (state, _) = state_with(Vec::new());
        let mut collector = Collector::new(Arc::clone(&state));
        collector.start().await;
        assert!(!state.collector.is_running());
        assert_eq!(collector.task_count(), 0);
    }
}
