//! Device-side agent.
//!
//! The [`Agent`] is the main loop of a NanoC6: it keeps track of whether the
//! device is registered with the backend, uploads a sensor sample every
//! reading interval while registered, and runs a temporary pairing
//! peripheral on request. Time comes from an injectable [`Clock`] so the
//! schedule can be driven deterministically.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nanoc6_core::agent::{Agent, AgentConfig, Indicator, ManualClock};
//! use nanoc6_core::MockBackend;
//! use nanoc6_types::{MacAddress, SensorSample};
//!
//! # #[tokio::main]
//! # async fn main() -> nanoc6_core::Result<()> {
//! let mac: MacAddress = "A1B2C3D4E5F6".parse().unwrap();
//! let backend = Arc::new(MockBackend::new());
//! backend.add_device(&mac);
//!
//! let sensor = || -> nanoc6_core::Result<SensorSample> {
//!     Ok(SensorSample { temperature: 21.0, humidity: 40.0, pressure: 1010.0, timestamp: 0 })
//! };
//! let mut agent = Agent::new(mac, backend.clone(), sensor, ManualClock::new(), AgentConfig::default());
//!
//! agent.setup().await;
//! agent.tick().await?;
//! assert_eq!(agent.indicator(), Indicator::Off);
//! assert_eq!(backend.readings().len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use nanoc6_types::{MacAddress, NewDevice, NewReading, SensorSample};

use crate::backend::ReadingsBackend;
use crate::error::Result;
use crate::peripheral::{Action, GattPeripheral, PeripheralEvent, Profile, WriteOutcome};

/// Time between uploads while registered.
pub const READING_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Registration check period while unregistered.
pub const UNREGISTERED_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Registration check period while registered.
pub const REGISTERED_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long pairing mode stays up without a registration.
pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Loop period used by [`Agent::run`].
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Agent schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub reading_interval: Duration,
    pub unregistered_check_interval: Duration,
    pub registered_check_interval: Duration,
    pub pairing_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            reading_interval: READING_INTERVAL,
            unregistered_check_interval: UNREGISTERED_CHECK_INTERVAL,
            registered_check_interval: REGISTERED_CHECK_INTERVAL,
            pairing_timeout: PAIRING_TIMEOUT,
        }
    }
}

impl AgentConfig {
    /// Set the reading interval.
    #[must_use]
    pub fn reading_interval(mut self, interval: Duration) -> Self {
        self.reading_interval = interval;
        self
    }

    /// Set both registration check intervals.
    #[must_use]
    pub fn check_intervals(mut self, unregistered: Duration, registered: Duration) -> Self {
        self.unregistered_check_interval = unregistered;
        self.registered_check_interval = registered;
        self
    }

    /// Set the pairing timeout.
    #[must_use]
    pub fn pairing_timeout(mut self, timeout: Duration) -> Self {
        self.pairing_timeout = timeout;
        self
    }
}

/// Status LED colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    /// Registered and working.
    #[default]
    Off,
    /// Waiting to be registered.
    White,
    /// Pairing mode.
    Blue,
    /// The loop hit an error.
    Red,
}

impl Indicator {
    /// `0xRRGGBB` colour for the LED.
    pub fn rgb(&self) -> u32 {
        match self {
            Indicator::Off => 0x000000,
            Indicator::White => 0xFFFFFF,
            Indicator::Blue => 0x0000FF,
            Indicator::Red => 0xFF0000,
        }
    }
}

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Clock backed by [`Instant`], starting at zero.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Source of environmental samples.
#[async_trait]
pub trait Sensor: Send + Sync {
    async fn sample(&self) -> Result<SensorSample>;
}

#[async_trait]
impl<F> Sensor for F
where
    F: Fn() -> Result<SensorSample> + Send + Sync,
{
    async fn sample(&self) -> Result<SensorSample> {
        self()
    }
}

/// Something the agent did during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    RegistrationChecked { registered: bool },
    ReadingUploaded(NewReading),
    ReadingFailed(String),
    PairingExpired,
}

struct Pairing {
    started_ms: u64,
    peripheral: GattPeripheral,
}

/// The device main loop.
pub struct Agent<B: ?Sized, S, C> {
    mac: MacAddress,
    backend: Arc<B>,
    sensor: S,
    clock: C,
    config: AgentConfig,
    registered: bool,
    force_reading: bool,
    last_reading_ms: u64,
    last_check_ms: u64,
    pairing: Option<Pairing>,
    indicator: Indicator,
}

impl<B, S, C> std::fmt::Debug for Agent<B, S, C>
where
    B: ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("mac", &self.mac)
            .field("registered", &self.registered)
            .field("pairing", &self.pairing.is_some())
            .field("indicator", &self.indicator)
            .finish()
    }
}

impl<B, S, C> Agent<B, S, C>
where
    B: ReadingsBackend + ?Sized,
    S: Sensor,
    C: Clock,
{
    pub fn new(mac: MacAddress, backend: Arc<B>, sensor: S, clock: C, config: AgentConfig) -> Self {
        Self {
            mac,
            backend,
            sensor,
            clock,
            config,
            registered: false,
            force_reading: false,
            last_reading_ms: 0,
            last_check_ms: 0,
            pairing: None,
            indicator: Indicator::Off,
        }
    }

    pub fn mac(&self) -> &MacAddress {
        &self.mac
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn is_pairing(&self) -> bool {
        self.pairing.is_some()
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    /// Whether the next registered tick takes a reading regardless of the
    /// interval.
    pub fn reading_pending(&self) -> bool {
        self.force_reading
    }

    /// The pairing peripheral, while pairing.
    pub fn pairing_peripheral(&self) -> Option<&GattPeripheral> {
        self.pairing.as_ref().map(|p| &p.peripheral)
    }

    fn elapsed(&self, since_ms: u64) -> Duration {
        Duration::from_millis(self.clock.now_ms().saturating_sub(since_ms))
    }

    /// Startup: learn the registration state and, if registered, schedule an
    /// immediate reading.
    pub async fn setup(&mut self) -> bool {
        self.indicator = Indicator::Off;
        self.last_reading_ms = self.clock.now_ms();
        let registered = self.check_registration().await;
        if registered {
            self.force_reading = true;
            if let Err(e) = self.announce().await {
                warn!("Failed to announce connection: {}", e);
                self.indicator = Indicator::Red;
            }
        }
        info!(
            "Agent for {} started ({})",
            self.mac,
            if registered { "registered" } else { "unregistered" }
        );
        registered
    }

    /// Record on the device row that this device is online now.
    pub async fn announce(&self) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.backend.touch_device(&self.mac, now).await?;
        debug!("Announced {} at {}", self.mac, now);
        Ok(())
    }

    /// Ask the backend whether this device is registered.
    ///
    /// An HTTP error status leaves the state unchanged; a transport failure
    /// counts as unregistered.
    pub async fn check_registration(&mut self) -> bool {
        self.last_check_ms = self.clock.now_ms();
        match self.backend.find_device(&self.mac).await {
            Ok(device) => {
                self.registered = device.is_some();
                debug!("Registration check: {}", self.registered);
            }
            Err(e) if e.is_backend_status() => {
                warn!("Registration check failed, keeping state: {}", e);
            }
            Err(e) => {
                warn!("Registration check failed: {}", e);
                self.registered = false;
            }
        }
        self.registered
    }

    /// One pass of the main loop.
    pub async fn tick(&mut self) -> Result<Vec<AgentEvent>> {
        let mut events = Vec::new();

        if let Some(ref pairing) = self.pairing {
            if self.elapsed(pairing.started_ms) < self.config.pairing_timeout {
                self.indicator = Indicator::Blue;
                return Ok(events);
            }
            info!("Pairing timed out");
            self.end_pairing();
            events.push(AgentEvent::PairingExpired);
        }

        if !self.registered {
            self.indicator = Indicator::White;
            if self.elapsed(self.last_check_ms) > self.config.unregistered_check_interval {
                let registered = self.check_registration().await;
                events.push(AgentEvent::RegistrationChecked { registered });
                if registered {
                    self.indicator = Indicator::Off;
                }
            }
            return Ok(events);
        }

        self.indicator = Indicator::Off;
        if self.force_reading || self.elapsed(self.last_reading_ms) >= self.config.reading_interval {
            events.push(self.take_reading().await?);
        }

        if self.elapsed(self.last_check_ms) > self.config.registered_check_interval {
            let registered = self.check_registration().await;
            events.push(AgentEvent::RegistrationChecked { registered });
        }

        Ok(events)
    }

    /// Sample the sensor and upload the reading.
    ///
    /// Upload failures are reported as [`AgentEvent::ReadingFailed`]; a
    /// sensor failure is returned as an error.
    pub async fn take_reading(&mut self) -> Result<AgentEvent> {
        self.last_reading_ms = self.clock.now_ms();
        self.force_reading = false;

        let sample = self.sensor.sample().await?;
        let reading = NewReading::from_sample(&self.mac, &sample);
        match self.backend.insert_reading(&reading).await {
            Ok(()) => {
                info!(
                    "Uploaded reading: {:.1} °C, {:.1} %, {:.1} hPa",
                    reading.temperature, reading.humidity, reading.pressure
                );
                Ok(AgentEvent::ReadingUploaded(reading))
            }
            Err(e) => {
                warn!("Failed to upload reading: {}", e);
                Ok(AgentEvent::ReadingFailed(e.to_string()))
            }
        }
    }

    /// Register this device with the backend.
    pub async fn register(&mut self) -> Result<()> {
        let device = NewDevice::new(&self.mac, OffsetDateTime::now_utc());
        self.backend.register_device(&device).await?;

        info!("Registered {} as {}", self.mac, device.name);
        self.registered = true;
        self.force_reading = true;
        self.last_check_ms = self.clock.now_ms();
        Ok(())
    }

    /// Enter pairing mode.
    ///
    /// Returns `None` when already pairing or already registered, otherwise
    /// the actions that bring up the pairing peripheral.
    pub fn start_pairing(&mut self) -> Result<Option<Vec<Action>>> {
        if self.pairing.is_some() || self.registered {
            debug!("Pairing refused: already pairing or registered");
            return Ok(None);
        }

        let mut peripheral = GattPeripheral::new(Profile::Pairing, self.mac);
        let actions = peripheral.start()?;
        self.pairing = Some(Pairing {
            started_ms: self.clock.now_ms(),
            peripheral,
        });
        self.indicator = Indicator::Blue;
        info!("Entered pairing mode");
        Ok(Some(actions))
    }

    fn end_pairing(&mut self) -> Vec<Action> {
        match self.pairing.take() {
            Some(mut pairing) if pairing.peripheral.is_active() => pairing.peripheral.shutdown(),
            _ => Vec::new(),
        }
    }

    /// Feed a BLE event to the pairing peripheral.
    ///
    /// A `REGISTER` write registers the device; on success pairing ends and
    /// the next tick takes a reading.
    pub async fn handle_ble_event(&mut self, event: PeripheralEvent) -> Result<Vec<Action>> {
        let Some(ref mut pairing) = self.pairing else {
            debug!("Ignoring BLE event outside pairing: {:?}", event);
            return Ok(Vec::new());
        };

        match pairing.peripheral.handle(event)? {
            WriteOutcome::Done(actions) => Ok(actions),
            // Pairing mode never serves readings.
            WriteOutcome::ReadingsRequested => Ok(Vec::new()),
            WriteOutcome::RegistrationRequested { conn } => {
                debug!("Registration requested by central {}", conn);
                let registered = match self.register().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Registration failed: {}", e);
                        false
                    }
                };

                let mut actions = match self.pairing.as_mut() {
                    Some(pairing) => pairing.peripheral.registration_result(registered),
                    None => Vec::new(),
                };
                if registered {
                    actions.extend(self.end_pairing());
                    self.indicator = Indicator::Off;
                }
                Ok(actions)
            }
        }
    }

    /// Run the loop until cancelled.
    ///
    /// Loop errors turn the indicator red and the loop carries on.
    pub async fn run(&mut self, cancel: CancellationToken) {
        self.setup().await;
        let mut interval = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Agent stopped");
                    self.end_pairing();
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Agent loop error: {}", e);
                        self.indicator = Indicator::Red;
                    }
                }
            }
        }
    }
}
