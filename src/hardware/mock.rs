//! Mock Hardware Implementations
//!
//! Provides a scripted SDS011 stand-in for testing without a physical sensor.
//! All waits use `tokio::time::sleep`, so tests can run on a paused clock.
//!
//! # Available Mocks
//!
//! - `MockConnector` - Opens `MockSensor` handles, one scripted mode reply per open
//! - `MockSensor` - Plays back scripted stream/query results and settings
//! - `MockLedger` - Shared record of opens, closes and query instants
//!
//! # Behaviour Characteristics
//!
//! - Each `open` consumes the next report-mode step; once the script is empty
//!   the handle reports the mode held in `MockSettings` (passive by default)
//! - Stream reads are paced by `stream_interval` (default 20ms)
//! - An exhausted stream/query script waits `idle_timeout` (default 50ms) and
//!   fails with `DaqError::Timeout`, like a sensor that stopped talking

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{ParticulateSensor, SensorConnector, SensorSettings};
use crate::hardware::sds011::MAX_WORKING_PERIOD;
use crate::measurement_types::{Point, ReportMode};

/// Failure a scripted call should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Garbled frame (retryable during establishment)
    MalformedRead,
    /// Sensor did not answer in time
    Timeout,
    /// Transport failure (fatal during establishment)
    Fatal,
}

impl MockFault {
    fn to_error(self) -> DaqError {
        match self {
            MockFault::MalformedRead => DaqError::MalformedRead("mock checksum mismatch".into()),
            MockFault::Timeout => DaqError::Timeout(Duration::from_millis(50)),
            MockFault::Fatal => DaqError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock port unplugged",
            )),
        }
    }
}

/// One scripted call result
pub type MockStep<T> = Result<T, MockFault>;

/// Shared record of what the code under test did to the mock hardware
#[derive(Debug, Default)]
pub struct MockLedger {
    opened: AtomicUsize,
    released: AtomicUsize,
    close_calls: AtomicUsize,
    stream_reads: AtomicUsize,
    queries: Mutex<Vec<Instant>>,
}

impl MockLedger {
    /// Handles successfully opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Handles actually released (first `close` on each handle)
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Every call to `close`, including repeated ones
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet released
    pub fn live_handles(&self) -> usize {
        self.opened() - self.released()
    }

    /// Number of `stream_next` calls
    pub fn stream_reads(&self) -> usize {
        self.stream_reads.load(Ordering::SeqCst)
    }

    /// Clock instants at which `query_once` was entered
    pub async fn query_instants(&self) -> Vec<Instant> {
        self.queries.lock().await.clone()
    }
}

/// Persistent settings the mock reports for the one-shot subcommands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSettings {
    /// Current reporting mode
    pub mode: ReportMode,
    /// Working period in minutes
    pub working_period: u8,
    /// Device id as printed by `info`
    pub device_id: String,
    /// Firmware date
    pub firmware: String,
    /// Working (true) or sleeping
    pub awake: bool,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            mode: ReportMode::Passive,
            working_period: 0,
            device_id: "A160".to_string(),
            firmware: "15-07-10".to_string(),
            awake: true,
        }
    }
}

/// Playback shared by every handle a connector opens
#[derive(Debug)]
struct MockScript {
    stream: Mutex<VecDeque<MockStep<(f32, f32)>>>,
    queries: Mutex<VecDeque<MockStep<(f32, f32)>>>,
    settings: Mutex<MockSettings>,
    stream_interval: Duration,
    idle_timeout: Duration,
}

/// Opens scripted [`MockSensor`] handles
///
/// # Example
///
/// ```rust,ignore
/// let connector = MockConnector::new()
///     .with_mode_steps([Err(MockFault::MalformedRead), Ok(ReportMode::Active)])
///     .with_stream([Ok((12.3, 20.1)), Err(MockFault::Timeout)]);
/// let ledger = connector.ledger();
/// ```
pub struct MockConnector {
    mode_steps: Mutex<VecDeque<MockStep<ReportMode>>>,
    open_fault: Option<MockFault>,
    stream: VecDeque<MockStep<(f32, f32)>>,
    queries: VecDeque<MockStep<(f32, f32)>>,
    settings: MockSettings,
    stream_interval: Duration,
    idle_timeout: Duration,
    script: std::sync::OnceLock<Arc<MockScript>>,
    ledger: Arc<MockLedger>,
}

impl MockConnector {
    /// Connector whose sensors report passive mode and have nothing to read
    pub fn new() -> Self {
        Self {
            mode_steps: Mutex::new(VecDeque::new()),
            open_fault: None,
            stream: VecDeque::new(),
            queries: VecDeque::new(),
            settings: MockSettings::default(),
            stream_interval: Duration::from_millis(20),
            idle_timeout: Duration::from_millis(50),
            script: std::sync::OnceLock::new(),
            ledger: Arc::new(MockLedger::default()),
        }
    }

    /// Report-mode replies, one consumed per `open`
    pub fn with_mode_steps(mut self, steps: impl IntoIterator<Item = MockStep<ReportMode>>) -> Self {
        self.mode_steps = Mutex::new(steps.into_iter().collect());
        self
    }

    /// Make every `open` fail
    pub fn with_open_fault(mut self, fault: MockFault) -> Self {
        self.open_fault = Some(fault);
        self
    }

    /// Readings returned by successive `stream_next` calls
    pub fn with_stream(mut self, steps: impl IntoIterator<Item = MockStep<(f32, f32)>>) -> Self {
        self.stream = steps.into_iter().collect();
        self
    }

    /// Readings returned by successive `query_once` calls
    pub fn with_queries(mut self, steps: impl IntoIterator<Item = MockStep<(f32, f32)>>) -> Self {
        self.queries = steps.into_iter().collect();
        self
    }

    /// Persistent settings visible through [`SensorSettings`]
    pub fn with_settings(mut self, settings: MockSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Delay before each `stream_next` result
    pub fn with_stream_interval(mut self, interval: Duration) -> Self {
        self.stream_interval = interval;
        self
    }

    /// Shared ledger for assertions
    pub fn ledger(&self) -> Arc<MockLedger> {
        Arc::clone(&self.ledger)
    }

    fn script(&self) -> Arc<MockScript> {
        let script = self.script.get_or_init(|| {
            Arc::new(MockScript {
                stream: Mutex::new(self.stream.clone()),
                queries: Mutex::new(self.queries.clone()),
                settings: Mutex::new(self.settings.clone()),
                stream_interval: self.stream_interval,
                idle_timeout: self.idle_timeout,
            })
        });
        Arc::clone(script)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorConnector for MockConnector {
    type Sensor = MockSensor;

    async fn open(&self, _path: &str) -> AppResult<MockSensor> {
        if let Some(fault) = self.open_fault {
            return Err(fault.to_error());
        }

        let mode = self.mode_steps.lock().await.pop_front();
        self.ledger.opened.fetch_add(1, Ordering::SeqCst);

        Ok(MockSensor {
            mode,
            script: self.script(),
            ledger: Arc::clone(&self.ledger),
            closed: AtomicBool::new(false),
        })
    }
}

/// Scripted sensor handle
#[derive(Debug)]
pub struct MockSensor {
    mode: Option<MockStep<ReportMode>>,
    script: Arc<MockScript>,
    ledger: Arc<MockLedger>,
    closed: AtomicBool,
}

impl MockSensor {
    fn ensure_open(&self) -> AppResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DaqError::Closed)
        } else {
            Ok(())
        }
    }

    async fn play(&self, step: Option<MockStep<(f32, f32)>>) -> AppResult<Point> {
        match step {
            Some(Ok((pm25, pm10))) => Ok(Point::now(pm25, pm10)),
            Some(Err(fault)) => Err(fault.to_error()),
            None => {
                sleep(self.script.idle_timeout).await;
                Err(DaqError::Timeout(self.script.idle_timeout))
            }
        }
    }
}

#[async_trait]
impl ParticulateSensor for MockSensor {
    async fn report_mode(&self) -> AppResult<ReportMode> {
        self.ensure_open()?;
        match self.mode {
            Some(step) => step.map_err(MockFault::to_error),
            None => Ok(self.script.settings.lock().await.mode),
        }
    }

    async fn stream_next(&self) -> AppResult<Point> {
        self.ensure_open()?;
        self.ledger.stream_reads.fetch_add(1, Ordering::SeqCst);
        sleep(self.script.stream_interval).await;
        let step = self.script.stream.lock().await.pop_front();
        self.play(step).await
    }

    async fn query_once(&self) -> AppResult<Point> {
        self.ensure_open()?;
        self.ledger.queries.lock().await.push(Instant::now());
        let step = self.script.queries.lock().await.pop_front();
        self.play(step).await
    }

    async fn close(&self) -> AppResult<()> {
        self.ledger.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.ledger.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl SensorSettings for MockSensor {
    async fn set_report_mode(&self, mode: ReportMode) -> AppResult<()> {
        self.ensure_open()?;
        self.script.settings.lock().await.mode = mode;
        Ok(())
    }

    async fn working_period(&self) -> AppResult<u8> {
        self.ensure_open()?;
        Ok(self.script.settings.lock().await.working_period)
    }

    async fn set_working_period(&self, minutes: u8) -> AppResult<()> {
        self.ensure_open()?;
        if minutes > MAX_WORKING_PERIOD {
            return Err(DaqError::InvalidArgument(format!(
                "working period must be 0-{MAX_WORKING_PERIOD} minutes, got {minutes}"
            )));
        }
        self.script.settings.lock().await.working_period = minutes;
        Ok(())
    }

    async fn device_id(&self) -> AppResult<String> {
        self.ensure_open()?;
        Ok(self.script.settings.lock().await.device_id.clone())
    }

    async fn firmware(&self) -> AppResult<String> {
        self.ensure_open()?;
        Ok(self.script.settings.lock().await.firmware.clone())
    }

    async fn is_awake(&self) -> AppResult<bool> {
        self.ensure_open()?;
        Ok(self.script.settings.lock().await.awake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_plays_mode_steps_per_open() {
        let connector = MockConnector::new()
            .with_mode_steps([Err(MockFault::MalformedRead), Ok(ReportMode::Active)]);

        let first = connector.open("mock").await.unwrap();
        assert!(first.report_mode().await.unwrap_err().is_retryable());

        let second = connector.open("mock").await.unwrap();
        assert_eq!(second.report_mode().await.unwrap(), ReportMode::Active);

        let third = connector.open("mock").await.unwrap();
        assert_eq!(third.report_mode().await.unwrap(), ReportMode::Passive);

        assert_eq!(connector.ledger().opened(), 3);
    }

    #[tokio::test]
    async fn test_mock_close_is_idempotent() {
        let connector = MockConnector::new();
        let ledger = connector.ledger();
        let sensor = connector.open("mock").await.unwrap();

        sensor.close().await.unwrap();
        sensor.close().await.unwrap();

        assert_eq!(ledger.close_calls(), 2);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.live_handles(), 0);
        assert!(matches!(sensor.query_once().await, Err(DaqError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_exhausted_script_times_out() {
        let connector = MockConnector::new().with_queries([Ok((1.0, 2.0))]);
        let sensor = connector.open("mock").await.unwrap();

        let point = sensor.query_once().await.unwrap();
        assert_eq!((point.pm25, point.pm10), (1.0, 2.0));
        assert!(matches!(
            sensor.query_once().await,
            Err(DaqError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_working_period_range() {
        let connector = MockConnector::new();
        let sensor = connector.open("mock").await.unwrap();

        sensor.set_working_period(30).await.unwrap();
        assert_eq!(sensor.working_period().await.unwrap(), 30);
        assert!(sensor.set_working_period(31).await.is_err());
    }
}
