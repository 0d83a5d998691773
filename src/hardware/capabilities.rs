//! Sensor Capabilities
//!
//! The acquisition core never talks to a concrete driver. It consumes the small
//! capability traits defined here:
//!
//! - [`SensorConnector`] opens a handle for a device path
//! - [`ParticulateSensor`] is what the acquisition loops need from that handle
//! - [`SensorSettings`] covers the one-shot configuration subcommands
//!
//! The SDS011 driver implements all three over a serial port; the mock in
//! [`crate::hardware::mock`] implements them over a script for tests.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses the typed [`DaqError`](crate::error::DaqError), because callers branch on
//!   the error class (a malformed read is retryable, anything else is not)
//!
//! # Example
//!
//! ```rust,ignore
//! async fn first_reading<C: SensorConnector>(connector: &C) -> AppResult<Point> {
//!     let sensor = connector.open("/dev/ttyUSB0").await?;
//!     let point = match sensor.report_mode().await? {
//!         ReportMode::Active => sensor.stream_next().await,
//!         ReportMode::Passive => sensor.query_once().await,
//!     };
//!     sensor.close().await?;
//!     point
//! }
//! ```

use async_trait::async_trait;

use crate::error::AppResult;
use crate::measurement_types::{Point, ReportMode};

/// Capability: Opening a sensor handle
///
/// # Contract
/// - Every successful `open` yields an independent handle that the caller owns
///   and must release with [`ParticulateSensor::close`]
/// - `open` performs no protocol traffic; the first exchange is up to the caller
#[async_trait]
pub trait SensorConnector: Send + Sync {
    /// Handle type produced by this connector
    type Sensor: ParticulateSensor + 'static;

    /// Open the device at `path`
    ///
    /// # Errors
    /// Any error is fatal for connection establishment.
    async fn open(&self, path: &str) -> AppResult<Self::Sensor>;
}

/// Capability: Particulate-matter acquisition
///
/// # Contract
/// - `stream_next` blocks until the next self-reported reading arrives (active mode)
/// - `query_once` issues one explicit query and waits for its answer (passive mode)
/// - Reads are bounded by the driver's own timeout
/// - `close` is idempotent; operations after `close` fail with `DaqError::Closed`
///
/// # Thread Safety
/// - All methods take `&self`; drivers serialize access to the port internally
#[async_trait]
pub trait ParticulateSensor: Send + Sync {
    /// Read the current data reporting mode
    ///
    /// # Errors
    /// `DaqError::MalformedRead` when the reply frame was garbled, which the
    /// establisher treats as retryable; any other error is fatal.
    async fn report_mode(&self) -> AppResult<ReportMode>;

    /// Wait for the next self-reported reading
    async fn stream_next(&self) -> AppResult<Point>;

    /// Query one reading explicitly
    async fn query_once(&self) -> AppResult<Point>;

    /// Release the underlying channel
    async fn close(&self) -> AppResult<()>;
}

/// Capability: Persistent sensor settings
///
/// Direct request/response calls used by the `mode`, `cycle` and `info`
/// subcommands. None of them are used by the acquisition loops.
#[async_trait]
pub trait SensorSettings: Send + Sync {
    /// Switch the data reporting mode
    async fn set_report_mode(&self, mode: ReportMode) -> AppResult<()>;

    /// Working period in minutes (0 means continuous, roughly one reading per second)
    async fn working_period(&self) -> AppResult<u8>;

    /// Set the working period in minutes
    ///
    /// # Errors
    /// `DaqError::InvalidArgument` when `minutes` is above 30
    async fn set_working_period(&self, minutes: u8) -> AppResult<()>;

    /// Device identifier as four upper-case hex digits
    async fn device_id(&self) -> AppResult<String>;

    /// Firmware build date formatted `YY-MM-DD`
    async fn firmware(&self) -> AppResult<String>;

    /// Whether the sensor is working (fan and laser on) rather than sleeping
    async fn is_awake(&self) -> AppResult<bool>;
}
