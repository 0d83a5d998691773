//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, shared by the sensor
//! driver, the acquisition core and the configuration layer. Using the `thiserror`
//! crate, it provides one consistent way to report everything from serial I/O
//! failures to exhausted connection retries.
//!
//! ## Error Classes
//!
//! - **`MalformedRead`**: a frame that failed header, tail or checksum validation.
//!   This is the only class the connection establisher retries.
//! - **`Timeout`**, **`Io`**, **`Serial`**, **`Closed`**: transport failures.
//!   During acquisition these are logged and skipped; during establishment
//!   they are fatal.
//! - **`RetryBudgetExhausted`**: terminal establishment failure carrying the last
//!   malformed read.
//! - **`Cancelled`**: a shutdown signal arrived before the session was running.
//! - **`Config`** / **`Configuration`**: parse and validation errors from the
//!   layered configuration.
//! - **`Output`**: the record sink could not be written.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum DaqError {
    #[error("Malformed read: {0}")]
    MalformedRead(String),

    #[error("Sensor read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sensor handle is closed")]
    Closed,

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sensor connection failed after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        attempts: u32,
        #[source]
        last: Box<DaqError>,
    },

    #[error("Acquisition cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Output error: {0}")]
    Output(#[from] csv::Error),
}

impl DaqError {
    /// Whether the connection establisher may retry after this error.
    ///
    /// Only malformed reads qualify; everything else aborts establishment.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DaqError::MalformedRead(_))
    }
}
