//! Line output for delivered readings.
//!
//! Each reading becomes one headerless CSV record,
//! `<timestamp>,<pm2.5>,<pm10>`, with an RFC 3339 UTC timestamp at second
//! precision. Records are flushed as they are written so a downstream pipe
//! sees them immediately.
//!
//! Timestamps are always rendered in UTC with a `Z` suffix, whatever the host
//! timezone. Convert downstream if local time is wanted.

use chrono::{DateTime, SecondsFormat, Utc};
use csv::WriterBuilder;
use std::io::Write;

use crate::error::{AppResult, DaqError};
use crate::measurement_types::Point;

/// Destination for delivered readings
pub trait PointSink: Send {
    /// Write one reading
    ///
    /// # Errors
    /// `DaqError::Output` when the destination can no longer be written.
    fn emit(&mut self, point: &Point) -> AppResult<()>;
}

/// Writes readings as CSV records
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    /// Wrap a writer (typically stdout)
    pub fn new(inner: W) -> Self {
        Self {
            writer: WriterBuilder::new().has_headers(false).from_writer(inner),
        }
    }

    /// Underlying writer
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> AppResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| DaqError::Io(e.into_error()))
    }
}

impl<W: Write + Send> PointSink for CsvSink<W> {
    fn emit(&mut self, point: &Point) -> AppResult<()> {
        self.writer.write_record(&[
            format_timestamp(&point.timestamp),
            point.pm25.to_string(),
            point.pm10.to_string(),
        ])?;
        self.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

/// RFC 3339, whole seconds, `Z` suffix
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
