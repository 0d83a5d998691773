//! Measurement data types shared between the driver and the acquisition core.
//!
//! A [`Point`] is produced by the sensor driver on every successful stream event
//! or explicit query, handed through the relay, and rendered once by the output
//! sink. [`ReportMode`] captures how the sensor delivers those points.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::DaqError;

/// One timestamped particulate-matter measurement.
///
/// Concentrations are in µg/m³. The SDS011 reports tenths, which the driver
/// converts before constructing the point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Capture time (UTC)
    pub timestamp: DateTime<Utc>,
    /// PM2.5 concentration
    pub pm25: f32,
    /// PM10 concentration
    pub pm10: f32,
}

impl Point {
    /// Create a point stamped with the current time.
    pub fn now(pm25: f32, pm10: f32) -> Self {
        Self {
            timestamp: Utc::now(),
            pm25,
            pm10,
        }
    }

    /// Build a point from the raw tenths the sensor puts on the wire.
    pub fn from_tenths(pm25_tenths: u16, pm10_tenths: u16) -> Self {
        Self::now(f32::from(pm25_tenths) / 10.0, f32::from(pm10_tenths) / 10.0)
    }
}

/// Sensor data reporting mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportMode {
    /// Sensor measures and reports continuously
    Active,
    /// Sensor sleeps until explicitly queried
    Passive,
}

impl ReportMode {
    /// True when the sensor self-reports.
    pub fn is_active(self) -> bool {
        matches!(self, ReportMode::Active)
    }

    /// Label used on the command line and in `info` output.
    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Active => "active",
            ReportMode::Passive => "passive",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = s.trim().to_lowercase();
        match mode.as_str() {
            "active" => Ok(ReportMode::Active),
            "passive" => Ok(ReportMode::Passive),
            _ => Err(DaqError::InvalidArgument(format!(
                "malformed mode value provided: {mode:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_from_tenths() {
        let point = Point::from_tenths(1236, 2618);
        assert_eq!(point.pm25, 123.6);
        assert_eq!(point.pm10, 261.8);
    }

    #[test]
    fn test_report_mode_parse() {
        assert_eq!("active".parse::<ReportMode>().unwrap(), ReportMode::Active);
        assert_eq!(" Passive\n".parse::<ReportMode>().unwrap(), ReportMode::Passive);

        let err = "sleepy".parse::<ReportMode>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: malformed mode value provided: \"sleepy\""
        );
    }

    #[test]
    fn test_report_mode_display() {
        assert_eq!(ReportMode::Active.to_string(), "active");
        assert_eq!(ReportMode::Passive.to_string(), "passive");
        assert!(ReportMode::Active.is_active());
        assert!(!ReportMode::Passive.is_active());
    }

    #[test]
    fn test_report_mode_text_is_its_only_encoding() {
        for mode in [ReportMode::Active, ReportMode::Passive] {
            assert_eq!(mode.to_string().parse::<ReportMode>().unwrap(), mode);
        }
    }
}
