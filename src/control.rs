//! One-shot sensor subcommands.
//!
//! Each command opens its own handle, performs a few request/response
//! exchanges and closes the handle again, whether or not the exchange worked.
//! Commands return the text to print; setters print nothing.

use std::fmt;
use tracing::{info, warn};

use crate::error::{AppResult, DaqError};
use crate::hardware::sds011::MAX_WORKING_PERIOD;
use crate::hardware::{ParticulateSensor, SensorConnector, SensorSettings};
use crate::measurement_types::ReportMode;

/// Everything the `info` subcommand reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device id, four hex digits
    pub device_id: String,
    /// Firmware date
    pub firmware: String,
    /// Working rather than sleeping
    pub awake: bool,
    /// Reporting mode
    pub mode: ReportMode,
    /// Working period in minutes
    pub cycle: u8,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sds011 sensor information:")?;
        writeln!(f, "device id: {}", self.device_id)?;
        writeln!(f, "firmware:  {}", self.firmware)?;
        writeln!(f, "is awake:  {}", self.awake)?;
        writeln!(f, "mode:      {}", self.mode)?;
        write!(f, "cycle:     {}", self.cycle)
    }
}

/// `mode [active|passive]`
///
/// Without a value, returns `sds011 mode:\n<mode>`. With one, switches the
/// sensor and returns `None`.
pub async fn mode_command<C>(
    connector: &C,
    path: &str,
    value: Option<&str>,
) -> AppResult<Option<String>>
where
    C: SensorConnector + ?Sized,
    C::Sensor: SensorSettings,
{
    // Reject bad input before touching the port
    let requested = value.map(str::parse::<ReportMode>).transpose()?;

    let sensor = connector.open(path).await?;
    let result: AppResult<Option<String>> = async {
        match requested {
            Some(mode) => {
                sensor.set_report_mode(mode).await?;
                info!(%mode, "report mode set");
                Ok(None)
            }
            None => {
                let mode = sensor.report_mode().await?;
                Ok(Some(format!("sds011 mode:\n{mode}")))
            }
        }
    }
    .await;

    close_after(&sensor, result).await
}

/// `cycle [0..30]`
///
/// Without a value, returns the working period in minutes. With one, sets it
/// and returns `None`.
pub async fn cycle_command<C>(
    connector: &C,
    path: &str,
    minutes: Option<u8>,
) -> AppResult<Option<String>>
where
    C: SensorConnector + ?Sized,
    C::Sensor: SensorSettings,
{
    if let Some(minutes) = minutes {
        if minutes > MAX_WORKING_PERIOD {
            return Err(DaqError::InvalidArgument(format!(
                "cycle must be 0-{MAX_WORKING_PERIOD} minutes, got {minutes}"
            )));
        }
    }

    let sensor = connector.open(path).await?;
    let result: AppResult<Option<String>> = async {
        match minutes {
            Some(minutes) => {
                sensor.set_working_period(minutes).await?;
                info!(minutes, "working period set");
                Ok(None)
            }
            None => Ok(Some(sensor.working_period().await?.to_string())),
        }
    }
    .await;

    close_after(&sensor, result).await
}

/// `info`
pub async fn info_command<C>(connector: &C, path: &str) -> AppResult<DeviceInfo>
where
    C: SensorConnector + ?Sized,
    C::Sensor: SensorSettings,
{
    let sensor = connector.open(path).await?;
    let result: AppResult<DeviceInfo> = async {
        Ok(DeviceInfo {
            device_id: sensor.device_id().await?,
            firmware: sensor.firmware().await?,
            awake: sensor.is_awake().await?,
            mode: sensor.report_mode().await?,
            cycle: sensor.working_period().await?,
        })
    }
    .await;

    close_after(&sensor, result).await
}

/// Close the handle, then hand back the command's own result
async fn close_after<S, T>(sensor: &S, result: AppResult<T>) -> AppResult<T>
where
    S: ParticulateSensor + ?Sized,
{
    if let Err(err) = sensor.close().await {
        warn!(error = %err, "failed to close sensor");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockConnector, MockSettings};

    #[test]
    fn test_info_block_layout() {
        let info = DeviceInfo {
            device_id: "A160".into(),
            firmware: "15-07-10".into(),
            awake: true,
            mode: ReportMode::Passive,
            cycle: 3,
        };
        assert_eq!(
            info.to_string(),
            "sds011 sensor information:\n\
             device id: A160\n\
             firmware:  15-07-10\n\
             is awake:  true\n\
             mode:      passive\n\
             cycle:     3"
        );
    }

    #[tokio::test]
    async fn test_bad_mode_never_opens_port() {
        let connector = MockConnector::new();
        let ledger = connector.ledger();

        let err = mode_command(&connector, "mock", Some("sleepy"))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Invalid argument: malformed mode value provided: \"sleepy\""
        );
        assert_eq!(ledger.opened(), 0);
    }

    #[tokio::test]
    async fn test_set_then_read_mode() {
        let connector = MockConnector::new().with_settings(MockSettings {
            mode: ReportMode::Active,
            ..MockSettings::default()
        });
        let ledger = connector.ledger();

        assert_eq!(
            mode_command(&connector, "mock", Some(" Passive ")).await.unwrap(),
            None
        );
        let info = info_command(&connector, "mock").await.unwrap();
        assert_eq!(info.mode, ReportMode::Passive);
        assert_eq!(ledger.live_handles(), 0);
    }
}
