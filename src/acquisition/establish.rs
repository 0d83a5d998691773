//! Connection establishment with a bounded retry budget.
//!
//! An attempt opens the device and reads its reporting mode. A garbled mode
//! reply is common right after the port opens (the sensor may be mid-frame), so
//! `DaqError::MalformedRead` consumes one unit of the budget and the attempt is
//! repeated on a fresh handle. Every other failure ends establishment at once.
//! Each failed handle is closed before the next attempt, so at most one handle is
//! ever open.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppResult, DaqError};
use crate::hardware::{ParticulateSensor, SensorConnector};
use crate::measurement_types::ReportMode;

/// Attempts made before giving up on malformed mode replies
pub const RETRY_BUDGET: u32 = 10;

/// An open sensor with its detected reporting mode
#[derive(Debug)]
pub struct Established<S> {
    /// The one handle left open
    pub sensor: S,
    /// Mode read during the successful attempt
    pub mode: ReportMode,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Open the sensor at `path` and detect its reporting mode
///
/// # Errors
/// - `DaqError::RetryBudgetExhausted` after [`RETRY_BUDGET`] malformed replies
/// - `DaqError::Cancelled` when `cancel` fires between attempts
/// - any non-retryable error from `open` or `report_mode`, unchanged
#[instrument(skip(connector, cancel))]
pub async fn establish<C>(
    connector: &C,
    path: &str,
    cancel: &CancellationToken,
) -> AppResult<Established<C::Sensor>>
where
    C: SensorConnector + ?Sized,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DaqError::Cancelled);
        }
        attempt += 1;

        let sensor = connector.open(path).await?;
        let detected = sensor.report_mode().await;

        if cancel.is_cancelled() {
            release(&sensor).await;
            return Err(DaqError::Cancelled);
        }

        match detected {
            Ok(mode) => {
                info!(%mode, attempts = attempt, "sensor connection established");
                return Ok(Established {
                    sensor,
                    mode,
                    attempts: attempt,
                });
            }
            Err(err) if err.is_retryable() => {
                release(&sensor).await;
                debug!(attempt, budget = RETRY_BUDGET, error = %err, "malformed mode reply");
                if attempt >= RETRY_BUDGET {
                    return Err(DaqError::RetryBudgetExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
            }
            Err(err) => {
                release(&sensor).await;
                return Err(err);
            }
        }
    }
}

async fn release<S>(sensor: &S)
where
    S: ParticulateSensor + ?Sized,
{
    if let Err(err) = sensor.close().await {
        warn!(error = %err, "failed to close sensor handle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockConnector, MockFault};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_retries_are_logged_at_debug() {
        let connector = MockConnector::new().with_mode_steps([
            Err(MockFault::MalformedRead),
            Err(MockFault::MalformedRead),
            Ok(ReportMode::Active),
        ]);
        let ledger = connector.ledger();

        let established = establish(&connector, "/dev/mock", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(established.mode, ReportMode::Active);
        assert_eq!(established.attempts, 3);
        assert_eq!(ledger.opened(), 3);
        assert_eq!(ledger.live_handles(), 1);
        assert!(logs_contain("malformed mode reply"));
        assert!(logs_contain("sensor connection established"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let connector = MockConnector::new();
        let ledger = connector.ledger();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = establish(&connector, "/dev/mock", &cancel).await;

        assert!(matches!(result, Err(DaqError::Cancelled)));
        assert_eq!(ledger.opened(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_fatal() {
        let connector = MockConnector::new().with_open_fault(MockFault::Fatal);

        let result = establish(&connector, "/dev/mock", &CancellationToken::new()).await;

        assert!(matches!(result, Err(DaqError::Io(_))));
    }
}
