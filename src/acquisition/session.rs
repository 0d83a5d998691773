//! Acquisition session: one established sensor, one producer, one consumer.
//!
//! The producer runs on its own task and feeds the single-slot relay; the
//! consumer is [`AcquisitionSession::run`] itself, writing every delivered
//! reading to a [`PointSink`]. Teardown happens in one place: stop the
//! producer, join it, then close the sensor exactly once.
//!
//! [`run_until_shutdown`] is the whole streaming command: establish, run, and
//! map the outcome to what the process should report. A shutdown that lands
//! before the sensor is ready is a clean exit, every other establishment
//! failure is an error.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::establish::establish;
use super::output::PointSink;
use super::relay::point_relay;
use super::shutdown::ShutdownController;
use super::strategy::{AcquisitionStrategy, ProducerStats};
use crate::config::Sds011Config;
use crate::error::{AppResult, DaqError};
use crate::hardware::{ParticulateSensor, SensorConnector};
use crate::measurement_types::ReportMode;

/// Totals for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Records written to the sink
    pub emitted: u64,
    /// Producer counters
    pub producer: ProducerStats,
}

/// A running acquisition against one sensor handle
pub struct AcquisitionSession<S: ParticulateSensor + 'static> {
    sensor: Arc<S>,
    mode: ReportMode,
    strategy: AcquisitionStrategy,
    cancel: CancellationToken,
}

impl<S: ParticulateSensor + 'static> AcquisitionSession<S> {
    /// Establish the sensor named in `config` and prepare a session for it
    ///
    /// `shutdown` is observed during establishment and for the whole session.
    pub async fn establish<C>(
        connector: &C,
        config: &Sds011Config,
        shutdown: CancellationToken,
    ) -> AppResult<Self>
    where
        C: SensorConnector<Sensor = S> + ?Sized,
    {
        let established = establish(connector, &config.sensor.port_path, &shutdown).await?;
        Ok(Self::new(
            established.sensor,
            established.mode,
            config.acquisition.interval_secs,
            shutdown,
        ))
    }

    /// Session over an already established sensor
    pub fn new(
        sensor: S,
        mode: ReportMode,
        interval_secs: u8,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sensor: Arc::new(sensor),
            mode,
            strategy: AcquisitionStrategy::for_mode(mode, interval_secs),
            cancel: shutdown.child_token(),
        }
    }

    /// Reporting mode detected at establishment
    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    /// Producer strategy chosen for that mode
    pub fn strategy(&self) -> AcquisitionStrategy {
        self.strategy
    }

    /// Drain readings into `sink` until shutdown
    ///
    /// Returns once the shutdown token fires or the sink fails. In both cases
    /// the producer is stopped and joined and the sensor closed before return.
    ///
    /// # Errors
    /// The sink's error, after teardown.
    pub async fn run<K>(self, sink: &mut K) -> AppResult<SessionSummary>
    where
        K: PointSink + ?Sized,
    {
        let (tx, mut rx) = point_relay();
        info!(mode = %self.mode, strategy = ?self.strategy, "acquisition started");

        let producer = tokio::spawn(self.strategy.run(
            Arc::clone(&self.sensor),
            tx,
            self.cancel.clone(),
        ));

        let mut emitted = 0;
        let mut outcome = Ok(());
        while let Some(point) = rx.next(&self.cancel).await {
            if let Err(err) = sink.emit(&point) {
                error!(error = %err, "failed to write reading");
                outcome = Err(err);
                break;
            }
            emitted += 1;
        }

        self.cancel.cancel();
        drop(rx);

        let producer_stats = match producer.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "producer task ended abnormally");
                ProducerStats::default()
            }
        };

        if let Err(err) = self.sensor.close().await {
            warn!(error = %err, "failed to close sensor");
        }
        info!(emitted, "acquisition stopped");

        outcome.map(|()| SessionSummary {
            emitted,
            producer: producer_stats,
        })
    }
}

/// Establish the configured sensor and stream into `sink` until shutdown
///
/// Returns `Ok` with an empty summary when `shutdown` fires before the sensor
/// is ready.
///
/// # Errors
/// Establishment failures other than cancellation, and sink failures.
pub async fn run_until_shutdown<C, K>(
    connector: &C,
    config: &Sds011Config,
    shutdown: &ShutdownController,
    sink: &mut K,
) -> AppResult<SessionSummary>
where
    C: SensorConnector + ?Sized,
    K: PointSink + ?Sized,
{
    let session = match AcquisitionSession::establish(connector, config, shutdown.token()).await {
        Ok(session) => session,
        Err(DaqError::Cancelled) => {
            info!("shutdown requested before the sensor was ready");
            return Ok(SessionSummary::default());
        }
        Err(err) => return Err(err),
    };

    let summary = session.run(sink).await?;
    info!(
        emitted = summary.emitted,
        dropped = summary.producer.dropped,
        failed = summary.producer.failed,
        "shutdown complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockConnector;
    use crate::measurement_types::Point;
    use tracing_test::traced_test;

    struct FailingSink;

    impl PointSink for FailingSink {
        fn emit(&mut self, _point: &Point) -> AppResult<()> {
            Err(DaqError::Output(csv::Error::from(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            ))))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sink_failure_tears_down() {
        let connector = MockConnector::new()
            .with_mode_steps([Ok(ReportMode::Active)])
            .with_stream([Ok((1.0, 2.0))]);
        let ledger = connector.ledger();
        let shutdown = CancellationToken::new();

        let session = AcquisitionSession::establish(&connector, &Sds011Config::default(), shutdown.clone())
            .await
            .unwrap();
        assert_eq!(session.strategy(), AcquisitionStrategy::Stream);

        let result = session.run(&mut FailingSink).await;

        assert!(matches!(result, Err(DaqError::Output(_))));
        assert_eq!(ledger.close_calls(), 1);
        assert_eq!(ledger.live_handles(), 0);
        assert!(!shutdown.is_cancelled());
        assert!(logs_contain("failed to write reading"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_early_shutdown_is_clean_exit() {
        let connector = MockConnector::new().with_mode_steps([Ok(ReportMode::Active)]);
        let ledger = connector.ledger();
        let shutdown = ShutdownController::watch(async { "test" });
        shutdown.token().cancelled().await;

        let mut sink = crate::acquisition::CsvSink::new(Vec::new());
        let summary = run_until_shutdown(&connector, &Sds011Config::default(), &shutdown, &mut sink)
            .await
            .unwrap();

        assert_eq!(summary, SessionSummary::default());
        assert_eq!(ledger.live_handles(), 0);
        assert!(sink.into_inner().unwrap().is_empty());
        assert!(logs_contain("shutdown requested before the sensor was ready"));
    }
}
