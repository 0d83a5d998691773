//! Producer loops
//!
//! The reporting mode detected at establishment picks one of two producers:
//!
//! - **Stream** (active mode): the sensor reports on its own, the loop blocks on
//!   the next frame and forwards it.
//! - **Timer** (passive mode): the loop queries on a ticker. The ticker first
//!   fires after [`FIRST_QUERY_DELAY`] and is then replaced, once, by one running
//!   at the configured period.
//!
//! Both loops forward readings through the lossy [`RelaySender`], log read
//! failures at WARN and keep going, and stop when the token is cancelled or the
//! consumer goes away. Cancellation is observed at the loop top and after each
//! read; a read that is already in flight is allowed to finish.
//!
//! After a failed stream read the loop waits [`STREAM_RETRY_DELAY`] before
//! reading again. A port that fails instantly (an unplugged adapter) then costs
//! ten reads a second instead of a busy loop.

use std::sync::Arc;
use tokio::time::{interval_at, sleep, Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::relay::{Offer, RelaySender};
use crate::hardware::ParticulateSensor;
use crate::measurement_types::{Point, ReportMode};

/// Delay before the first passive-mode query
pub const FIRST_QUERY_DELAY: Duration = Duration::from_millis(10);

/// Pause after a failed active-mode read
pub const STREAM_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How readings are obtained from an established sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStrategy {
    /// Block on self-reported frames
    Stream,
    /// Query once per `period`
    Timer {
        /// Steady-state query period
        period: Duration,
    },
}

/// Counters reported by a finished producer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Readings accepted by the relay
    pub delivered: u64,
    /// Readings discarded because the relay slot was occupied
    pub dropped: u64,
    /// Reads or queries that failed
    pub failed: u64,
}

impl AcquisitionStrategy {
    /// Strategy for a detected reporting mode
    ///
    /// `interval_secs` only matters in passive mode; zero is treated as one.
    pub fn for_mode(mode: ReportMode, interval_secs: u8) -> Self {
        match mode {
            ReportMode::Active => AcquisitionStrategy::Stream,
            ReportMode::Passive => AcquisitionStrategy::Timer {
                period: Duration::from_secs(u64::from(interval_secs.max(1))),
            },
        }
    }

    /// Run the producer until cancellation or until the consumer is gone
    ///
    /// Consumes the relay sender; it is dropped on return, which closes the relay.
    pub async fn run<S>(
        self,
        sensor: Arc<S>,
        mut relay: RelaySender,
        cancel: CancellationToken,
    ) -> ProducerStats
    where
        S: ParticulateSensor + ?Sized,
    {
        let failed = match self {
            AcquisitionStrategy::Stream => stream_loop(sensor.as_ref(), &mut relay, &cancel).await,
            AcquisitionStrategy::Timer { period } => {
                timer_loop(sensor.as_ref(), &mut relay, &cancel, period).await
            }
        };

        let stats = ProducerStats {
            delivered: relay.delivered(),
            dropped: relay.dropped(),
            failed,
        };
        info!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            failed = stats.failed,
            "producer stopped"
        );
        stats
    }
}

/// Returns the number of failed reads
async fn stream_loop<S>(sensor: &S, relay: &mut RelaySender, cancel: &CancellationToken) -> u64
where
    S: ParticulateSensor + ?Sized,
{
    let mut failed = 0;

    while !cancel.is_cancelled() {
        let result = sensor.stream_next().await;
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(point) => {
                if !forward(relay, point) {
                    break;
                }
            }
            Err(err) => {
                failed += 1;
                warn!(error = %err, "sensor stream read failed");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep(STREAM_RETRY_DELAY) => {}
                }
            }
        }
    }

    failed
}

/// Returns the number of failed queries
async fn timer_loop<S>(
    sensor: &S,
    relay: &mut RelaySender,
    cancel: &CancellationToken,
    period: Duration,
) -> u64
where
    S: ParticulateSensor + ?Sized,
{
    let mut failed = 0;
    let mut ticker = delayed_ticker(FIRST_QUERY_DELAY);
    let mut rescheduled = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !rescheduled {
            ticker = delayed_ticker(period);
            rescheduled = true;
            debug!(period_secs = period.as_secs(), "query ticker rescheduled");
        }

        let result = sensor.query_once().await;
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(point) => {
                if !forward(relay, point) {
                    break;
                }
            }
            Err(err) => {
                failed += 1;
                warn!(error = %err, "sensor query failed");
            }
        }
    }

    failed
}

/// Offer a reading; `false` once nobody is listening
fn forward(relay: &mut RelaySender, point: Point) -> bool {
    match relay.offer(point) {
        Offer::Delivered | Offer::Dropped => true,
        Offer::Closed => {
            debug!("relay closed by consumer");
            false
        }
    }
}

// First tick one period from now
fn delayed_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
