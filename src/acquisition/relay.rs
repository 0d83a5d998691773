//! Single-slot point relay between the producer task and the consumer.
//!
//! The relay is an `mpsc` channel of capacity one driven with `try_send`. An
//! offer that finds the slot occupied is discarded on the spot: the producer
//! never waits for a slow consumer, and the consumer never works through a
//! backlog of stale readings.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::measurement_types::Point;

/// Readings the relay holds at once
pub const RELAY_CAPACITY: usize = 1;

/// Outcome of a non-blocking hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The slot was free and now holds the point
    Delivered,
    /// The slot was occupied; the point was discarded
    Dropped,
    /// The consumer is gone
    Closed,
}

/// Create a connected relay pair
pub fn point_relay() -> (RelaySender, RelayReceiver) {
    let (tx, rx) = mpsc::channel(RELAY_CAPACITY);
    (
        RelaySender {
            tx,
            delivered: 0,
            dropped: 0,
        },
        RelayReceiver { rx },
    )
}

/// Producer side. Dropping it closes the relay.
#[derive(Debug)]
pub struct RelaySender {
    tx: mpsc::Sender<Point>,
    delivered: u64,
    dropped: u64,
}

impl RelaySender {
    /// Hand a point to the consumer without waiting
    pub fn offer(&mut self, point: Point) -> Offer {
        match self.tx.try_send(point) {
            Ok(()) => {
                self.delivered += 1;
                Offer::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(dropped = self.dropped, "relay slot occupied, reading dropped");
                Offer::Dropped
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Points accepted into the slot so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Points discarded because the slot was occupied
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Consumer side
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::Receiver<Point>,
}

impl RelayReceiver {
    /// Wait for the next point
    ///
    /// Resolves to `None` once `cancel` fires or the sender has been dropped, so
    /// the consumer never hangs on a relay nobody will fill.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<Point> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            point = self.rx.recv() => point,
        }
    }
}
