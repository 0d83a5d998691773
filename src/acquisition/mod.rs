//! Acquisition Orchestration
//!
//! Turns an SDS011 on a serial port into a stream of output records:
//!
//! 1. [`establish`](establish::establish) opens the device and detects its
//!    reporting mode, retrying garbled replies within a fixed budget.
//! 2. The mode selects an [`AcquisitionStrategy`]: a stream reader for active
//!    mode, a query ticker for passive mode.
//! 3. The producer hands readings to the consumer through a single-slot
//!    [`relay`]. Readings that arrive while the slot is full are dropped.
//! 4. The consumer writes each reading to a [`PointSink`] until the
//!    [`ShutdownController`] cancels the session.

pub mod establish;
pub mod output;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod strategy;

pub use establish::{establish, Established, RETRY_BUDGET};
pub use output::{CsvSink, PointSink};
pub use relay::{point_relay, Offer, RelayReceiver, RelaySender};
pub use session::{run_until_shutdown, AcquisitionSession, SessionSummary};
pub use shutdown::ShutdownController;
pub use strategy::{AcquisitionStrategy, ProducerStats, FIRST_QUERY_DELAY, STREAM_RETRY_DELAY};
