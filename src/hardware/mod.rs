//! Sensor Hardware
//!
//! Capability traits consumed by the acquisition core, the SDS011 serial driver,
//! and a scripted mock for tests.

pub mod capabilities;
pub mod mock;
pub mod sds011;

pub use capabilities::{ParticulateSensor, SensorConnector, SensorSettings};
pub use sds011::{Sds011Connector, Sds011Driver};
