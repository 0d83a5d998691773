//! # SDS011 Acquisition Library
//!
//! Reads particulate-matter concentrations (PM2.5 and PM10) from a Nova Fitness
//! SDS011 sensor on a serial port and emits them as timestamped records until
//! the process is asked to stop. The `sds011` binary is a thin CLI over this
//! library.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: Connection establishment with a retry budget, the
//!   stream and timer producers, the single-slot relay, the output sink and
//!   the signal-driven shutdown controller.
//! - **`config`**: Layered configuration (defaults, TOML file, environment,
//!   CLI) using `figment`.
//! - **`control`**: One-shot `mode`, `cycle` and `info` subcommands.
//! - **`error`**: The `DaqError` enum shared by every module.
//! - **`hardware`**: Capability traits, the SDS011 serial driver and a
//!   scripted mock.
//! - **`measurement_types`**: `Point` and `ReportMode`.
//! - **`tracing_setup`**: `tracing-subscriber` initialization (logs go to stderr).

pub mod acquisition;
pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod measurement_types;
pub mod tracing_setup;
