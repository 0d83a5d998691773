//! Configuration loading from files and CLI overrides.

use sds011_daq::config::{ConfigOverrides, Sds011Config};
use sds011_daq::error::DaqError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn file_values_override_defaults() {
    let file = write_config(
        r#"
        [sensor]
        port_path = "/dev/ttyAMA0"
        read_timeout_ms = 1500

        [acquisition]
        interval_secs = 60
        "#,
    );

    let config = Sds011Config::load(Some(file.path()), &ConfigOverrides::default()).unwrap();

    assert_eq!(config.sensor.port_path, "/dev/ttyAMA0");
    assert_eq!(config.sensor.read_timeout_ms, 1500);
    assert_eq!(config.sensor.baud_rate, 9600);
    assert_eq!(config.acquisition.interval_secs, 60);
    assert_eq!(config.application.log_level, "info");
}

#[test]
fn cli_overrides_beat_file() {
    let file = write_config(
        r#"
        [sensor]
        port_path = "/dev/ttyAMA0"

        [acquisition]
        interval_secs = 60
        "#,
    );
    let overrides = ConfigOverrides {
        port_path: Some("/dev/ttyUSB3".into()),
        interval_secs: Some(5),
        log_level: None,
    };

    let config = Sds011Config::load(Some(file.path()), &overrides).unwrap();

    assert_eq!(config.sensor.port_path, "/dev/ttyUSB3");
    assert_eq!(config.acquisition.interval_secs, 5);
}

#[test]
fn zero_interval_in_file_is_rejected() {
    let file = write_config("[acquisition]\ninterval_secs = 0\n");

    let result = Sds011Config::load(Some(file.path()), &ConfigOverrides::default());

    assert!(matches!(result, Err(DaqError::Configuration(_))));
}

#[test]
fn interval_above_255_does_not_parse() {
    let file = write_config("[acquisition]\ninterval_secs = 300\n");

    let result = Sds011Config::load(Some(file.path()), &ConfigOverrides::default());

    assert!(matches!(result, Err(DaqError::Config(_))));
}

#[test]
fn unknown_log_level_is_rejected() {
    let file = write_config("[application]\nlog_level = \"chatty\"\n");

    assert!(Sds011Config::load(Some(file.path()), &ConfigOverrides::default()).is_err());
}
