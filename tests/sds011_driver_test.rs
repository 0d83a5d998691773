//! SDS011 driver against scripted serial traffic.

use sds011_daq::error::DaqError;
use sds011_daq::hardware::sds011::{encode_command, Sds011Driver};
use sds011_daq::hardware::{ParticulateSensor, SensorSettings};
use sds011_daq::measurement_types::ReportMode;
use std::time::Duration;
use tokio_test::io::Builder;

const TIMEOUT: Duration = Duration::from_secs(1);
const DEVICE_ID: [u8; 2] = [0xA1, 0x60];

fn reply(command: u8, b3: u8, b4: u8, b5: u8) -> [u8; 10] {
    let mut frame = [
        0xAA, 0xC5, command, b3, b4, b5, DEVICE_ID[0], DEVICE_ID[1], 0x00, 0xAB,
    ];
    frame[8] = frame[2..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    frame
}

fn data(pm25_tenths: u16, pm10_tenths: u16) -> [u8; 10] {
    let pm25 = pm25_tenths.to_le_bytes();
    let pm10 = pm10_tenths.to_le_bytes();
    let mut frame = [
        0xAA, 0xC0, pm25[0], pm25[1], pm10[0], pm10[1], DEVICE_ID[0], DEVICE_ID[1], 0x00, 0xAB,
    ];
    frame[8] = frame[2..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    frame
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn reads_passive_report_mode() {
    let port = Builder::new()
        .write(&encode_command(0x02, &[0x00]))
        .read(&reply(0x02, 0x00, 0x01, 0x00))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    assert_eq!(driver.report_mode().await.unwrap(), ReportMode::Passive);
}

#[tokio::test]
async fn skips_data_frames_interleaved_with_reply() {
    let port = Builder::new()
        .write(&encode_command(0x02, &[0x00]))
        .read(&data(120, 200))
        .read(&data(121, 201))
        .read(&reply(0x02, 0x00, 0x00, 0x00))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    assert_eq!(driver.report_mode().await.unwrap(), ReportMode::Active);
}

#[tokio::test]
async fn corrupted_reply_is_retryable() {
    let mut garbled = reply(0x02, 0x00, 0x01, 0x00);
    garbled[8] ^= 0xFF;

    let port = Builder::new()
        .write(&encode_command(0x02, &[0x00]))
        .read(&garbled)
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    let err = driver.report_mode().await.unwrap_err();
    assert!(matches!(err, DaqError::MalformedRead(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn reply_to_other_command_is_malformed() {
    let port = Builder::new()
        .write(&encode_command(0x02, &[0x00]))
        .read(&reply(0x08, 0x00, 0x05, 0x00))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    assert!(matches!(
        driver.report_mode().await,
        Err(DaqError::MalformedRead(_))
    ));
}

#[tokio::test]
async fn query_skips_line_noise() {
    let port = Builder::new()
        .write(&encode_command(0x04, &[]))
        .read(&[0x00, 0x13, 0xAB])
        .read(&[0xAA, 0xC0, 0xD4, 0x04, 0x3A, 0x0A, 0xA1, 0x60, 0x1D, 0xAB])
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    let point = driver.query_once().await.unwrap();
    assert_close(point.pm25, 123.6);
    assert_close(point.pm10, 261.8);
}

#[tokio::test]
async fn stream_reads_consecutive_reports() {
    let port = Builder::new()
        .read(&data(55, 98))
        .read(&data(57, 101))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    let first = driver.stream_next().await.unwrap();
    let second = driver.stream_next().await.unwrap();
    assert_close(first.pm25, 5.5);
    assert_close(first.pm10, 9.8);
    assert_close(second.pm25, 5.7);
    assert_close(second.pm10, 10.1);
}

#[tokio::test(start_paused = true)]
async fn silent_port_times_out() {
    let (port, _sensor_side) = tokio::io::duplex(64);
    let driver = Sds011Driver::from_port(port, Duration::from_secs(3));

    assert!(matches!(
        driver.stream_next().await,
        Err(DaqError::Timeout(timeout)) if timeout == Duration::from_secs(3)
    ));
}

#[tokio::test]
async fn close_is_idempotent() {
    let driver = Sds011Driver::from_port(Builder::new().build(), TIMEOUT);

    driver.close().await.unwrap();
    driver.close().await.unwrap();

    assert!(matches!(driver.stream_next().await, Err(DaqError::Closed)));
    assert!(matches!(driver.query_once().await, Err(DaqError::Closed)));
}

#[tokio::test]
async fn reads_device_info() {
    let port = Builder::new()
        .write(&encode_command(0x07, &[]))
        .read(&reply(0x07, 15, 7, 10))
        .write(&encode_command(0x07, &[]))
        .read(&reply(0x07, 15, 7, 10))
        .write(&encode_command(0x06, &[0x00]))
        .read(&reply(0x06, 0x00, 0x01, 0x00))
        .write(&encode_command(0x08, &[0x00]))
        .read(&reply(0x08, 0x00, 0x05, 0x00))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);

    assert_eq!(driver.device_id().await.unwrap(), "A160");
    assert_eq!(driver.firmware().await.unwrap(), "15-07-10");
    assert!(driver.is_awake().await.unwrap());
    assert_eq!(driver.working_period().await.unwrap(), 5);
}

#[tokio::test]
async fn set_report_mode_checks_acknowledgement() {
    let port = Builder::new()
        .write(&encode_command(0x02, &[0x01, 0x00]))
        .read(&reply(0x02, 0x01, 0x00, 0x00))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);
    driver.set_report_mode(ReportMode::Active).await.unwrap();

    let port = Builder::new()
        .write(&encode_command(0x02, &[0x01, 0x01]))
        .read(&reply(0x02, 0x01, 0x00, 0x00))
        .build();
    let driver = Sds011Driver::from_port(port, TIMEOUT);
    assert!(matches!(
        driver.set_report_mode(ReportMode::Passive).await,
        Err(DaqError::MalformedRead(_))
    ));
}

#[tokio::test]
async fn working_period_above_thirty_is_rejected_without_io() {
    let driver = Sds011Driver::from_port(Builder::new().build(), TIMEOUT);

    assert!(matches!(
        driver.set_working_period(31).await,
        Err(DaqError::InvalidArgument(_))
    ));
}
