//! Nova SDS011 Particulate Matter Sensor Driver
//!
//! Reference: Nova SDS011 Laser Dust Sensor Control Protocol V1.3
//!
//! Protocol Overview:
//! - Format: fixed-length binary frames, little-endian payloads
//! - Baud: 9600, 8N1, no flow control
//! - Command frame (host → sensor), 19 bytes:
//!   `AA B4 cmd d1..d12 id1 id2 cs AB`, checksum over bytes 2..=16
//! - Data report (sensor → host), 10 bytes:
//!   `AA C0 pm25_lo pm25_hi pm10_lo pm10_hi id1 id2 cs AB`
//! - Command reply (sensor → host), 10 bytes:
//!   `AA C5 cmd b3 b4 b5 id1 id2 cs AB`, checksum over bytes 2..=7
//!
//! # Important Notes
//!
//! - In active mode the sensor emits a data report roughly once per second,
//!   so command replies arrive interleaved with unsolicited data frames
//! - Concentrations are transmitted in tenths of µg/m³
//! - Device id `FF FF` in a command addresses every sensor on the line
//!
//! # Example Usage
//!
//! ```no_run
//! use sds011_daq::hardware::capabilities::{ParticulateSensor, SensorConnector};
//! use sds011_daq::hardware::sds011::Sds011Connector;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = Sds011Connector::new(Duration::from_secs(3));
//!     let sensor = connector.open("/dev/ttyUSB0").await?;
//!
//!     let point = sensor.query_once().await?;
//!     println!("PM2.5 {} PM10 {}", point.pm25, point.pm10);
//!
//!     sensor.close().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, instrument, trace};

use crate::config::SensorConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{ParticulateSensor, SensorConnector, SensorSettings};
use crate::measurement_types::{Point, ReportMode};

/// Default line speed of the SDS011 UART
pub const BAUD_RATE: u32 = 9600;

/// Unsolicited data frames tolerated while waiting for a command reply
pub const MAX_INTERLEAVED_FRAMES: usize = 8;

const HEAD: u8 = 0xAA;
const TAIL: u8 = 0xAB;
const COMMAND_ID: u8 = 0xB4;
const DATA_ID: u8 = 0xC0;
const REPLY_ID: u8 = 0xC5;

const COMMAND_FRAME_LEN: usize = 19;
const REPORT_FRAME_LEN: usize = 10;
const COMMAND_DATA_LEN: usize = 12;
const ALL_SENSORS: [u8; 2] = [0xFF, 0xFF];

const CMD_REPORT_MODE: u8 = 0x02;
const CMD_QUERY_DATA: u8 = 0x04;
const CMD_SLEEP_WORK: u8 = 0x06;
const CMD_FIRMWARE: u8 = 0x07;
const CMD_WORKING_PERIOD: u8 = 0x08;

const QUERY: u8 = 0x00;
const SET: u8 = 0x01;

/// Longest working period the sensor accepts, in minutes
pub const MAX_WORKING_PERIOD: u8 = 30;

/// Byte transport the driver can run over (serial port, test double, pipe)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}
type DynSerial = Box<dyn SerialPortIO>;
type SharedPort = Mutex<Option<DynSerial>>;

/// A decoded sensor-to-host frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Measurement report (`C0`), raw tenths of µg/m³
    Data {
        /// PM2.5 in tenths
        pm25_tenths: u16,
        /// PM10 in tenths
        pm10_tenths: u16,
        /// Reporting device id
        device_id: [u8; 2],
    },
    /// Command reply (`C5`)
    Reply {
        /// Command this frame answers
        command: u8,
        /// Bytes 3..=5 of the frame
        payload: [u8; 3],
        /// Replying device id
        device_id: [u8; 2],
    },
}

/// Build a 19-byte command frame addressed to every sensor.
///
/// `data` fills the data bytes after the command id; missing bytes are zero.
pub fn encode_command(command: u8, data: &[u8]) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND_ID;
    frame[2] = command;
    let len = data.len().min(COMMAND_DATA_LEN);
    frame[3..3 + len].copy_from_slice(&data[..len]);
    frame[15..17].copy_from_slice(&ALL_SENSORS);
    frame[17] = checksum(&frame[2..17]);
    frame[18] = TAIL;
    frame
}

/// Decode a 10-byte sensor frame, validating tail, kind and checksum.
pub fn decode_frame(buf: &[u8; REPORT_FRAME_LEN]) -> AppResult<Frame> {
    if buf[0] != HEAD {
        return Err(DaqError::MalformedRead(format!(
            "bad frame header {:#04x}",
            buf[0]
        )));
    }
    if buf[9] != TAIL {
        return Err(DaqError::MalformedRead(format!(
            "bad frame tail {:#04x}",
            buf[9]
        )));
    }
    let expected = checksum(&buf[2..8]);
    if buf[8] != expected {
        return Err(DaqError::MalformedRead(format!(
            "checksum mismatch: expected {expected:#04x}, got {:#04x}",
            buf[8]
        )));
    }

    let device_id = [buf[6], buf[7]];
    match buf[1] {
        DATA_ID => Ok(Frame::Data {
            pm25_tenths: u16::from_le_bytes([buf[2], buf[3]]),
            pm10_tenths: u16::from_le_bytes([buf[4], buf[5]]),
            device_id,
        }),
        REPLY_ID => Ok(Frame::Reply {
            command: buf[2],
            payload: [buf[3], buf[4], buf[5]],
            device_id,
        }),
        other => Err(DaqError::MalformedRead(format!(
            "unknown frame kind {other:#04x}"
        ))),
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn format_device_id(id: [u8; 2]) -> String {
    format!("{:02X}{:02X}", id[0], id[1])
}

/// Opens SDS011 sensors on serial ports.
#[derive(Debug, Clone)]
pub struct Sds011Connector {
    baud_rate: u32,
    read_timeout: Duration,
}

impl Sds011Connector {
    /// Connector at the default baud rate with the given read timeout
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout,
        }
    }

    /// Connector configured from the `[sensor]` section
    pub fn from_config(config: &SensorConfig) -> Self {
        Self {
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout(),
        }
    }
}

#[async_trait]
impl SensorConnector for Sds011Connector {
    type Sensor = Sds011Driver;

    async fn open(&self, path: &str) -> AppResult<Sds011Driver> {
        // 8N1, no flow control
        let port = tokio_serial::new(path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;

        debug!(path, baud_rate = self.baud_rate, "opened SDS011 serial port");
        Ok(Sds011Driver::from_port(port, self.read_timeout))
    }
}

/// Driver for the Nova SDS011 sensor
///
/// Implements every sensor capability over any async byte transport. The port
/// is held behind a Mutex so a command and its reply are never interleaved with
/// another exchange.
pub struct Sds011Driver {
    /// Transport, `None` once closed
    port: SharedPort,
    /// Bound on every frame read
    timeout: Duration,
}

impl Sds011Driver {
    /// Wrap an already-open transport
    pub fn from_port<T: SerialPortIO + 'static>(port: T, timeout: Duration) -> Self {
        Self {
            port: Mutex::new(Some(Box::new(port))),
            timeout,
        }
    }

    /// Read one frame, skipping line noise before the header byte
    async fn read_frame(&self, port: &mut DynSerial) -> AppResult<Frame> {
        tokio::time::timeout(self.timeout, read_raw_frame(port))
            .await
            .map_err(|_| DaqError::Timeout(self.timeout))?
    }

    /// Send a command and wait for the matching reply
    async fn transact(&self, command: u8, data: &[u8]) -> AppResult<([u8; 3], [u8; 2])> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(DaqError::Closed)?;

        port.write_all(&encode_command(command, data)).await?;
        port.flush().await?;

        for _ in 0..=MAX_INTERLEAVED_FRAMES {
            match self.read_frame(port).await? {
                Frame::Reply {
                    command: replied,
                    payload,
                    device_id,
                } if replied == command => return Ok((payload, device_id)),
                Frame::Reply {
                    command: replied, ..
                } => {
                    return Err(DaqError::MalformedRead(format!(
                        "reply for command {replied:#04x} while waiting for {command:#04x}"
                    )))
                }
                Frame::Data { .. } => trace!("skipping interleaved data frame"),
            }
        }

        Err(DaqError::MalformedRead(format!(
            "no reply to command {command:#04x} within {MAX_INTERLEAVED_FRAMES} frames"
        )))
    }

    /// Read frames until a data report arrives
    async fn next_data_frame(&self, port: &mut DynSerial) -> AppResult<Point> {
        for _ in 0..=MAX_INTERLEAVED_FRAMES {
            match self.read_frame(port).await? {
                Frame::Data {
                    pm25_tenths,
                    pm10_tenths,
                    ..
                } => return Ok(Point::from_tenths(pm25_tenths, pm10_tenths)),
                Frame::Reply { command, .. } => {
                    trace!(command, "skipping command reply while waiting for data")
                }
            }
        }

        Err(DaqError::MalformedRead(
            "no data report among received frames".into(),
        ))
    }
}

async fn read_raw_frame(port: &mut DynSerial) -> AppResult<Frame> {
    let mut byte = [0u8; 1];
    loop {
        port.read_exact(&mut byte).await?;
        if byte[0] == HEAD {
            break;
        }
    }

    let mut buf = [0u8; REPORT_FRAME_LEN];
    buf[0] = HEAD;
    port.read_exact(&mut buf[1..]).await?;
    decode_frame(&buf)
}

#[async_trait]
impl ParticulateSensor for Sds011Driver {
    async fn report_mode(&self) -> AppResult<ReportMode> {
        let (payload, _) = self.transact(CMD_REPORT_MODE, &[QUERY]).await?;
        match payload[1] {
            0 => Ok(ReportMode::Active),
            1 => Ok(ReportMode::Passive),
            other => Err(DaqError::MalformedRead(format!(
                "unknown report mode {other:#04x}"
            ))),
        }
    }

    async fn stream_next(&self) -> AppResult<Point> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(DaqError::Closed)?;
        self.next_data_frame(port).await
    }

    async fn query_once(&self) -> AppResult<Point> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(DaqError::Closed)?;

        port.write_all(&encode_command(CMD_QUERY_DATA, &[])).await?;
        port.flush().await?;
        self.next_data_frame(port).await
    }

    async fn close(&self) -> AppResult<()> {
        if let Some(mut port) = self.port.lock().await.take() {
            port.shutdown().await?;
            debug!("SDS011 port closed");
        }
        Ok(())
    }
}

#[async_trait]
impl SensorSettings for Sds011Driver {
    #[instrument(skip(self), err)]
    async fn set_report_mode(&self, mode: ReportMode) -> AppResult<()> {
        let value = match mode {
            ReportMode::Active => 0,
            ReportMode::Passive => 1,
        };
        let (payload, _) = self.transact(CMD_REPORT_MODE, &[SET, value]).await?;
        if payload[1] != value {
            return Err(DaqError::MalformedRead(format!(
                "sensor acknowledged report mode {:#04x}, requested {value:#04x}",
                payload[1]
            )));
        }
        Ok(())
    }

    async fn working_period(&self) -> AppResult<u8> {
        let (payload, _) = self.transact(CMD_WORKING_PERIOD, &[QUERY]).await?;
        Ok(payload[1])
    }

    #[instrument(skip(self), err)]
    async fn set_working_period(&self, minutes: u8) -> AppResult<()> {
        if minutes > MAX_WORKING_PERIOD {
            return Err(DaqError::InvalidArgument(format!(
                "working period must be 0-{MAX_WORKING_PERIOD} minutes, got {minutes}"
            )));
        }
        self.transact(CMD_WORKING_PERIOD, &[SET, minutes]).await?;
        Ok(())
    }

    async fn device_id(&self) -> AppResult<String> {
        let (_, device_id) = self.transact(CMD_FIRMWARE, &[]).await?;
        Ok(format_device_id(device_id))
    }

    async fn firmware(&self) -> AppResult<String> {
        let (payload, _) = self.transact(CMD_FIRMWARE, &[]).await?;
        Ok(format!(
            "{:02}-{:02}-{:02}",
            payload[0], payload[1], payload[2]
        ))
    }

    async fn is_awake(&self) -> AppResult<bool> {
        let (payload, _) = self.transact(CMD_SLEEP_WORK, &[QUERY]).await?;
        Ok(payload[1] == 1)
    }
}
