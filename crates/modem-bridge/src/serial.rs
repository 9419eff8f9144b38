//! Serial port transport
//!
//! The ESP8266 is attached over a USB-serial adapter.

use crate::transport::{StreamReader, StreamWriter};
use gdl90_core::{Gdl90Error, Result};
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

/// Default device path of the USB-serial adapter
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate of the ESP8266 AT firmware
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial read half
pub type SerialReader = StreamReader<ReadHalf<SerialStream>>;

/// Serial write half
pub type SerialWriter = StreamWriter<WriteHalf<SerialStream>>;

/// Open the serial port and split it into reader and writer halves
pub fn open(path: &str, baud: u32) -> Result<(SerialReader, SerialWriter)> {
    info!("Opening {} at {} baud", path, baud);

    let stream = tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(|e| Gdl90Error::Serial(format!("Failed to open {}: {}", path, e)))?;

    let (read_half, write_half) = tokio::io::split(stream);
    Ok((StreamReader::new(read_half), StreamWriter(write_half)))
}
