//! This module provides shortcuts for connections over a serial port.
//!
//! It builds a blocking [`Connection`] using the [`serialport`] crate.

use std::time::Duration;

use serialport::{SerialPort, SerialPortBuilder};

use crate::{Connection, DmmError};

/// Shortcut constructors for a serial port [`Connection`].
///
/// # Example
///
/// ```no_run
/// use dmmrs::{SerialTransport, Transport};
///
/// let mut conn = SerialTransport::simple("/dev/ttyUSB0", 9600).unwrap();
/// println!("{}", conn.query("*IDN?").unwrap());
/// ```
#[derive(Debug)]
pub struct SerialTransport {}

impl SerialTransport {
    /// Try to create a connection with a simple serial port configuration.
    ///
    /// Eight data bits, no parity, one stop bit, and a three second timeout. If your device
    /// needs a different framing, configure a [`serialport::SerialPortBuilder`] yourself and
    /// hand it to [`SerialTransport::full`].
    ///
    /// # Arguments:
    /// - `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    /// - `baud_rate` - The baud rate to use.
    pub fn simple(
        port: &str,
        baud_rate: u32,
    ) -> Result<Connection<Box<dyn SerialPort>>, DmmError> {
        let spb = serialport::new(port, baud_rate).timeout(Duration::from_secs(3));
        Self::full(spb)
    }

    /// Try to create a connection from a fully configured [`serialport::SerialPortBuilder`].
    ///
    /// The timeout configured on the builder also bounds response reads.
    ///
    /// # Arguments:
    /// - `spb` - The serial port builder to open.
    pub fn full(spb: SerialPortBuilder) -> Result<Connection<Box<dyn SerialPort>>, DmmError> {
        let port = spb.open()?;
        let timeout = port.timeout();
        Ok(Connection::new(port, timeout))
    }
}
