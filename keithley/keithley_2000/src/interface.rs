//! Provide a serial interface for the Keithley 2000.

use std::time::Duration;

use dmmrs::{Connection, DmmError, SerialTransport};
use serialport::SerialPort;

/// A serial interface for the Keithley 2000.
///
/// Builds a dmmRs serial connection with the framing the meter ships with on its RS-232
/// port.
#[derive(Debug)]
pub struct SerialInterfaceKeithley2000 {}

impl SerialInterfaceKeithley2000 {
    /// Try to create a connection with a simple serial port configuration.
    ///
    /// This is analog to the `simple` method of the [`SerialTransport`] struct in `dmmRs`,
    /// set up for the meter's factory settings: 9600 baud, eight data bits, no parity, one
    /// stop bit. The default timeout is set to 3 seconds.
    ///
    /// Arguments:
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    pub fn simple(port: &str) -> Result<Connection<Box<dyn SerialPort>>, DmmError> {
        let timeout = Duration::from_secs(3);
        let port = serialport::new(port, 9600)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One);
        SerialTransport::full(port)
    }
}
