//! This module provides the main implementation of the [`Transport`] trait.
//!
//! It can be used with any type that implements [`std::io::Read`] and [`std::io::Write`],
//! such as [`std::net::TcpStream`] or [`serialport::SerialPort`].

use std::time::Duration;

use crate::{DmmError, Transport};

/// A general instrument connection that can be built from any port that implements
/// [`std::io::Read`] and [`std::io::Write`].
///
/// This struct is what the shortcut constructors for serial and TCP/IP links hand back.
/// The general implementation can also be used with port types that `dmmRs` does not
/// provide itself.
///
/// # Example
///
/// The following shows how to create a [`Connection`] from your own port type. To just use
/// a plain [`std::net::TcpStream`] as shown here, you can also use the
/// [`crate::TcpIpTransport`] shortcut.
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use dmmrs::Connection;
///
/// let port = TcpStream::connect("192.168.10.1:5025").unwrap();
/// let conn = Connection::new(port, Duration::from_secs(3));
/// ```
pub struct Connection<P: std::io::Read + std::io::Write> {
    port: P,
    terminator: String,
    timeout: Duration,
}

impl<P: std::io::Read + std::io::Write> Connection<P> {
    /// Create a new [`Connection`] with a given port.
    ///
    /// The terminator defaults to `"\n"` and can be changed with
    /// [`Transport::set_terminator`].
    ///
    /// # Arguments:
    /// - `port` - The port to communicate over.
    /// - `timeout` - Timeout that bounds a single response read.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            terminator: "\n".to_string(),
            timeout,
        }
    }
}

impl<P: std::io::Read + std::io::Write> Transport for Connection<P> {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), DmmError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DmmError> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }
}
