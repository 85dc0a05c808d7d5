//! dmmRs: Talk to your bench multimeter from Rust
//!
//! The dmmRs library provides the transport layer for instrument drivers that speak a
//! text-based, terminator-delimited command/response protocol (SCPI and friends). It
//! provides a [`Transport`] trait and its implementations, plus a [`DmmError`] error type
//! that drivers built on top of this crate should return.
//!
//! # Currently implemented transports are:
//! - Any type implementing [`std::io::Read`] and [`std::io::Write`] via [`Connection`].
//! - Serial (blocking) using the [`serialport`] crate, behind the `serial` feature.
//! - TCP/IP (blocking) using [`std::net::TcpStream`].
//! - A scripted loopback transport for writing driver tests without hardware.
//!
//! # Goals and non-goals of this project
//!
//! dmmRs takes care of the interfacing so that a driver crate can focus on the command
//! vocabulary and the measurement semantics of its device. The same driver then works
//! whether the meter hangs off an RS-232 port, an ethernet-to-serial bridge, or a test
//! script. Window toolkits, plotting, and file export are out of scope here; consumers
//! get data and status from the driver crates and render them however they like.
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.

#![warn(missing_docs)]

mod connection;
mod loopback;
#[cfg(feature = "serial")]
mod serial;
mod tcp_ip;

pub use connection::Connection;
pub use loopback::LoopbackTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use tcp_ip::TcpIpTransport;

use std::time::{Duration, Instant};

use thiserror::Error;

/// The error enum for the transport layer and the drivers built on it.
///
/// For any command sending or querying, a driver should return either an empty result or a
/// result with the query where this error is the alternative. [`DmmError`] makes it easy to
/// propagate sending and querying errors forward with the `?` operator. If this is not
/// possible, it is considered a bug and should be reported.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DmmError {
    /// An operation was attempted without an open connection, or after the connection was
    /// closed.
    #[error("Not connected to the instrument.")]
    NotConnected,
    /// Timeout occurred while waiting for a response from the instrument. The error contains
    /// the timeout that was exceeded.
    #[error(
        "Timeout occured while waiting for a response from the instrument. Timeout was set to {0:?}."
    )]
    Timeout(Duration),
    /// Timeout occurred while waiting for a response to a query. The error contains the query
    /// that was sent and the timeout that was exceeded.
    #[error(
        "Timeout occured while waiting for a response to query: {query}. Timeout was set to {timeout:?}."
    )]
    TimeoutQuery {
        /// The query that timed out.
        query: String,
        /// The timeout that was set.
        timeout: Duration,
    },
    /// Error when reading from/writing to an interface. See [`std::io::Error`] for more
    /// details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    /// Serial port errors can occur when opening a serial interface. See the
    /// [`serialport::Error`] documentation for more information.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// Instrument response could not be parsed because it was unexpected by the driver. This
    /// error contains the response that was received from the instrument.
    #[error("Response from instrument could not be parsed. Response was: {0}")]
    ResponseParse(String),
    /// A requested configuration is invalid for the instrument, e.g., a value outside the
    /// instrument's accepted bounds or an operation that conflicts with the current run
    /// state. The error contains a message intended for the user.
    #[error("{0}")]
    Config(String),
    /// The instrument reported a fault through its own error queue. The error contains the
    /// device error code and the message the instrument sent along with it.
    #[error("Instrument reported error {code}: {message}")]
    Device {
        /// The error code from the instrument's error queue.
        code: i32,
        /// The message the instrument attached to the error.
        message: String,
    },
}

/// The `Transport` trait defines the interface for command/response instrument links.
///
/// Implementors provide the raw byte I/O via [`Transport::write_raw`] and
/// [`Transport::read_exact`]. Terminator handling, bounded line reads, and queries are
/// provided on top of those. Drivers should only ever use the provided methods.
pub trait Transport {
    /// Write raw bytes to the instrument and flush the link.
    ///
    /// # Arguments:
    /// - `data` - The bytes to write, terminator included.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), DmmError>;

    /// Read exactly `buf.len()` bytes from the instrument.
    ///
    /// # Arguments:
    /// - `buf` - The buffer to fill completely before returning.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DmmError>;

    /// Get the currently set terminator of the interface.
    fn get_terminator(&self) -> &str {
        "\n"
    }

    /// Set the terminator of an interface from a `&str`.
    ///
    /// # Arguments:
    /// - `_terminator` - A string slice that will be used as the terminator for commands.
    fn set_terminator(&mut self, _terminator: &str) {}

    /// Get the timeout that bounds a single response read.
    fn get_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Send a command to the instrument.
    ///
    /// This function takes the command, appends the terminator, writes it to the instrument,
    /// and flushes the interface to ensure that the command is sent immediately.
    ///
    /// # Arguments:
    /// - `cmd` - A string slice that will be sent to the instrument.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), DmmError> {
        let cmd = format!("{}{}", cmd, self.get_terminator());
        self.write_raw(cmd.as_bytes())
    }

    /// Read from the instrument until the terminator is found.
    ///
    /// The response is read byte by byte until it ends with the terminator. If no terminator
    /// is encountered within the configured timeout, a [`DmmError::Timeout`] is returned.
    /// A non-UTF-8 byte is logged and skipped. The returned string has the terminator and
    /// any remaining surrounding whitespace stripped.
    fn read_until_terminator(&mut self) -> Result<String, DmmError> {
        let mut response = String::new();
        let mut single_buf = [0u8];

        let tic = Instant::now();
        loop {
            if tic.elapsed() >= self.get_timeout() {
                return Err(DmmError::Timeout(self.get_timeout()));
            }
            match self.read_exact(&mut single_buf) {
                Ok(()) => {}
                Err(DmmError::Io(e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Err(DmmError::Timeout(self.get_timeout()));
                }
                Err(e) => return Err(e),
            }
            if let Ok(val) = str::from_utf8(&single_buf) {
                response.push_str(val);
            } else {
                log::warn!("Received invalid UTF-8 data: {single_buf:?}");
            }
            if response.ends_with(self.get_terminator()) {
                break;
            }
        }

        let stripped = response
            .strip_suffix(self.get_terminator())
            .unwrap_or(&response);
        Ok(stripped.trim().to_string())
    }

    /// Query the instrument with a command and return the response as a String.
    ///
    /// This function uses [`Transport::sendcmd`] to send the command and then reads the
    /// response with [`Transport::read_until_terminator`]. A read timeout is re-tagged as a
    /// [`DmmError::TimeoutQuery`] carrying the query that caused it.
    ///
    /// # Arguments:
    /// - `cmd` - The command to send to the instrument for which we expect a response.
    fn query(&mut self, cmd: &str) -> Result<String, DmmError> {
        self.sendcmd(cmd)?;
        match self.read_until_terminator() {
            Err(DmmError::Timeout(timeout)) => Err(DmmError::TimeoutQuery {
                query: cmd.to_string(),
                timeout,
            }),
            other => other,
        }
    }
}
