//! This module provides a shortcut for connections over TCP/IP.
//!
//! It builds a blocking [`Connection`] using the [`std::net::TcpStream`] struct.

use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{Connection, DmmError};

/// Shortcut constructor for a TCP/IP [`Connection`].
#[derive(Debug)]
pub struct TcpIpTransport {}

impl TcpIpTransport {
    /// Try to create a connection to an instrument reachable over TCP/IP.
    ///
    /// The terminator is by default set to `"\n"`, but can be changed using the
    /// `set_terminator` function. Read and write timeouts are set to three seconds; we do
    /// not want to block indefinitely on a socket, which a raw `TcpStream` would allow.
    ///
    /// # Arguments:
    /// - `sock_addr` - Socket address, e.g., `"192.168.10.1:5025"`.
    pub fn try_new<A: ToSocketAddrs>(sock_addr: A) -> Result<Connection<TcpStream>, DmmError> {
        let stream = TcpStream::connect(sock_addr)?;
        let timeout = Duration::from_secs(3);
        stream.set_write_timeout(Some(timeout))?;
        stream.set_read_timeout(Some(timeout))?;
        Ok(Connection::new(stream, timeout))
    }
}
