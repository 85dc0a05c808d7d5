//! Tests for the default implementation of the [`Transport`] trait.

use std::{collections::VecDeque, io, time::Duration};

use rstest::*;

use dmmrs::{Connection, DmmError, Transport};

/// A minimal transport that only provides the required methods; everything else comes
/// from the trait defaults.
struct BareTransport;

impl Transport for BareTransport {
    fn write_raw(&mut self, _data: &[u8]) -> Result<(), DmmError> {
        Ok(())
    }

    fn read_exact(&mut self, _buf: &mut [u8]) -> Result<(), DmmError> {
        Ok(())
    }
}

/// A transport whose reads always time out, as a dead instrument would.
struct DeadTransport;

impl Transport for DeadTransport {
    fn write_raw(&mut self, _data: &[u8]) -> Result<(), DmmError> {
        Ok(())
    }

    fn read_exact(&mut self, _buf: &mut [u8]) -> Result<(), DmmError> {
        Err(DmmError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "no response",
        )))
    }

    fn get_timeout(&self) -> Duration {
        Duration::from_millis(10)
    }
}

#[fixture]
fn echo() -> Connection<VecDeque<u8>> {
    // A VecDeque port reads back whatever was written, so every query echoes.
    Connection::new(VecDeque::new(), Duration::from_secs(1))
}

#[rstest]
fn test_default_get_terminator() {
    assert_eq!(BareTransport.get_terminator(), "\n");
}

#[rstest]
fn test_default_get_timeout() {
    assert_eq!(BareTransport.get_timeout(), Duration::from_secs(3));
}

#[rstest]
fn test_connection_query_echo(mut echo: Connection<VecDeque<u8>>) {
    let resp = echo.query("*IDN?").unwrap();
    assert_eq!(resp, "*IDN?");
}

#[rstest]
fn test_connection_sendcmd_appends_terminator(mut echo: Connection<VecDeque<u8>>) {
    echo.sendcmd("CONF:VOLT:DC").unwrap();
    let resp = echo.read_until_terminator().unwrap();
    assert_eq!(resp, "CONF:VOLT:DC");
}

#[rstest]
fn test_connection_custom_terminator(mut echo: Connection<VecDeque<u8>>) {
    echo.set_terminator("\r\n");
    assert_eq!(echo.get_terminator(), "\r\n");
    let resp = echo.query("READ?").unwrap();
    assert_eq!(resp, "READ?");
}

#[rstest]
fn test_query_strips_surrounding_whitespace() {
    let mut conn = Connection::new(VecDeque::<u8>::new(), Duration::from_secs(1));
    conn.sendcmd("  +1.234E+00 ").unwrap();
    assert_eq!(conn.read_until_terminator().unwrap(), "+1.234E+00");
}

#[rstest]
fn test_query_timeout_is_tagged_with_query() {
    let mut dead = DeadTransport;
    match dead.query("READ?") {
        Err(DmmError::TimeoutQuery { query, timeout }) => {
            assert_eq!(query, "READ?");
            assert_eq!(timeout, Duration::from_millis(10));
        }
        other => panic!("Expected TimeoutQuery error, got {other:?}"),
    }
}

#[rstest]
fn test_read_timeout_is_distinct_from_io() {
    let mut dead = DeadTransport;
    assert!(matches!(
        dead.read_until_terminator(),
        Err(DmmError::Timeout(_))
    ));
}

#[rstest]
fn test_io_error_passes_through() {
    struct BrokenTransport;
    impl Transport for BrokenTransport {
        fn write_raw(&mut self, _data: &[u8]) -> Result<(), DmmError> {
            Err(DmmError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "gone",
            )))
        }
        fn read_exact(&mut self, _buf: &mut [u8]) -> Result<(), DmmError> {
            Ok(())
        }
    }
    assert!(matches!(
        BrokenTransport.sendcmd("READ?"),
        Err(DmmError::Io(_))
    ));
}
