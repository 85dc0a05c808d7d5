//! The loopback module provides a scripted instrument simulator for testing drivers.
//!
//! End-of-command is always determined by a terminator string, usually `"\n"` or similar.

use std::collections::VecDeque;

use crate::{DmmError, Transport};

/// A self-incrementing index structure that by default starts at 0 and increments whenever
/// `next` is called.
#[derive(Debug, Default)]
struct IncrIndex {
    index: usize,
}

impl IncrIndex {
    fn next(&mut self) -> usize {
        let current = self.index;
        self.index += 1;
        current
    }
}

/// A transport that allows you to simply write tests for your instrument driver.
///
/// You provide a list of commands that are expected to go from the host to the instrument
/// and a list of replies the instrument sends back. Both are consumed strictly in order:
/// whenever the driver sends something unexpected, the [`LoopbackTransport`] panics. When it
/// is dropped, a `finalize` check panics if any provided commands or replies were left
/// unused. This way your tests ensure easily that the full expected exchange took place.
///
/// # Example
///
/// Let us build a simple driver that sends a `"*IDN?"` command to an instrument and gets
/// back a string, then test it with the [`LoopbackTransport`]. The driver takes any
/// transport that implements the [`Transport`] trait.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use dmmrs::{DmmError, LoopbackTransport, Transport};
///
/// struct MyMeter<T: Transport> {
///     interface: Arc<Mutex<T>>,
/// }
///
/// impl<T: Transport> MyMeter<T> {
///     fn new(interface: T) -> Self {
///         let interface = Arc::new(Mutex::new(interface));
///         MyMeter { interface }
///     }
///
///     fn identify(&mut self) -> Result<String, DmmError> {
///         self.interface.lock().unwrap().query("*IDN?")
///     }
/// }
///
/// let host2inst = vec!["*IDN?".to_string()];
/// let inst2host = vec!["MyMeter,1.0,1234".to_string()];
///
/// let loopback = LoopbackTransport::new(host2inst, inst2host, "\n");
///
/// let mut inst = MyMeter::new(loopback);
/// assert_eq!("MyMeter,1.0,1234", inst.identify().unwrap());
/// ```
pub struct LoopbackTransport {
    from_host: Vec<String>,
    from_inst: Vec<String>,
    terminator_exp: String,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: VecDeque<u8>,
    terminator: String,
}

impl LoopbackTransport {
    /// Create a new loopback transport with given commands to and from the instrument.
    ///
    /// # Arguments:
    /// - `from_host` - Commands from host to instrument, in expected order.
    /// - `from_inst` - Replies from instrument to host, in expected order.
    /// - `terminator_exp` - The terminator the driver under test is expected to use.
    pub fn new(from_host: Vec<String>, from_inst: Vec<String>, terminator_exp: &str) -> Self {
        LoopbackTransport {
            from_host,
            from_inst,
            terminator_exp: terminator_exp.to_string(),
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: VecDeque::new(),
            terminator: "\n".to_string(), // default terminator, as interfaces
        }
    }

    /// This command panics if not all commands in the [`LoopbackTransport`] have been used.
    ///
    /// It is automatically called when the [`LoopbackTransport`] is dropped, but you can
    /// also call it manually to ensure that all commands have been used.
    pub fn finalize(&mut self) {
        let from_host_leftover = self.from_host.get(self.from_host_index.next());
        let from_inst_leftover = self.from_inst.get(self.from_inst_index.next());
        if let Some(fil) = from_host_leftover {
            panic!("Leftover expected commands found from host to instrument: {fil}");
        }
        if let Some(fil) = from_inst_leftover {
            panic!("Leftover expected commands found from instrument to host: {fil}");
        }
    }

    /// Test the transport's terminator and ensure the right one is set.
    ///
    /// The correct terminator can either be the default one or the one that was set via the
    /// `set_terminator` function.
    pub fn test_terminator(&self, expected_terminator: &str) {
        assert_eq!(
            expected_terminator, self.terminator,
            "Expected terminator '{expected_terminator}', got '{}'",
            self.terminator
        );
    }

    /// Get the next command from host to instrument, or panic.
    fn get_next_from_host(&mut self) -> &str {
        self.from_host
            .get(self.from_host_index.next())
            .expect("No more commands were expected from host to instrument.")
    }

    /// Get the next command from instrument to host, or panic.
    fn get_next_from_inst(&mut self) -> &str {
        self.from_inst
            .get(self.from_inst_index.next())
            .expect("No more commands were expected from instrument to host.")
    }

    /// Get the next command from host to instrument as a string including the terminator.
    fn get_next_from_host_with_terminator(&mut self) -> String {
        let cmd = self.get_next_from_host().to_string();
        format!("{cmd}{}", self.terminator_exp)
    }

    /// Get the next command from instrument to host as a string including the terminator.
    fn get_next_from_inst_with_terminator(&mut self) -> String {
        let cmd = self.get_next_from_inst().to_string();
        format!("{cmd}{}", self.terminator_exp)
    }

    /// Function to read exactly one byte from the next command from the instrument.
    ///
    /// This just panics if there are no more commands. If there are no more commands but one
    /// is required, the panic is justified as this is a test interface.
    fn read_one_byte(&mut self) -> u8 {
        match self.curr_bytes.pop_front() {
            Some(byte) => byte,
            None => {
                let next_cmd = self.get_next_from_inst_with_terminator();
                self.curr_bytes = next_cmd.as_bytes().iter().copied().collect();
                self.read_one_byte()
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn write_raw(&mut self, cmd: &[u8]) -> Result<(), DmmError> {
        let exp = self.get_next_from_host_with_terminator();
        assert_eq!(
            exp.as_bytes(),
            cmd,
            "Expected sendcmd '{0}', got '{1:?}'",
            exp,
            str::from_utf8(cmd)
        );
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DmmError> {
        for byte in buf.iter_mut() {
            *byte = self.read_one_byte();
        }
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.finalize();
    }
}

// Tests of internal functionality
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incrementing_index() {
        let mut idx = IncrIndex::default();
        assert_eq!(0, idx.next());
        assert_eq!(1, idx.next());
        assert_eq!(2, idx.next());
    }
}
