//! Resource discovery: find a Keithley 2000 on the bus.
//!
//! Enumerates candidate addresses, opens each briefly, asks for an identification, and
//! reports the meters that answered. The same physical meter can be reachable through
//! more than one bus path; candidates are therefore checked simplest-address-first and
//! deduplicated on the full identification string, so the simplest alias wins.

use std::{collections::HashSet, fmt::Display, time::Duration};

use dmmrs::{Connection, DmmError, SerialTransport, Transport};
use serialport::SerialPort;

/// Parsed identification reply of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Manufacturer token, e.g. `KEITHLEY INSTRUMENTS INC.`.
    pub manufacturer: String,
    /// Model token, e.g. `MODEL 2000`.
    pub model: String,
    /// Serial number, if the instrument reported one.
    pub serial: String,
    /// Firmware version, if the instrument reported one.
    pub version: String,
}

impl Identity {
    /// Parse a comma-separated identification reply.
    ///
    /// Expects at least manufacturer and model; serial and version may be missing on
    /// older firmware and default to empty.
    pub fn from_reply(reply: &str) -> Result<Self, DmmError> {
        let mut parts = reply.split(',').map(str::trim);
        let manufacturer = parts.next().unwrap_or_default();
        let model = parts
            .next()
            .ok_or_else(|| DmmError::ResponseParse(reply.to_string()))?;
        if manufacturer.is_empty() || model.is_empty() {
            return Err(DmmError::ResponseParse(reply.to_string()));
        }
        Ok(Identity {
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            serial: parts.next().unwrap_or_default().to_string(),
            version: parts.next().unwrap_or_default().to_string(),
        })
    }

    /// Whether this identity belongs to the Keithley 2000 family.
    pub fn is_keithley_2000(&self) -> bool {
        self.manufacturer.to_uppercase().contains("KEITHLEY")
            && self.model.to_uppercase().contains("2000")
    }
}

/// One discovered candidate: the address it was reached under and, when verified, the
/// identity it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredMeter {
    /// The bus address the meter answered on.
    pub address: String,
    /// The parsed identification, `None` for an unverified scan.
    pub identity: Option<Identity>,
}

impl Display for DiscoveredMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.identity {
            Some(identity) => write!(f, "{} - {}", self.address, identity.model),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Source of candidate addresses and the links to reach them.
///
/// The serial backend is one implementation; tests drive the scan with scripted
/// loopback links.
pub trait CandidateOpener {
    /// The transport type this opener hands out.
    type Link: Transport;

    /// Enumerate the raw candidate addresses.
    ///
    /// A failure here is a total enumeration failure (e.g., the bus driver is absent)
    /// and aborts the whole scan.
    fn list_addresses(&self) -> Result<Vec<String>, DmmError>;

    /// Open one candidate address with a short timeout.
    fn open(&self, address: &str, timeout: Duration) -> Result<Self::Link, DmmError>;
}

/// Candidate source backed by the system's serial ports.
#[derive(Debug)]
pub struct SerialOpener {
    /// Baud rate used to probe each port.
    pub baud_rate: u32,
}

impl Default for SerialOpener {
    fn default() -> Self {
        SerialOpener { baud_rate: 9600 }
    }
}

impl CandidateOpener for SerialOpener {
    type Link = Connection<Box<dyn SerialPort>>;

    fn list_addresses(&self) -> Result<Vec<String>, DmmError> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, address: &str, timeout: Duration) -> Result<Self::Link, DmmError> {
        SerialTransport::full(serialport::new(address, self.baud_rate).timeout(timeout))
    }
}

/// Structural complexity of an address: the number of `::` separated segments beyond
/// the first. A plain alias like `GPIB0::16::INSTR` sorts before the equivalent
/// `GPIB0::16::0::INSTR`; serial port names all sort equal.
fn address_complexity(address: &str) -> usize {
    address.matches("::").count()
}

/// Scan the bus for compatible meters.
///
/// When `verify` is false the raw enumerated addresses are returned unprobed. Otherwise
/// each candidate is opened with `timeout`, identified with `*IDN?`, and parsed;
/// candidates that fail to open, fail to answer in time, or answer garbage are skipped
/// (logged, never surfaced; one dead address must not kill the scan). Candidates are
/// probed in order of ascending address complexity and deduplicated on the full
/// identification string, so of several aliases for the same physical meter only the
/// simplest one is reported. With `filter_to_family`, only Keithley 2000 family meters
/// are kept.
///
/// # Arguments
/// * `opener` - The candidate source to scan.
/// * `verify` - Whether to probe each candidate for an identification.
/// * `timeout` - Per-candidate open/query timeout.
/// * `filter_to_family` - Keep only Keithley 2000 family instruments.
pub fn list_candidates<O: CandidateOpener>(
    opener: &O,
    verify: bool,
    timeout: Duration,
    filter_to_family: bool,
) -> Result<Vec<DiscoveredMeter>, DmmError> {
    let mut addresses = opener.list_addresses()?;

    if !verify {
        return Ok(addresses
            .into_iter()
            .map(|address| DiscoveredMeter {
                address,
                identity: None,
            })
            .collect());
    }

    addresses.sort_by_key(|a| address_complexity(a));

    let mut seen_identities: HashSet<String> = HashSet::new();
    let mut found = Vec::new();

    for address in addresses {
        let mut link = match opener.open(&address, timeout) {
            Ok(link) => link,
            Err(e) => {
                log::debug!("Skipping {address}: failed to open: {e}");
                continue;
            }
        };
        let reply = match link.query("*IDN?") {
            Ok(reply) => reply,
            Err(e) => {
                log::debug!("Skipping {address}: no identification: {e}");
                continue;
            }
        };
        if !seen_identities.insert(reply.clone()) {
            log::debug!("Skipping {address}: same instrument already found");
            continue;
        }
        let identity = match Identity::from_reply(&reply) {
            Ok(identity) => identity,
            Err(_) => {
                log::debug!("Skipping {address}: unparseable identification: {reply}");
                continue;
            }
        };
        if filter_to_family && !identity.is_keithley_2000() {
            continue;
        }
        found.push(DiscoveredMeter {
            address,
            identity: Some(identity),
        });
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_complexity() {
        assert_eq!(address_complexity("/dev/ttyUSB0"), 0);
        assert_eq!(address_complexity("GPIB0::16::INSTR"), 2);
        assert_eq!(address_complexity("GPIB0::16::0::INSTR"), 3);
    }

    #[test]
    fn test_identity_from_reply() {
        let identity =
            Identity::from_reply("KEITHLEY INSTRUMENTS INC.,MODEL 2000,1234567,A20").unwrap();
        assert_eq!(identity.manufacturer, "KEITHLEY INSTRUMENTS INC.");
        assert_eq!(identity.model, "MODEL 2000");
        assert_eq!(identity.serial, "1234567");
        assert_eq!(identity.version, "A20");
        assert!(identity.is_keithley_2000());
    }

    #[test]
    fn test_identity_from_reply_short() {
        let identity = Identity::from_reply("ACME,MODEL 9").unwrap();
        assert_eq!(identity.serial, "");
        assert!(!identity.is_keithley_2000());
    }

    #[test]
    fn test_identity_from_reply_garbage() {
        assert!(Identity::from_reply("hello there").is_err());
        assert!(Identity::from_reply(",").is_err());
    }
}
