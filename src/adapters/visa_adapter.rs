//! VISA session adapter for GPIB/USB/Ethernet instruments
//!
//! Wraps the `visa-rs` crate. The 2600 series accepts TSP over any VISA
//! interface, so the same adapter covers GPIB, USB-TMC and LXI.
//!
//! Supports resource strings like:
//! - "GPIB0::26::INSTR" (GPIB interface)
//! - "USB0::0x05E6::0x2636::4123456::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)

use super::{Connector, Session, TransportError};
use std::ffi::CString;
use std::io::{self, BufRead, BufReader, Write};
use std::time::Duration;
use visa_rs::enums::status::ErrorCode;
use visa_rs::flags::AccessMode;
use visa_rs::{DefaultRM, Instrument};

/// Opens [`VisaSession`]s through the default VISA resource manager.
#[derive(Debug, Clone)]
pub struct VisaConnector {
    /// Read/write timeout
    pub(crate) timeout: Duration,

    /// Line terminator for commands (typically "\n" for TSP)
    pub(crate) line_terminator: String,
}

impl VisaConnector {
    /// Create a connector with default settings (5 s timeout, `\n` terminator).
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            line_terminator: "\n".to_string(),
        }
    }

    /// Set open and I/O timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }
}

impl Default for VisaConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for VisaConnector {
    type Session = VisaSession;

    fn open(&self, resource: &str) -> Result<VisaSession, TransportError> {
        let rm = DefaultRM::new().map_err(from_visa)?;
        let name = CString::new(resource)
            .map_err(|e| TransportError::Io(format!("invalid resource string: {e}")))?;
        let instr = rm
            .open(&name.into(), AccessMode::NO_LOCK, self.timeout)
            .map_err(from_visa)?;

        tracing::debug!(resource, timeout_ms = self.timeout.as_millis() as u64, "VISA session opened");

        Ok(VisaSession {
            resource: resource.to_string(),
            line_terminator: self.line_terminator.clone(),
            _rm: rm,
            instr,
        })
    }
}

/// An open VISA instrument session.
pub struct VisaSession {
    resource: String,
    line_terminator: String,
    // Sessions are invalidated when their resource manager closes.
    _rm: DefaultRM,
    instr: Instrument,
}

impl VisaSession {
    /// Resource string this session was opened with.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn send(&self, command: &str) -> Result<(), TransportError> {
        let mut line = String::with_capacity(command.len() + self.line_terminator.len());
        line.push_str(command);
        line.push_str(&self.line_terminator);
        (&self.instr)
            .write_all(line.as_bytes())
            .map_err(from_io)
    }
}

impl Session for VisaSession {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.send(command)
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.send(command)?;
        let mut reply = String::new();
        BufReader::new(&self.instr)
            .read_line(&mut reply)
            .map_err(from_io)?;
        Ok(reply.trim().to_string())
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        self.instr.clear().map_err(from_visa)
    }

    fn close(self) -> Result<(), TransportError> {
        tracing::debug!(resource = %self.resource, "VISA session closed");
        // viClose runs when the instrument handle drops.
        drop(self.instr);
        Ok(())
    }
}

fn from_visa(err: visa_rs::Error) -> TransportError {
    if err.0 == ErrorCode::ErrorTmo {
        TransportError::Timeout
    } else {
        TransportError::Io(err.to_string())
    }
}

fn from_io(err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::TimedOut {
        return TransportError::Timeout;
    }
    match err.get_ref().and_then(|e| e.downcast_ref::<visa_rs::Error>()) {
        Some(inner) if inner.0 == ErrorCode::ErrorTmo => TransportError::Timeout,
        _ => TransportError::Io(err.to_string()),
    }
}
