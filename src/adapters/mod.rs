//! Session adapters between the driver and an instrument.
//!
//! The driver only needs a strict request/response channel: write a command,
//! query a command and read one reply line, clear the device, close. [`Session`]
//! captures exactly that. Adapters:
//!
//! - [`visa_adapter`]: real hardware through a VISA library (`instrument_visa`).
//! - [`sim_adapter`]: an in-process 26xx that understands the TSP subset the
//!   driver emits. Used by the test-suite and the CLI's `--simulate` mode.
//!
//! Sessions are not shareable: every method takes `&mut self`, so one session
//! serves one caller at a time, which is what the instrument protocol allows.

use thiserror::Error;

pub mod sim_adapter;
pub use sim_adapter::{SimulatedConnector, SimulatedSmu};

#[cfg(feature = "instrument_visa")]
pub mod visa_adapter;
#[cfg(feature = "instrument_visa")]
pub use visa_adapter::{VisaConnector, VisaSession};

/// Failure reported by a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The operation did not complete before the session timeout.
    #[error("timeout expired before operation completed")]
    Timeout,

    /// Any other I/O or library failure.
    #[error("{0}")]
    Io(String),
}

/// An open request/response channel to one instrument.
pub trait Session {
    /// Send a command, no reply expected.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Send a command and return the reply with the line terminator stripped.
    fn query(&mut self, command: &str) -> Result<String, TransportError>;

    /// Device clear: abort pending I/O and flush the instrument's buffers.
    fn clear(&mut self) -> Result<(), TransportError>;

    /// Close the session and release the resource.
    fn close(self) -> Result<(), TransportError>
    where
        Self: Sized;
}

/// Opens sessions from a resource string such as `GPIB0::26::INSTR`.
pub trait Connector {
    /// Session type produced by this connector.
    type Session: Session;

    /// Open `resource`.
    fn open(&self, resource: &str) -> Result<Self::Session, TransportError>;
}
