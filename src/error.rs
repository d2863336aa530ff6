//! Custom error types for the driver.
//!
//! This module defines the primary error type, `SmuError`, for the whole crate.
//! Using the `thiserror` crate, it provides a single place to describe everything
//! that can go wrong between opening a VISA session and finishing a probe-card run.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: the session could not be opened or did not answer `*IDN?`.
//!   Fatal; the driver is never constructed.
//! - **`InvalidParameter`**: a channel, quantity, or output state given as text is
//!   outside its closed set. Raised while parsing, before any I/O happens.
//! - **`Timeout`** / **`Io`**: transport failures on a write or query that is not
//!   allowed to swallow them.
//! - **`Parse`**: the instrument answered, but not with a number.
//! - **`ReadbackMismatch`**: a programmed setting did not read back identically.
//! - **`Config`** / **`Validation`**: loading or validating the configuration.
//!
//! Device-reported errors (the event-status register) have no variant here:
//! they are logged by [`crate::driver::K2600::check_for_error`] and never raised.

use crate::adapters::TransportError;
use crate::smu::Channel;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type SmuResult<T> = std::result::Result<T, SmuError>;

/// Every failure the driver, sequencer and configuration can report.
#[derive(Error, Debug)]
pub enum SmuError {
    /// Opening the resource or the `*IDN?` handshake failed.
    #[error("Error initializing connection to '{resource}', check the resource string: {source}")]
    Connection {
        /// Resource string that was opened.
        resource: String,
        /// Underlying session failure.
        #[source]
        source: TransportError,
    },

    /// Text outside a closed parameter set.
    #[error("Invalid {kind} '{value}'")]
    InvalidParameter {
        /// Parameter kind, e.g. `channel`.
        kind: &'static str,
        /// Rejected text.
        value: String,
    },

    /// The command did not complete in time.
    #[error("Timeout expired before operation completed: {0}")]
    Timeout(String),

    /// Any other session failure.
    #[error("I/O error during '{command}': {message}")]
    Io {
        /// Command being sent.
        command: String,
        /// Session error text.
        message: String,
    },

    /// The reply could not be parsed as a number.
    #[error("Reply to '{command}' is not a number: '{reply}'")]
    Parse {
        /// Query that produced the reply.
        command: String,
        /// Raw reply.
        reply: String,
    },

    /// A programmed setting read back differently.
    #[error("Read-back mismatch on channel {channel} {setting}: programmed {requested}, instrument reports {actual}")]
    ReadbackMismatch {
        /// Channel the setting belongs to.
        channel: Channel,
        /// Setting name, e.g. `source level`.
        setting: &'static str,
        /// Programmed value.
        requested: f64,
        /// Value the instrument reported.
        actual: f64,
    },

    /// Loading the configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// A loaded configuration value is out of range.
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl SmuError {
    /// Attach the failing command to a transport error.
    pub(crate) fn from_transport(command: &str, err: TransportError) -> Self {
        match err {
            TransportError::Timeout => SmuError::Timeout(command.to_string()),
            TransportError::Io(message) => SmuError::Io {
                command: command.to_string(),
                message,
            },
        }
    }

    /// True for timeouts, the only transport failure some reads swallow.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SmuError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_timeout_maps_to_timeout() {
        let err = SmuError::from_transport("print(reading)", TransportError::Timeout);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("print(reading)"));
    }

    #[test]
    fn test_transport_io_keeps_message() {
        let err = SmuError::from_transport("*RST", TransportError::Io("bus error".into()));
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "I/O error during '*RST': bus error");
    }

    #[test]
    fn test_readback_mismatch_message() {
        let err = SmuError::ReadbackMismatch {
            channel: Channel::A,
            setting: "source level",
            requested: 5.0,
            actual: 4.9,
        };
        assert_eq!(
            err.to_string(),
            "Read-back mismatch on channel a source level: programmed 5, instrument reports 4.9"
        );
    }
}
