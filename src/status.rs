//! Standard event-status register decoding.
//!
//! `*ESR?` returns the IEEE-488.2 event-status byte. Bit 0 (operation complete)
//! and bit 7 (power-on) are informational and are masked off; each of bits 2..=6
//! marks a distinct error class. Several classes can be set at once and all of
//! them are reported.

use std::fmt;

const OPERATION_COMPLETE: u32 = 1 << 0;
const POWER_ON: u32 = 1 << 7;

/// Error classes of the event-status register, highest bit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusError {
    /// Bit 6, URQ.
    UserRequest,
    /// Bit 5, CME.
    Command,
    /// Bit 4, EXE.
    Execution,
    /// Bit 3, DDE.
    DeviceDependent,
    /// Bit 2, QYE.
    Query,
}

impl StatusError {
    /// Decode order, matching the bit layout from high to low.
    pub const ALL: [StatusError; 5] = [
        StatusError::UserRequest,
        StatusError::Command,
        StatusError::Execution,
        StatusError::DeviceDependent,
        StatusError::Query,
    ];

    /// Bit index in the register.
    pub fn bit(self) -> u32 {
        match self {
            StatusError::UserRequest => 6,
            StatusError::Command => 5,
            StatusError::Execution => 4,
            StatusError::DeviceDependent => 3,
            StatusError::Query => 2,
        }
    }

    /// Single-bit mask of this class.
    pub fn mask(self) -> u32 {
        1 << self.bit()
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusError::UserRequest => "User request",
            StatusError::Command => "Command",
            StatusError::Execution => "Execution",
            StatusError::DeviceDependent => "Device-Dependent",
            StatusError::Query => "Query",
        };
        write!(f, "{name} error")
    }
}

/// Event-status register with the informational bits already cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventStatus(u32);

impl EventStatus {
    /// Masks off the power-on and operation-complete bits of a raw register value.
    pub fn from_register(raw: u32) -> Self {
        Self(raw & !(POWER_ON | OPERATION_COMPLETE))
    }

    /// Masked register value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// No bit left after masking.
    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    /// Every error class whose bit is set, highest bit first.
    pub fn errors(self) -> Vec<StatusError> {
        StatusError::ALL
            .into_iter()
            .filter(|e| self.0 & e.mask() != 0)
            .collect()
    }

    /// True if the bit of `error` is set.
    pub fn contains(self, error: StatusError) -> bool {
        self.0 & error.mask() != 0
    }
}

/// Outcome of [`crate::driver::K2600::check_for_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    /// The register was read; it may or may not flag errors.
    Status(EventStatus),
    /// `*ESR?` timed out.
    TimedOut,
    /// The reply was not an integer, usually stale data left in the output queue.
    Unreadable(String),
}

impl StatusCheck {
    /// Integer form: the masked register, or `-1` when it could not be read.
    pub fn code(&self) -> i64 {
        match self {
            StatusCheck::Status(status) => i64::from(status.bits()),
            StatusCheck::TimedOut | StatusCheck::Unreadable(_) => -1,
        }
    }

    /// The register was read and no error bit is set.
    pub fn is_clean(&self) -> bool {
        matches!(self, StatusCheck::Status(status) if status.is_clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_and_opc_are_masked() {
        let status = EventStatus::from_register(0b1100_0001);
        assert_eq!(status.bits(), 0b0100_0000);
        assert_eq!(status.errors(), vec![StatusError::UserRequest]);
    }

    #[test]
    fn test_informational_bits_only_is_clean() {
        assert!(EventStatus::from_register(0b1000_0001).is_clean());
        assert!(EventStatus::from_register(0).is_clean());
    }

    #[test]
    fn test_every_set_bit_is_reported() {
        let status = EventStatus::from_register(0b0011_1100);
        assert_eq!(
            status.errors(),
            vec![
                StatusError::Command,
                StatusError::Execution,
                StatusError::DeviceDependent,
                StatusError::Query,
            ]
        );
        assert!(!status.contains(StatusError::UserRequest));
    }

    #[test]
    fn test_bit_one_is_not_an_error_class() {
        // Bit 1 (request control) survives masking but maps to no category.
        let status = EventStatus::from_register(0b0000_0010);
        assert!(!status.is_clean());
        assert!(status.errors().is_empty());
    }

    #[test]
    fn test_status_check_code() {
        assert_eq!(
            StatusCheck::Status(EventStatus::from_register(0b1010_0000)).code(),
            0b0010_0000
        );
        assert_eq!(StatusCheck::TimedOut.code(), -1);
        assert_eq!(StatusCheck::Unreadable("1.5".into()).code(), -1);
        assert!(StatusCheck::Status(EventStatus::default()).is_clean());
        assert!(!StatusCheck::TimedOut.is_clean());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusError::DeviceDependent.to_string(), "Device-Dependent error");
        assert_eq!(StatusError::UserRequest.to_string(), "User request error");
    }
}
