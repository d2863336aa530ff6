//! Closed parameter sets of the 2600-series source-measure units.
//!
//! Every value here renders to the exact token the instrument's TSP interpreter
//! expects (`a`, `v`, `ON`, `OUTPUT_DCVOLTS`, ...). Text coming from the CLI or a
//! config file goes through [`FromStr`], which is the only place a bad value can
//! show up; it fails with [`SmuError::InvalidParameter`] before any I/O.

use crate::error::SmuError;
use std::fmt;
use std::str::FromStr;

/// One of the two SMUs of a dual-channel 26xx (`smua` / `smub`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `smua`, the AVDD rail on the probe card.
    A,
    /// `smub`, the VDD rail on the probe card.
    B,
}

impl Channel {
    /// Both channels in wire order.
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    /// Token used inside `smu{channel}`.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::A => "a",
            Channel::B => "b",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = SmuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(Channel::A),
            "b" => Ok(Channel::B),
            other => Err(SmuError::InvalidParameter {
                kind: "channel",
                value: other.to_string(),
            }),
        }
    }
}

/// Source or measure function selector (`v` / `i`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Voltage (`v`).
    Voltage,
    /// Current (`i`).
    Current,
}

impl Quantity {
    /// Suffix used in `source.level{type}`, `measure.{type}()` and friends.
    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::Voltage => "v",
            Quantity::Current => "i",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantity {
    type Err = SmuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v" => Ok(Quantity::Voltage),
            "i" => Ok(Quantity::Current),
            other => Err(SmuError::InvalidParameter {
                kind: "source/measure type",
                value: other.to_string(),
            }),
        }
    }
}

/// State of a channel's output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputState {
    /// `OUTPUT_ON`
    On,
    /// `OUTPUT_OFF`
    Off,
}

impl OutputState {
    /// Upper-case token appended to `OUTPUT_`.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputState::On => "ON",
            OutputState::Off => "OFF",
        }
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputState {
    type Err = SmuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(OutputState::On),
            "OFF" => Ok(OutputState::Off),
            other => Err(SmuError::InvalidParameter {
                kind: "output state",
                value: other.to_string(),
            }),
        }
    }
}

/// What the channel sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFunction {
    /// `OUTPUT_DCVOLTS`
    DcVolts,
    /// `OUTPUT_DCAMPS`
    DcAmps,
}

impl SourceFunction {
    /// Constant name on the `smuX` table.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFunction::DcVolts => "OUTPUT_DCVOLTS",
            SourceFunction::DcAmps => "OUTPUT_DCAMPS",
        }
    }
}

impl fmt::Display for SourceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
