//! # Keithley 2600 probe-card library
//!
//! Drives a Keithley 2600-series source-measure unit over a request/response
//! session and runs a fixed acceptance test on a probe card powered by the two
//! SMU channels.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: the [`adapters::Session`] / [`adapters::Connector`] seam, a
//!   VISA-backed adapter (feature `instrument_visa`) and an in-process simulator.
//! - **`command`**: TSP command templates, one function per instrument command.
//! - **`driver`**: [`K2600`], the typed command layer over one open session.
//! - **`probecard`**: [`ProbeCard`], the AVDD/VDD test sequence built on the driver.
//! - **`smu`**: channel, quantity, output-state and source-function enums.
//! - **`status`**: decoding of the standard event status register.
//! - **`config`**: layered configuration (defaults, TOML file, environment).
//! - **`logging`**: `tracing-subscriber` setup for binaries.
//! - **`error`**: [`SmuError`], the error type of every fallible operation.
//!
//! ## Example
//!
//! ```
//! use k2600_probecard::adapters::SimulatedSmu;
//! use k2600_probecard::smu::{Channel, Quantity};
//! use k2600_probecard::K2600;
//!
//! let mut smu = K2600::open(SimulatedSmu::new())?;
//! let limit = smu.read_source_limit(Channel::A, Quantity::Current)?;
//! assert_eq!(limit, 0.0);
//! # Ok::<(), k2600_probecard::SmuError>(())
//! ```

pub mod adapters;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod probecard;
pub mod smu;
pub mod status;

pub use driver::{Reading, K2600};
pub use error::{SmuError, SmuResult};
pub use probecard::{ProbeCard, ProbeCardParams, ProbeCardReport};
pub use smu::{Channel, OutputState, Quantity, SourceFunction};
pub use status::{EventStatus, StatusCheck, StatusError};
