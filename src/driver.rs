//! Keithley 2600-series command layer.
//!
//! [`K2600`] owns one open [`Session`] and turns typed requests into TSP command
//! strings (see [`crate::command`]). Parameters are closed enums, so there is no
//! way to reach the wire with an invalid channel or quantity.
//!
//! ## Reads
//!
//! `read_source_*` and [`K2600::measure`] take two round trips each: a write
//! that stores the value in an instrument-side variable, then a `print(...)`
//! query whose reply is parsed as `f64`.
//!
//! ## Timeouts
//!
//! Most operations surface a timeout as [`SmuError::Timeout`]. Two are
//! observational and never fail on a timeout: [`K2600::measure`] returns
//! [`Reading::TimedOut`] and [`K2600::check_for_error`] returns
//! [`StatusCheck::TimedOut`].
//!
//! ## Logging
//!
//! Every event is emitted inside the span the driver was built with, so the
//! caller decides where driver logs go and how they are labelled.

use crate::adapters::{Connector, Session};
use crate::command::{self, ReadCommand};
use crate::error::{SmuError, SmuResult};
use crate::smu::{Channel, OutputState, Quantity, SourceFunction};
use crate::status::{EventStatus, StatusCheck};
use tracing::{debug, error, info, warn, Span};

/// Result of a measurement that may have timed out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Parsed reply.
    Value(f64),
    /// The instrument did not answer in time.
    TimedOut,
}

impl Reading {
    /// The measured value, if any.
    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::TimedOut => None,
        }
    }

    /// `value >= threshold`. A timed-out reading never passes.
    pub fn at_least(self, threshold: f64) -> bool {
        matches!(self, Reading::Value(v) if v >= threshold)
    }
}

/// Driver for a dual-channel 2600-series SourceMeter.
pub struct K2600<S: Session> {
    session: S,
    identity: String,
    span: Span,
}

impl<S: Session> K2600<S> {
    /// Take over an open session: identify the instrument, then clear the session.
    ///
    /// # Errors
    /// [`SmuError::Connection`] if `*IDN?` fails.
    pub fn open(session: S) -> SmuResult<Self> {
        Self::open_with_span(session, "session", tracing::info_span!("k2600"))
    }

    /// Like [`K2600::open`], logging into `span`. `resource` only labels errors.
    pub fn open_with_span(mut session: S, resource: &str, span: Span) -> SmuResult<Self> {
        let identity = {
            let _enter = span.enter();
            match session.query(command::IDENTIFY) {
                Ok(idn) => {
                    info!("{}", idn);
                    idn
                }
                Err(source) => {
                    error!("Error initializing connection, check input string");
                    return Err(SmuError::Connection {
                        resource: resource.to_string(),
                        source,
                    });
                }
            }
        };

        let mut driver = Self {
            session,
            identity,
            span,
        };
        driver.clear_connection()?;
        Ok(driver)
    }

    /// `*IDN?` reply captured when the session was opened.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Span all driver events are recorded in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The underlying session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Mutable access to the underlying session, for raw commands.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Close the session and consume the driver.
    pub fn close_connection(self) -> SmuResult<()> {
        let _enter = self.span.enter();
        debug!("closing session");
        self.session
            .close()
            .map_err(|e| SmuError::from_transport("close", e))
    }

    /// Device clear on the session.
    pub fn clear_connection(&mut self) -> SmuResult<()> {
        let _enter = self.span.enter();
        debug!("device clear");
        self.session
            .clear()
            .map_err(|e| SmuError::from_transport("clear", e))
    }

    /// Returns the SourceMeter to default conditions (`*RST`).
    pub fn reset_source_meter(&mut self) -> SmuResult<()> {
        self.write(command::RESET)
    }

    /// Reset one channel to its defaults (`smuX.reset()`).
    pub fn reset_channel(&mut self, channel: Channel) -> SmuResult<()> {
        self.write(&command::channel_reset(channel))
    }

    /// Source DC volts or DC amps.
    pub fn set_source_function(
        &mut self,
        channel: Channel,
        function: SourceFunction,
    ) -> SmuResult<()> {
        self.write(&command::source_function(channel, function))
    }

    /// Source range of `quantity`.
    pub fn set_source_range(
        &mut self,
        channel: Channel,
        quantity: Quantity,
        value: f64,
    ) -> SmuResult<()> {
        self.write(&command::source_range(channel, quantity, value))
    }

    /// Source level of `quantity`.
    pub fn set_source_level(
        &mut self,
        channel: Channel,
        quantity: Quantity,
        value: f64,
    ) -> SmuResult<()> {
        self.write(&command::source_level(channel, quantity, value))
    }

    /// Compliance limit. For a voltage source this is a current limit (`Quantity::Current`).
    pub fn set_source_limit(
        &mut self,
        channel: Channel,
        quantity: Quantity,
        value: f64,
    ) -> SmuResult<()> {
        self.write(&command::source_limit(channel, quantity, value))
    }

    /// Measure range of `quantity`.
    pub fn set_measure_range(
        &mut self,
        channel: Channel,
        quantity: Quantity,
        value: f64,
    ) -> SmuResult<()> {
        self.write(&command::measure_range(channel, quantity, value))
    }

    /// Energize or de-energize the channel's output stage.
    pub fn set_source_output(&mut self, channel: Channel, state: OutputState) -> SmuResult<()> {
        self.write(&command::source_output(channel, state))
    }

    /// Read back the compliance limit.
    pub fn read_source_limit(&mut self, channel: Channel, quantity: Quantity) -> SmuResult<f64> {
        self.read(&command::read_source_limit(channel, quantity))
    }

    /// Reads `measure.range{type}`; see [`command::read_source_range`].
    pub fn read_source_range(&mut self, channel: Channel, quantity: Quantity) -> SmuResult<f64> {
        self.read(&command::read_source_range(channel, quantity))
    }

    /// Read back the programmed source level.
    pub fn read_source_level(&mut self, channel: Channel, quantity: Quantity) -> SmuResult<f64> {
        self.read(&command::read_source_level(channel, quantity))
    }

    /// Trigger a measurement and read it back.
    ///
    /// A timeout on either round trip is logged and returned as
    /// [`Reading::TimedOut`]; any other failure is an error.
    pub fn measure(&mut self, channel: Channel, quantity: Quantity) -> SmuResult<Reading> {
        match self.read(&command::measure(channel, quantity)) {
            Ok(value) => Ok(Reading::Value(value)),
            Err(e) if e.is_timeout() => {
                let _enter = self.span.enter();
                error!(%channel, %quantity, "Impossible to read, time out occurred in measure reading");
                Ok(Reading::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    /// Clear the event registers and error queue (`*CLS`).
    pub fn clear_error_queue(&mut self) -> SmuResult<()> {
        self.write(command::CLEAR_STATUS)
    }

    /// Query `*ESR?`, mask the power-on and operation-complete bits, and log
    /// every error class that remains set.
    ///
    /// Device errors are only reported, never returned as `Err`. A timed-out or
    /// unparseable reply is logged and folded into the returned [`StatusCheck`].
    pub fn check_for_error(&mut self) -> SmuResult<StatusCheck> {
        let reply = match self.query(command::EVENT_STATUS_QUERY) {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => {
                let _enter = self.span.enter();
                error!("Timeout expired before operation completed while reading *ESR?");
                return Ok(StatusCheck::TimedOut);
            }
            Err(e) => return Err(e),
        };

        let _enter = self.span.enter();
        let raw = match reply.trim().parse::<u32>() {
            Ok(raw) => raw,
            Err(_) => {
                error!(
                    reply = %reply,
                    "The output queue returned data not related to the '*ESR?' command"
                );
                return Ok(StatusCheck::Unreadable(reply));
            }
        };

        let status = EventStatus::from_register(raw);
        if status.is_clean() {
            info!("No error in keithley operation.");
        } else {
            for err in status.errors() {
                warn!(register = status.bits(), "{} detected", err);
            }
        }
        Ok(StatusCheck::Status(status))
    }

    fn write(&mut self, cmd: &str) -> SmuResult<()> {
        let _enter = self.span.enter();
        debug!(command = cmd, "write");
        self.session
            .write(cmd)
            .map_err(|e| SmuError::from_transport(cmd, e))
    }

    fn query(&mut self, cmd: &str) -> SmuResult<String> {
        let _enter = self.span.enter();
        let reply = self
            .session
            .query(cmd)
            .map_err(|e| SmuError::from_transport(cmd, e))?;
        debug!(command = cmd, reply = %reply, "query");
        Ok(reply)
    }

    fn read(&mut self, read: &ReadCommand) -> SmuResult<f64> {
        self.write(&read.store)?;
        let reply = self.query(read.print)?;
        reply.trim().parse::<f64>().map_err(|_| SmuError::Parse {
            command: read.print.to_string(),
            reply,
        })
    }
}

impl<S: Session> K2600<S> {
    /// Open `resource` through `connector` and identify the instrument.
    ///
    /// # Errors
    /// [`SmuError::Connection`] if the resource cannot be opened or does not
    /// answer `*IDN?`.
    pub fn connect<C>(connector: &C, resource: &str) -> SmuResult<Self>
    where
        C: Connector<Session = S>,
    {
        let span = tracing::info_span!("k2600", resource = %resource);
        let session = {
            let _enter = span.enter();
            connector.open(resource).map_err(|source| {
                error!(error = %source, "Error initializing connection, check input string");
                SmuError::Connection {
                    resource: resource.to_string(),
                    source,
                }
            })?
        };
        Self::open_with_span(session, resource, span)
    }
}
