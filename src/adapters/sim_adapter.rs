//! Simulated 2600-series session
//!
//! This adapter implements [`Session`] for running the driver and the probe-card
//! sequence without physical hardware. It provides:
//! - A tiny interpreter for the TSP the driver emits (attribute assignments,
//!   global variables, `print`, `smuX.reset()`, `smuX.measure.v()/i()`)
//! - The IEEE-488.2 common commands the driver uses (`*IDN?`, `*RST`, `*CLS`, `*ESR?`)
//! - Fault injection: pinned read-backs, canned replies, timeouts
//! - Call logging for test verification
//!
//! Anything outside that subset sets the command-error bit (5) of the
//! event-status register, as the instrument does; an unknown query also gets
//! no reply and times out.

use super::{Connector, Session, TransportError};
use crate::smu::{Channel, Quantity};
use std::collections::HashMap;

const DEFAULT_IDENTITY: &str = "Keithley Instruments Inc., Model 2636B, 4417263, 4.0.4";
const COMMAND_ERROR: u32 = 1 << 5;

/// One operation seen by the simulator, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `Session::write`
    Write(String),
    /// `Session::query`
    Query(String),
    /// `Session::clear`
    Clear,
    /// `Session::close`
    Close,
}

/// In-process stand-in for a dual-channel 26xx.
///
/// # Example
///
/// ```
/// use k2600_probecard::adapters::{Session, SimulatedSmu};
///
/// let mut smu = SimulatedSmu::new();
/// smu.write("smua.source.levelv = 1.8").unwrap();
/// smu.write("level = smua.source.levelv").unwrap();
/// assert_eq!(smu.query("print(level)").unwrap(), "1.8e+00");
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedSmu {
    identity: String,
    attributes: HashMap<String, f64>,
    globals: HashMap<String, f64>,
    pinned: HashMap<String, f64>,
    measurements: HashMap<(Channel, Quantity), f64>,
    canned: HashMap<String, String>,
    timeout_patterns: Vec<String>,
    event_status: u32,
    call_log: Vec<Call>,
}

impl SimulatedSmu {
    /// Create a simulator in its power-on state.
    pub fn new() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            attributes: HashMap::new(),
            globals: HashMap::new(),
            pinned: HashMap::new(),
            measurements: HashMap::new(),
            canned: HashMap::new(),
            timeout_patterns: Vec::new(),
            event_status: 0,
            call_log: Vec::new(),
        }
    }

    /// Reply to `*IDN?`.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Fix what `smuX.measure.{v,i}()` returns for one channel.
    ///
    /// Without an override, voltage reads back the programmed level while the
    /// output is on and 0 otherwise; current reads 0.
    pub fn with_measurement(mut self, channel: Channel, quantity: Quantity, value: f64) -> Self {
        self.measurements.insert((channel, quantity), value);
        self
    }

    /// Pin an attribute (e.g. `smua.source.levelv`) to a value. Writes to it are
    /// accepted and ignored, so it reads back differently from what was programmed.
    pub fn pin(mut self, attribute: impl Into<String>, value: f64) -> Self {
        self.pinned.insert(attribute.into(), value);
        self
    }

    /// Answer `command` with `reply` instead of interpreting it.
    pub fn with_reply(mut self, command: impl Into<String>, reply: impl Into<String>) -> Self {
        self.canned.insert(command.into(), reply.into());
        self
    }

    /// Every operation whose command contains `pattern` times out.
    pub fn timeout_on(mut self, pattern: impl Into<String>) -> Self {
        self.timeout_patterns.push(pattern.into());
        self
    }

    /// Preload the raw event-status register.
    pub fn with_event_status(mut self, raw: u32) -> Self {
        self.event_status = raw;
        self
    }

    /// Set event-status bits, as the instrument would on an error.
    pub fn raise_event(&mut self, bits: u32) {
        self.event_status |= bits;
    }

    /// Call log for verification
    pub fn calls(&self) -> &[Call] {
        &self.call_log
    }

    /// Only the commands sent with `write`.
    pub fn writes(&self) -> Vec<&str> {
        self.call_log
            .iter()
            .filter_map(|c| match c {
                Call::Write(cmd) => Some(cmd.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Only the commands sent with `query`.
    pub fn queries(&self) -> Vec<&str> {
        self.call_log
            .iter()
            .filter_map(|c| match c {
                Call::Query(cmd) => Some(cmd.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Clear the call log
    pub fn clear_call_log(&mut self) {
        self.call_log.clear();
    }

    /// Current value of an attribute, pins included.
    pub fn attribute(&self, path: &str) -> Option<f64> {
        self.pinned
            .get(path)
            .or_else(|| self.attributes.get(path))
            .copied()
    }

    /// True while the channel's output stage is on.
    pub fn output_on(&self, channel: Channel) -> bool {
        self.attribute(&format!("smu{channel}.source.output")) == Some(1.0)
    }

    /// Raw event-status register.
    pub fn event_status(&self) -> u32 {
        self.event_status
    }

    fn times_out(&self, command: &str) -> bool {
        self.timeout_patterns.iter().any(|p| command.contains(p.as_str()))
    }

    fn command_error(&mut self, command: &str) {
        tracing::debug!(command, "simulator rejected command");
        self.event_status |= COMMAND_ERROR;
    }

    fn execute(&mut self, command: &str) {
        match command {
            "*RST" => {
                self.attributes.clear();
                return;
            }
            "*CLS" => {
                self.event_status = 0;
                return;
            }
            _ => {}
        }

        if let Some(channel) = command
            .strip_prefix("smu")
            .and_then(|rest| rest.strip_suffix(".reset()"))
        {
            if channel == "a" || channel == "b" {
                let prefix = format!("smu{channel}.");
                self.attributes.retain(|k, _| !k.starts_with(&prefix));
                return;
            }
        }

        let Some((lhs, rhs)) = command.split_once('=') else {
            self.command_error(command);
            return;
        };
        let (lhs, rhs) = (lhs.trim(), rhs.trim());

        let Some(value) = self.evaluate(rhs) else {
            self.command_error(command);
            return;
        };

        if lhs.starts_with("smu") {
            if !is_attribute(lhs) {
                self.command_error(command);
            } else if !self.pinned.contains_key(lhs) {
                self.attributes.insert(lhs.to_string(), value);
            }
        } else if is_identifier(lhs) {
            self.globals.insert(lhs.to_string(), value);
        } else {
            self.command_error(command);
        }
    }

    fn evaluate(&self, expression: &str) -> Option<f64> {
        if let Ok(number) = expression.parse::<f64>() {
            return Some(number);
        }

        let (channel, member) = split_smu(expression)?;

        if let Some(constant) = member.strip_prefix("OUTPUT_") {
            return match constant {
                "DCAMPS" | "OFF" => Some(0.0),
                "DCVOLTS" | "ON" => Some(1.0),
                _ => None,
            };
        }

        match member {
            "measure.v()" => return Some(self.measured(channel, Quantity::Voltage)),
            "measure.i()" => return Some(self.measured(channel, Quantity::Current)),
            _ => {}
        }

        if is_attribute(expression) {
            return Some(self.resolve(channel, member));
        }
        None
    }

    fn resolve(&self, channel: Channel, member: &str) -> f64 {
        let path = format!("smu{channel}.{member}");
        if let Some(value) = self.pinned.get(&path) {
            return *value;
        }

        // The measure range of the sourced function is locked to the source range.
        let locked = match member {
            "measure.rangev" => Some(("v", 1.0)),
            "measure.rangei" => Some(("i", 0.0)),
            _ => None,
        };
        if let Some((quantity, func)) = locked {
            let sourced = self
                .attributes
                .get(&format!("smu{channel}.source.func"))
                .copied()
                .unwrap_or(1.0);
            if sourced == func {
                return self
                    .attribute(&format!("smu{channel}.source.range{quantity}"))
                    .unwrap_or(0.0);
            }
        }

        self.attributes.get(&path).copied().unwrap_or(0.0)
    }

    fn measured(&self, channel: Channel, quantity: Quantity) -> f64 {
        if let Some(value) = self.measurements.get(&(channel, quantity)) {
            return *value;
        }
        match quantity {
            Quantity::Voltage if self.output_on(channel) => self
                .attribute(&format!("smu{channel}.source.levelv"))
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn answer(&mut self, command: &str) -> Result<String, TransportError> {
        if let Some(reply) = self.canned.get(command) {
            return Ok(reply.clone());
        }

        match command {
            "*IDN?" => return Ok(self.identity.clone()),
            "*ESR?" => {
                // Reading the event-status register clears it.
                let value = self.event_status;
                self.event_status = 0;
                return Ok(value.to_string());
            }
            _ => {}
        }

        if let Some(variable) = command
            .strip_prefix("print(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Ok(match self.globals.get(variable) {
                Some(value) => format_number(*value),
                None => "nil".to_string(),
            });
        }

        self.command_error(command);
        Err(TransportError::Timeout)
    }
}

impl Default for SimulatedSmu {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for SimulatedSmu {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.call_log.push(Call::Write(command.to_string()));
        if self.times_out(command) {
            return Err(TransportError::Timeout);
        }
        self.execute(command);
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.call_log.push(Call::Query(command.to_string()));
        if self.times_out(command) {
            return Err(TransportError::Timeout);
        }
        self.answer(command)
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        self.call_log.push(Call::Clear);
        Ok(())
    }

    fn close(mut self) -> Result<(), TransportError> {
        self.call_log.push(Call::Close);
        tracing::info!("SimulatedSmu closed");
        Ok(())
    }
}

/// Hands out a fresh copy of a configured [`SimulatedSmu`] for every `open`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    template: SimulatedSmu,
    unreachable: bool,
}

impl SimulatedConnector {
    /// Connector whose sessions start as clones of `template`.
    pub fn new(template: SimulatedSmu) -> Self {
        Self {
            template,
            unreachable: false,
        }
    }

    /// Connector that fails every `open`, like a wrong resource string.
    pub fn unreachable() -> Self {
        Self {
            template: SimulatedSmu::new(),
            unreachable: true,
        }
    }
}

impl Connector for SimulatedConnector {
    type Session = SimulatedSmu;

    fn open(&self, resource: &str) -> Result<SimulatedSmu, TransportError> {
        if self.unreachable {
            return Err(TransportError::Io(format!(
                "VI_ERROR_RSRC_NFOUND: insufficient location information or the requested device or resource is not present in the system ({resource})"
            )));
        }
        tracing::info!(resource, "SimulatedSmu connected");
        Ok(self.template.clone())
    }
}

/// Splits `smua.source.levelv` into (`A`, `source.levelv`).
fn split_smu(expression: &str) -> Option<(Channel, &str)> {
    let rest = expression.strip_prefix("smu")?;
    let (channel, member) = rest.split_once('.')?;
    Some((channel.parse().ok()?, member))
}

fn is_attribute(path: &str) -> bool {
    let Some((_, member)) = split_smu(path) else {
        return false;
    };
    match member {
        "source.func" | "source.output" => true,
        _ => {
            let base = member
                .strip_suffix('v')
                .or_else(|| member.strip_suffix('i'));
            matches!(
                base,
                Some("source.range" | "source.level" | "source.limit" | "measure.range")
            )
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prints a number in the instrument's exponent style (`4.9e+00`), using the
/// shortest mantissa that round-trips.
fn format_number(value: f64) -> String {
    let formatted = format!("{value:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_and_print_round_trip() {
        let mut smu = SimulatedSmu::new();
        smu.write("smua.source.limiti = 0.1").unwrap();
        smu.write("limit = smua.source.limiti").unwrap();
        let reply = smu.query("print(limit)").unwrap();
        assert_eq!(reply, "1e-01");
        assert_eq!(reply.parse::<f64>().unwrap(), 0.1);
        assert_eq!(smu.event_status(), 0);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5e+00");
        assert_eq!(format_number(4.9), "4.9e+00");
        assert_eq!(format_number(200.0), "2e+02");
        assert_eq!(format_number(-0.00125), "-1.25e-03");
        assert_eq!(format_number(0.0), "0e+00");
    }

    #[test]
    fn test_pinned_attribute_ignores_writes() {
        let mut smu = SimulatedSmu::new().pin("smua.source.levelv", 4.9);
        smu.write("smua.source.levelv = 5").unwrap();
        assert_eq!(smu.attribute("smua.source.levelv"), Some(4.9));
    }

    #[test]
    fn test_output_constants_and_default_measurement() {
        let mut smu = SimulatedSmu::new();
        smu.write("smub.source.levelv = 3.3").unwrap();
        smu.write("reading = smub.measure.v()").unwrap();
        assert_eq!(smu.query("print(reading)").unwrap(), "0e+00");

        smu.write("smub.source.output = smub.OUTPUT_ON").unwrap();
        assert!(smu.output_on(Channel::B));
        assert!(!smu.output_on(Channel::A));
        smu.write("reading = smub.measure.v()").unwrap();
        assert_eq!(smu.query("print(reading)").unwrap(), "3.3e+00");
    }

    #[test]
    fn test_measure_range_follows_source_range_of_sourced_function() {
        let mut smu = SimulatedSmu::new();
        smu.write("smua.source.func = smua.OUTPUT_DCVOLTS").unwrap();
        smu.write("smua.source.rangev = 20").unwrap();
        smu.write("smua.measure.rangei = 0.01").unwrap();
        smu.write("range = smua.measure.rangev").unwrap();
        assert_eq!(smu.query("print(range)").unwrap(), "2e+01");
        smu.write("range = smua.measure.rangei").unwrap();
        assert_eq!(smu.query("print(range)").unwrap(), "1e-02");
    }

    #[test]
    fn test_measurement_override() {
        let mut smu = SimulatedSmu::new().with_measurement(Channel::A, Quantity::Current, 0.002);
        smu.write("reading = smua.measure.i()").unwrap();
        assert_eq!(smu.query("print(reading)").unwrap(), "2e-03");
    }

    #[test]
    fn test_unknown_command_sets_command_error() {
        let mut smu = SimulatedSmu::new();
        smu.write("smuc.source.levelv = 1").unwrap();
        assert_eq!(smu.event_status(), COMMAND_ERROR);
        assert_eq!(smu.query("*ESR?").unwrap(), "32");
        // ESR read clears the register
        assert_eq!(smu.query("*ESR?").unwrap(), "0");
    }

    #[test]
    fn test_unknown_query_times_out() {
        let mut smu = SimulatedSmu::new();
        assert_eq!(smu.query("MEAS:VOLT?"), Err(TransportError::Timeout));
        assert_eq!(smu.event_status(), COMMAND_ERROR);
    }

    #[test]
    fn test_reset_clears_channel_state() {
        let mut smu = SimulatedSmu::new();
        smu.write("smua.source.levelv = 1").unwrap();
        smu.write("smub.source.levelv = 2").unwrap();
        smu.write("smua.reset()").unwrap();
        assert_eq!(smu.attribute("smua.source.levelv"), None);
        assert_eq!(smu.attribute("smub.source.levelv"), Some(2.0));
        smu.write("*RST").unwrap();
        assert_eq!(smu.attribute("smub.source.levelv"), None);
    }

    #[test]
    fn test_cls_clears_event_status() {
        let mut smu = SimulatedSmu::new().with_event_status(0b1100_0000);
        smu.write("*CLS").unwrap();
        assert_eq!(smu.event_status(), 0);
    }

    #[test]
    fn test_timeout_injection_and_call_log() {
        let mut smu = SimulatedSmu::new().timeout_on("print(reading)");
        smu.write("reading = smua.measure.v()").unwrap();
        assert_eq!(smu.query("print(reading)"), Err(TransportError::Timeout));
        assert_eq!(
            smu.calls(),
            &[
                Call::Write("reading = smua.measure.v()".into()),
                Call::Query("print(reading)".into()),
            ]
        );
        smu.clear_call_log();
        assert!(smu.calls().is_empty());
    }

    #[test]
    fn test_canned_reply_wins() {
        let mut smu = SimulatedSmu::new().with_reply("*ESR?", "garbage");
        assert_eq!(smu.query("*ESR?").unwrap(), "garbage");
    }

    #[test]
    fn test_unreachable_connector() {
        let err = SimulatedConnector::unreachable()
            .open("GPIB0::26::INSTR")
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(msg) if msg.contains("GPIB0::26::INSTR")));
    }

    #[test]
    fn test_connector_clones_template() {
        let connector = SimulatedConnector::new(SimulatedSmu::new().with_identity("sim"));
        let mut first = connector.open("SIM::1").unwrap();
        first.write("x = 1").unwrap();
        let mut second = connector.open("SIM::1").unwrap();
        assert!(second.calls().is_empty());
        assert_eq!(second.query("*IDN?").unwrap(), "sim");
    }
}
