//! TSP command strings understood by the 2600-series scripting interpreter.
//!
//! These strings are the wire protocol; they are sent verbatim over the session.
//! A read takes two round trips because the interpreter cannot return the value
//! of an arbitrary expression in one query: the value is first stored in an
//! instrument-side global and then printed.

use crate::smu::{Channel, OutputState, Quantity, SourceFunction};

/// Full-instrument reset.
pub const RESET: &str = "*RST";
/// Clear status, empties the event registers and error queue.
pub const CLEAR_STATUS: &str = "*CLS";
/// Standard event-status register query.
pub const EVENT_STATUS_QUERY: &str = "*ESR?";
/// Identification query.
pub const IDENTIFY: &str = "*IDN?";

/// A two-step read: an assignment to an instrument-side variable, then the
/// query that prints it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCommand {
    /// Write that stores the value, e.g. `limit = smua.source.limiti`.
    pub store: String,
    /// Query that prints the stored value, e.g. `print(limit)`.
    pub print: &'static str,
}

impl ReadCommand {
    fn new(variable: &'static str, print: &'static str, expression: String) -> Self {
        Self {
            store: format!("{variable} = {expression}"),
            print,
        }
    }
}

/// `smuX.reset()`
pub fn channel_reset(channel: Channel) -> String {
    format!("smu{channel}.reset()")
}

/// Select DC volts or DC amps as the source function.
pub fn source_function(channel: Channel, function: SourceFunction) -> String {
    format!("smu{channel}.source.func = smu{channel}.{function}")
}

/// Source range for `quantity`.
pub fn source_range(channel: Channel, quantity: Quantity, value: f64) -> String {
    format!("smu{channel}.source.range{quantity} = {value}")
}

/// Source level for `quantity`.
pub fn source_level(channel: Channel, quantity: Quantity, value: f64) -> String {
    format!("smu{channel}.source.level{quantity} = {value}")
}

/// Compliance limit for `quantity`.
pub fn source_limit(channel: Channel, quantity: Quantity, value: f64) -> String {
    format!("smu{channel}.source.limit{quantity} = {value}")
}

/// Measure range for `quantity`.
pub fn measure_range(channel: Channel, quantity: Quantity, value: f64) -> String {
    format!("smu{channel}.measure.range{quantity} = {value}")
}

/// Switch the output stage.
pub fn source_output(channel: Channel, state: OutputState) -> String {
    format!("smu{channel}.source.output = smu{channel}.OUTPUT_{state}")
}

/// Read back the compliance limit.
pub fn read_source_limit(channel: Channel, quantity: Quantity) -> ReadCommand {
    ReadCommand::new(
        "limit",
        "print(limit)",
        format!("smu{channel}.source.limit{quantity}"),
    )
}

/// Reads the *measure* range, even though the sequencer programs the source
/// range.
pub fn read_source_range(channel: Channel, quantity: Quantity) -> ReadCommand {
    ReadCommand::new(
        "range",
        "print(range)",
        format!("smu{channel}.measure.range{quantity}"),
    )
}

/// Read back the source level.
pub fn read_source_level(channel: Channel, quantity: Quantity) -> ReadCommand {
    ReadCommand::new(
        "level",
        "print(level)",
        format!("smu{channel}.source.level{quantity}"),
    )
}

/// Trigger one measurement and print it.
pub fn measure(channel: Channel, quantity: Quantity) -> ReadCommand {
    ReadCommand::new(
        "reading",
        "print(reading)",
        format!("smu{channel}.measure.{quantity}()"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_templates() {
        assert_eq!(channel_reset(Channel::A), "smua.reset()");
        assert_eq!(
            source_function(Channel::B, SourceFunction::DcVolts),
            "smub.source.func = smub.OUTPUT_DCVOLTS"
        );
        assert_eq!(
            source_function(Channel::A, SourceFunction::DcAmps),
            "smua.source.func = smua.OUTPUT_DCAMPS"
        );
        assert_eq!(
            source_range(Channel::A, Quantity::Voltage, 20.0),
            "smua.source.rangev = 20"
        );
        assert_eq!(
            source_level(Channel::B, Quantity::Voltage, 1.8),
            "smub.source.levelv = 1.8"
        );
        assert_eq!(
            source_limit(Channel::A, Quantity::Current, 0.1),
            "smua.source.limiti = 0.1"
        );
        assert_eq!(
            measure_range(Channel::B, Quantity::Current, 0.001),
            "smub.measure.rangei = 0.001"
        );
        assert_eq!(
            source_output(Channel::B, OutputState::Off),
            "smub.source.output = smub.OUTPUT_OFF"
        );
    }

    #[test]
    fn test_read_templates() {
        let limit = read_source_limit(Channel::A, Quantity::Current);
        assert_eq!(limit.store, "limit = smua.source.limiti");
        assert_eq!(limit.print, "print(limit)");

        let range = read_source_range(Channel::B, Quantity::Voltage);
        assert_eq!(range.store, "range = smub.measure.rangev");
        assert_eq!(range.print, "print(range)");

        let level = read_source_level(Channel::A, Quantity::Voltage);
        assert_eq!(level.store, "level = smua.source.levelv");
        assert_eq!(level.print, "print(level)");

        let reading = measure(Channel::B, Quantity::Current);
        assert_eq!(reading.store, "reading = smub.measure.i()");
        assert_eq!(reading.print, "print(reading)");
    }

    #[test]
    fn test_small_values_print_as_plain_decimal() {
        assert_eq!(
            source_limit(Channel::A, Quantity::Current, 1e-7),
            "smua.source.limiti = 0.0000001"
        );
    }
}
