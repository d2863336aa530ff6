//! Probe-card acceptance test on a 2636B.
//!
//! Channel `a` powers the AVDD rail and channel `b` the VDD rail. One run:
//!
//! 1. device clear, `*RST`, `*CLS`
//! 2. both channels source DC volts with per-channel current limit and a shared
//!    voltage range and level; every programmed value is read back and must
//!    match exactly
//! 3. outputs on
//! 4. measure voltage and current on both rails
//! 5. compare each value against its threshold with `>=`
//! 6. if either *voltage* check failed, switch both outputs off
//!
//! Device errors are checked after each phase and only logged. Nothing is retried.

use crate::adapters::Session;
use crate::driver::K2600;
use crate::error::{SmuError, SmuResult};
use crate::smu::{Channel, OutputState, Quantity, SourceFunction};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

const AVDD: Channel = Channel::A;
const VDD: Channel = Channel::B;

/// Settings and pass thresholds of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeCardParams {
    /// Current limit of channel a (A).
    pub limit_a: f64,
    /// Current limit of channel b (A).
    pub limit_b: f64,
    /// Voltage source range of both channels (V).
    pub range: f64,
    /// Voltage source level of both channels (V).
    pub level: f64,
    /// Minimum AVDD voltage (V).
    pub avdd_voltage_threshold: f64,
    /// Minimum AVDD current (A).
    pub avdd_current_threshold: f64,
    /// Minimum VDD voltage (V).
    pub vdd_voltage_threshold: f64,
    /// Minimum VDD current (A).
    pub vdd_current_threshold: f64,
}

/// Outcome of [`ProbeCard::run_test`].
///
/// Both arrays are ordered AVDD-voltage, AVDD-current, VDD-voltage, VDD-current.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCardReport {
    /// 1 where the measured value met its threshold, 0 otherwise.
    pub passed: [u8; 4],
    /// Raw readings; NaN where the measurement timed out.
    pub values: [f64; 4],
    /// Both outputs were switched off after a failed voltage check.
    pub outputs_disabled: bool,
}

impl ProbeCardReport {
    /// Every check passed.
    pub fn all_passed(&self) -> bool {
        self.passed.iter().all(|&bit| bit == 1)
    }

    /// Pass vector as a bit string, e.g. `1011`.
    pub fn bit_string(&self) -> String {
        self.passed.iter().map(|bit| bit.to_string()).collect()
    }
}

impl fmt::Display for ProbeCardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [av, ai, vv, vi] = self.values;
        write!(
            f,
            "{} (AVDD {av} V, {ai} A; VDD {vv} V, {vi} A)",
            self.bit_string()
        )
    }
}

/// Runs the probe-card routine on a borrowed driver.
pub struct ProbeCard<'a, S: Session> {
    smu: &'a mut K2600<S>,
    verbose: bool,
}

impl<'a, S: Session> ProbeCard<'a, S> {
    /// Borrow `smu` for the duration of the test.
    pub fn new(smu: &'a mut K2600<S>) -> Self {
        Self {
            smu,
            verbose: false,
        }
    }

    /// Log the raw readings and the pass vector at info level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run the full sequence.
    ///
    /// # Errors
    /// [`SmuError::ReadbackMismatch`] if a programmed value does not read back
    /// identically (outputs are never enabled in that case); transport errors
    /// from any non-observational command.
    pub fn run_test(&mut self, params: &ProbeCardParams) -> SmuResult<ProbeCardReport> {
        let span = tracing::info_span!(parent: self.smu.span(), "probecard");
        let _enter = span.enter();

        self.clear_reset()?;
        self.set_values(params)?;
        self.set_outputs(OutputState::On)?;
        self.read_compare(params)
    }

    fn clear_reset(&mut self) -> SmuResult<()> {
        self.smu.clear_connection()?;
        self.smu.reset_source_meter()?;
        self.smu.clear_error_queue()
    }

    fn set_values(&mut self, p: &ProbeCardParams) -> SmuResult<()> {
        let smu = &mut *self.smu;
        smu.set_source_function(AVDD, SourceFunction::DcVolts)?;
        smu.set_source_function(VDD, SourceFunction::DcVolts)?;
        smu.set_source_limit(AVDD, Quantity::Current, p.limit_a)?;
        smu.set_source_limit(VDD, Quantity::Current, p.limit_b)?;
        smu.set_source_range(AVDD, Quantity::Voltage, p.range)?;
        smu.set_source_range(VDD, Quantity::Voltage, p.range)?;
        smu.set_source_level(AVDD, Quantity::Voltage, p.level)?;
        smu.set_source_level(VDD, Quantity::Voltage, p.level)?;
        smu.check_for_error()?;

        let limit_a = smu.read_source_limit(AVDD, Quantity::Current)?;
        expect_readback(AVDD, "source limit", p.limit_a, limit_a)?;
        let limit_b = smu.read_source_limit(VDD, Quantity::Current)?;
        expect_readback(VDD, "source limit", p.limit_b, limit_b)?;
        let range_a = smu.read_source_range(AVDD, Quantity::Voltage)?;
        expect_readback(AVDD, "range", p.range, range_a)?;
        let range_b = smu.read_source_range(VDD, Quantity::Voltage)?;
        expect_readback(VDD, "range", p.range, range_b)?;
        let level_a = smu.read_source_level(AVDD, Quantity::Voltage)?;
        expect_readback(AVDD, "source level", p.level, level_a)?;
        let level_b = smu.read_source_level(VDD, Quantity::Voltage)?;
        expect_readback(VDD, "source level", p.level, level_b)?;
        smu.check_for_error()?;
        Ok(())
    }

    fn set_outputs(&mut self, state: OutputState) -> SmuResult<()> {
        self.smu.set_source_output(AVDD, state)?;
        self.smu.set_source_output(VDD, state)?;
        self.smu.check_for_error()?;
        Ok(())
    }

    fn read_compare(&mut self, p: &ProbeCardParams) -> SmuResult<ProbeCardReport> {
        let readings = [
            self.smu.measure(AVDD, Quantity::Voltage)?,
            self.smu.measure(AVDD, Quantity::Current)?,
            self.smu.measure(VDD, Quantity::Voltage)?,
            self.smu.measure(VDD, Quantity::Current)?,
        ];
        self.smu.check_for_error()?;

        let thresholds = [
            p.avdd_voltage_threshold,
            p.avdd_current_threshold,
            p.vdd_voltage_threshold,
            p.vdd_current_threshold,
        ];
        let passed = [0usize, 1, 2, 3].map(|i| u8::from(readings[i].at_least(thresholds[i])));
        let values = readings.map(|r| r.value().unwrap_or(f64::NAN));

        let mut report = ProbeCardReport {
            passed,
            values,
            outputs_disabled: false,
        };

        if self.verbose {
            let [av, ai, vv, vi] = values;
            info!("Readout values: {av}, {ai}, {vv}, {vi}");
            info!("Readout bin result: {}", report.bit_string());
        }

        // Only the voltage checks protect the card; a low current alone keeps power on.
        if passed[0] == 0 || passed[2] == 0 {
            warn!(result = %report.bit_string(), "rail voltage below threshold, disabling outputs");
            self.set_outputs(OutputState::Off)?;
            report.outputs_disabled = true;
        }

        Ok(report)
    }
}

fn expect_readback(
    channel: Channel,
    setting: &'static str,
    requested: f64,
    actual: f64,
) -> SmuResult<()> {
    if actual == requested {
        Ok(())
    } else {
        Err(SmuError::ReadbackMismatch {
            channel,
            setting,
            requested,
            actual,
        })
    }
}
