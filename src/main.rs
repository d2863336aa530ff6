//! CLI entry point for k2600-probecard
//!
//! Subcommands:
//! - `idn`: connect and print the instrument identity
//! - `status`: read and decode the event status register
//! - `measure <channel> <quantity>`: one spot measurement
//! - `run`: the probe-card acceptance test (exit code 1 on any failed check)
//!
//! # Usage
//!
//! ```bash
//! k2600-probecard --resource GPIB0::26::INSTR run
//! k2600-probecard --simulate measure a v
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k2600_probecard::adapters::{Connector, SimulatedConnector, SimulatedSmu};
use k2600_probecard::config::{AppConfig, Transport, DEFAULT_CONFIG_PATH};
use k2600_probecard::logging::{self, LoggingConfig};
use k2600_probecard::{Channel, ProbeCard, Quantity, StatusCheck, K2600};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "k2600-probecard")]
#[command(about = "Keithley 2600 SMU control and probe-card test", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// VISA resource string, overrides the configuration
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Use the in-process simulator instead of real hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Debug logging and raw readout of the probe-card test
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the instrument identity
    Idn,

    /// Check the event status register for device errors
    Status,

    /// Measure one quantity on one channel
    Measure {
        /// Channel: a or b
        channel: Channel,
        /// Quantity: v or i
        quantity: Quantity,
    },

    /// Run the probe-card test with the configured thresholds
    Run,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(resource) = &cli.resource {
        config.instrument.resource = resource.clone();
    }
    if cli.verbose {
        config.application.log_level = "debug".to_string();
        config.probecard.verbose = true;
    }
    config.validate().context("Invalid configuration")?;

    let logging_config = LoggingConfig::from_app_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_file_and_line(cli.verbose);
    logging::init(logging_config).map_err(anyhow::Error::msg)?;

    let passed = if cli.simulate || config.instrument.transport == Transport::Simulated {
        let connector = SimulatedConnector::new(simulated_bench());
        execute(&connector, &config, &cli.command)?
    } else {
        execute_visa(&config, &cli.command)?
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// A 2636B with a small load on both rails, so a default run passes.
fn simulated_bench() -> SimulatedSmu {
    SimulatedSmu::new()
        .with_measurement(Channel::A, Quantity::Current, 2.0e-3)
        .with_measurement(Channel::B, Quantity::Current, 1.5e-3)
}

#[cfg(feature = "instrument_visa")]
fn execute_visa(config: &AppConfig, command: &Commands) -> Result<bool> {
    use k2600_probecard::adapters::VisaConnector;

    let connector = VisaConnector::new()
        .with_timeout(config.instrument.timeout)
        .with_line_terminator(config.instrument.line_terminator.clone());
    execute(&connector, config, command)
}

#[cfg(not(feature = "instrument_visa"))]
fn execute_visa(_config: &AppConfig, _command: &Commands) -> Result<bool> {
    anyhow::bail!("VISA transport requires the 'instrument_visa' feature; rebuild with --features instrument_visa or pass --simulate")
}

/// Run one subcommand. `Ok(false)` means the instrument answered but a check failed.
fn execute<C: Connector>(connector: &C, config: &AppConfig, command: &Commands) -> Result<bool> {
    let resource = &config.instrument.resource;
    let mut smu = K2600::connect(connector, resource)
        .with_context(|| format!("Failed to connect to {resource}"))?;

    let passed = match command {
        Commands::Idn => {
            println!("{}", smu.identity());
            true
        }
        Commands::Status => match smu.check_for_error()? {
            StatusCheck::Status(status) if status.is_clean() => {
                println!("0 (no error)");
                true
            }
            StatusCheck::Status(status) => {
                let errors: Vec<String> = status.errors().iter().map(|e| e.to_string()).collect();
                println!("{} ({})", status.bits(), errors.join(", "));
                false
            }
            check => {
                println!("{} (status register unreadable)", check.code());
                false
            }
        },
        Commands::Measure { channel, quantity } => {
            match smu.measure(*channel, *quantity)?.value() {
                Some(value) => {
                    println!("{value}");
                    true
                }
                None => {
                    eprintln!("Measurement timed out");
                    false
                }
            }
        }
        Commands::Run => {
            let report = ProbeCard::new(&mut smu)
                .verbose(config.probecard.verbose)
                .run_test(&config.probecard.params)
                .context("Probe-card test aborted")?;
            println!("{report}");
            if report.outputs_disabled {
                eprintln!("Rail voltage below threshold, outputs switched off");
            }
            report.all_passed()
        }
    };

    smu.close_connection()?;
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.instrument.transport = Transport::Simulated;
        config
    }

    #[test]
    fn test_parse_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "k2600-probecard",
            "measure",
            "b",
            "i",
            "--simulate",
            "--resource",
            "GPIB0::5::INSTR",
        ])
        .unwrap();
        assert!(cli.simulate);
        assert_eq!(cli.resource.as_deref(), Some("GPIB0::5::INSTR"));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(matches!(
            cli.command,
            Commands::Measure {
                channel: Channel::B,
                quantity: Quantity::Current
            }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_channel() {
        assert!(Cli::try_parse_from(["k2600-probecard", "measure", "c", "v"]).is_err());
        assert!(Cli::try_parse_from(["k2600-probecard", "measure", "a", "r"]).is_err());
    }

    #[test]
    fn test_idn_and_clean_status_pass() {
        let connector = SimulatedConnector::new(simulated_bench());
        assert!(execute(&connector, &config(), &Commands::Idn).unwrap());
        assert!(execute(&connector, &config(), &Commands::Status).unwrap());
    }

    #[test]
    fn test_status_with_device_error_fails() {
        let connector = SimulatedConnector::new(simulated_bench().with_event_status(1 << 4));
        assert!(!execute(&connector, &config(), &Commands::Status).unwrap());

        let connector = SimulatedConnector::new(simulated_bench().timeout_on("*ESR?"));
        assert!(!execute(&connector, &config(), &Commands::Status).unwrap());
    }

    #[test]
    fn test_measure_exit_status() {
        let measure = Commands::Measure {
            channel: Channel::A,
            quantity: Quantity::Current,
        };
        let connector = SimulatedConnector::new(simulated_bench());
        assert!(execute(&connector, &config(), &measure).unwrap());

        let connector = SimulatedConnector::new(simulated_bench().timeout_on("print(reading)"));
        assert!(!execute(&connector, &config(), &measure).unwrap());
    }

    #[test]
    fn test_default_run_passes_on_simulated_bench() {
        let connector = SimulatedConnector::new(simulated_bench());
        assert!(execute(&connector, &config(), &Commands::Run).unwrap());
    }

    #[test]
    fn test_run_with_failing_check_reports_failure() {
        let bench = simulated_bench().with_measurement(Channel::B, Quantity::Voltage, 3.0);
        let connector = SimulatedConnector::new(bench);
        assert!(!execute(&connector, &config(), &Commands::Run).unwrap());
    }

    #[test]
    fn test_run_readback_mismatch_is_an_error() {
        let bench = simulated_bench().pin("smub.source.levelv", 4.9);
        let connector = SimulatedConnector::new(bench);
        let err = execute(&connector, &config(), &Commands::Run).unwrap_err();
        assert!(err.to_string().contains("Probe-card test aborted"));
    }

    #[test]
    fn test_unreachable_resource_is_an_error() {
        let err = execute(&SimulatedConnector::unreachable(), &config(), &Commands::Idn).unwrap_err();
        assert!(err.to_string().contains("GPIB0::26::INSTR"));
    }
}
