//! mmcd - datalogger and diagnostic tool for 1990s Mitsubishi ECUs
//!
//! Talks to the ECU over its 1953 baud diagnostic line: live sensor
//! logging, fault codes, actuator tests, and conversion of logs recorded
//! by the original PalmOS application.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mmcd_core::{SensorTable, UnitSystem};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::LogOptions;
use crate::config::Overrides;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "mmcd")]
#[command(author, version, about = "Mitsubishi ECU datalogger")]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port connected to the ECU diagnostic line
    #[arg(short, long, env = "MMCD_PORT", global = true)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Unit system: metric, english, raw
    #[arg(short, long, global = true)]
    units: Option<UnitSystem>,

    /// Configuration file path
    #[arg(short, long, env = "MMCD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Print the sensor table
    Sensors,

    /// Check that the ECU responds
    Probe,

    /// Read diagnostic trouble codes
    Dtc {
        /// Erase stored codes after reading them
        #[arg(long)]
        erase: bool,
    },

    /// List actuator tests, or run one
    Test {
        /// Test to run (e.g. fuel-pump, inj1)
        #[arg(long = "command", value_name = "NAME")]
        name: Option<String>,
    },

    /// Record sensor samples to a native log
    Log {
        /// Output log file
        #[arg(short = 'f', long)]
        output: PathBuf,

        /// Sensor slugs to record, comma separated (default: common set)
        #[arg(short, long, value_delimiter = ',')]
        sensors: Vec<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Use the built-in simulator instead of a serial port
        #[arg(long)]
        demo: bool,
    },

    /// Convert a legacy PalmOS log (.pdb) to a native log
    Import {
        /// Legacy log file
        #[arg(long)]
        file: PathBuf,

        /// Output native log file
        #[arg(short = 'f', long = "output")]
        output: PathBuf,
    },

    /// Print a native log
    Dump {
        /// Native log file
        #[arg(long)]
        file: PathBuf,

        /// Maximum number of samples to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging, RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let file_config = if let Some(config_path) = &cli.config {
        config::load_from(config_path)?
    } else {
        config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let ecu_config = config::merge_with_args(
        file_config,
        &Overrides {
            port: cli.port.clone(),
            baud_rate: cli.baud,
            units: cli.units,
        },
    );

    let ctx = OutputContext::new(cli.format, cli.no_color, cli.quiet, cli.yes);
    let table = Arc::new(SensorTable::default());

    match &cli.command {
        Commands::Ports => commands::ports(&ctx)?,

        Commands::Sensors => commands::sensors(&table, &ctx)?,

        Commands::Probe => commands::probe(&ecu_config, table, &ctx).await?,

        Commands::Dtc { erase } => commands::dtc(&ecu_config, table, *erase, &ctx).await?,

        Commands::Test { name } => {
            commands::test(&ecu_config, table, name.as_deref(), &ctx).await?
        }

        Commands::Log {
            output,
            sensors,
            duration,
            demo,
        } => {
            let options = LogOptions {
                output: output.clone(),
                sensors: sensors.clone(),
                duration: duration.map(Duration::from_secs),
                demo: *demo,
            };
            commands::log(&ecu_config, table, &options, &ctx).await?
        }

        Commands::Import { file, output } => {
            commands::import(file, output, &table, ecu_config.units, &ctx)?
        }

        Commands::Dump { file, limit } => commands::dump(file, *limit, &table, &ctx)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_log_command() {
        let cli = Cli::try_parse_from([
            "mmcd", "--units", "english", "log", "-f", "run.mmcd", "-s", "RPM,TPS", "--demo",
        ])
        .unwrap();
        assert_eq!(cli.units, Some(UnitSystem::English));
        match cli.command {
            Commands::Log { sensors, demo, .. } => {
                assert_eq!(sensors, vec!["RPM", "TPS"]);
                assert!(demo);
            }
            _ => panic!("expected log command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mmcd", "dtc", "--erase", "--yes", "--port", "/dev/ttyUSB0"])
            .unwrap();
        assert!(cli.yes);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
    }
}
