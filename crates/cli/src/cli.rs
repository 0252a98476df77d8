//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// airwatch - environmental sensor station
#[derive(Parser, Debug)]
#[command(
    name = "airwatch",
    author,
    version,
    about = "Environmental sensor acquisition station",
    long_about = "Polls CO2, climate and gas sensors at their own cadences, filters\n\
                  glitches, cross-feeds compensation values, tracks sensor health and\n\
                  persists composed records to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "AIRWATCH_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "AIRWATCH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the station until interrupted
    Run(RunArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Take one diagnostic reading from every sensor
    Diagnose(DiagnoseArgs),
}

/// Device backend options shared by commands that open sensors
#[derive(Parser, Debug, Clone)]
pub struct DeviceArgs {
    /// Probability of a simulated transient error per sample
    #[arg(long, default_value = "0.05", env = "AIRWATCH_GLITCH_RATE")]
    pub glitch_rate: f64,

    /// Seed for reproducible simulated signals
    #[arg(long, env = "AIRWATCH_SEED")]
    pub seed: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults if omitted
    #[arg(short, long, env = "AIRWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stop after this many seconds (0 = until Ctrl-C/SIGTERM)
    #[arg(long, default_value = "0", env = "AIRWATCH_DURATION")]
    pub duration: u64,

    /// Seconds between health log lines
    #[arg(long, default_value = "60", env = "AIRWATCH_HEALTH_INTERVAL")]
    pub health_interval: u64,

    /// Capacity of the record queue between station and dispatcher
    #[arg(long, default_value = "100", env = "AIRWATCH_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "AIRWATCH_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without opening sensors
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config/station.toml", env = "AIRWATCH_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/station.toml", env = "AIRWATCH_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct DiagnoseArgs {
    /// Path to configuration file; built-in defaults if omitted
    #[arg(short, long, env = "AIRWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub device: DeviceArgs,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["airwatch", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.config.is_none());
        assert_eq!(args.duration, 0);
        assert_eq!(args.health_interval, 60);
        assert_eq!(args.metrics_port, 0);
        assert!((args.device.glitch_rate - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["airwatch", "diagnose", "--json", "-vv", "--seed", "7"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Diagnose(args) = cli.command else {
            panic!("expected diagnose");
        };
        assert!(args.json);
        assert_eq!(args.device.seed, Some(7));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["airwatch", "-q", "-v", "info"]).is_err());
    }
}
