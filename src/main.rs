//! `hcalory-control`: send one command to an HCalory heater and print its status.
//!
//! Run with: hcalory-control pump_data --address EC:B1:C3:00:4D:61

use clap::Parser;
use hcalory_control::{run_command, Command, HeaterConfig};
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hcalory-control")]
#[command(version, about = "Control an HCalory diesel heater over Bluetooth Low Energy")]
struct Cli {
    /// Command to send
    #[arg(value_enum)]
    command: Command,

    /// Bluetooth MAC address of heater
    #[arg(long)]
    address: String,

    /// Per-attempt connection timeout in seconds
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = 20)]
    max_retries: u32,

    /// How long to scan for the heater, in seconds
    #[arg(long, default_value_t = 30.0)]
    scan_timeout: f64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Result<HeaterConfig, String> {
        Ok(HeaterConfig::new()
            .with_bluetooth_timeout(seconds("timeout", self.timeout)?)
            .with_max_retries(self.max_retries)
            .with_scan_timeout(seconds("scan-timeout", self.scan_timeout)?))
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|_| format!("invalid --{}: {}", name, value))
}

fn init_tracing(verbose: u8) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let directive = match verbose {
        0 => None,
        1 => Some("hcalory_control=debug"),
        _ => Some("hcalory_control=trace"),
    };
    if let Some(Ok(directive)) = directive.map(str::parse::<Directive>) {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.config() {
        Ok(config) => config,
        Err(message) => {
            error!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let report = match run_command(cli.command, &cli.address, config).await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match report.render() {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
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
    fn test_parse_command_and_address() {
        let cli = Cli::try_parse_from([
            "hcalory-control",
            "start_heat",
            "--address",
            "AA:BB:CC:DD:EE:FF",
        ])
        .unwrap();

        assert_eq!(cli.command, Command::StartHeat);
        assert_eq!(cli.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(cli.max_retries, 20);
        assert_eq!(cli.config().unwrap(), HeaterConfig::default());
    }

    #[test]
    fn test_every_command_name_accepted() {
        for command in Command::ALL {
            let cli =
                Cli::try_parse_from(["hcalory-control", command.name(), "--address", "x"]).unwrap();
            assert_eq!(cli.command, command);
        }
    }

    #[test]
    fn test_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["hcalory-control", "boost", "--address", "x"]).is_err());
    }

    #[test]
    fn test_address_required() {
        assert!(Cli::try_parse_from(["hcalory-control", "pump_data"]).is_err());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let cli = Cli::try_parse_from([
            "hcalory-control",
            "up",
            "--address",
            "x",
            "--timeout=-1",
        ])
        .unwrap();
        assert!(cli.config().is_err());
    }
}
