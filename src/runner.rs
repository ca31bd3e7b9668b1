//! One-shot command sessions, as run by the `hcalory-control` binary.

use serde::Serialize;
use tracing::{debug, warn};

use crate::ble::transport::HeaterTransport;
use crate::config::HeaterConfig;
use crate::error::Result;
use crate::heater::Heater;
use crate::protocol::status::to_pretty_json;
use crate::protocol::{Command, HeaterStatus};

/// Outcome of a command session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    /// The command that was run.
    pub command: Command,
    /// Status read before the command was sent.
    pub before: HeaterStatus,
    /// Status read after the settle delay. `None` for `pump_data`.
    pub after: Option<HeaterStatus>,
}

#[derive(Serialize)]
struct ReportJson {
    command: &'static str,
    before: crate::protocol::StatusSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<crate::protocol::StatusSummary>,
}

impl CommandReport {
    /// Render the report the way the command line tool prints it.
    ///
    /// A status request prints a single JSON document. Other commands print
    /// the status before and after, each prefixed with a label.
    pub fn render(&self) -> Result<String> {
        match &self.after {
            None => self.before.to_json(),
            Some(after) => Ok(format!(
                "Before command: {}\nAfter command: {}",
                self.before.to_json()?,
                after.to_json()?
            )),
        }
    }

    /// Render the whole report as one JSON document.
    pub fn to_json(&self) -> Result<String> {
        to_pretty_json(&ReportJson {
            command: self.command.name(),
            before: self.before.summary(),
            after: self.after.as_ref().map(HeaterStatus::summary),
        })
    }
}

/// Find the heater at `address`, run `command` on it and disconnect.
pub async fn run_command(
    command: Command,
    address: &str,
    config: HeaterConfig,
) -> Result<CommandReport> {
    let heater = Heater::discover(address, config).await?;
    execute(&heater, command).await
}

/// Run `command` on an already discovered heater.
///
/// The heater is always disconnected afterwards, even when the session fails.
pub async fn execute<T: HeaterTransport>(
    heater: &Heater<T>,
    command: Command,
) -> Result<CommandReport> {
    heater.connect().await?;

    let result = session(heater, command).await;

    if let Err(e) = heater.disconnect().await {
        warn!("Error disconnecting heater {}: {}", heater.address(), e);
    }

    result
}

async fn session<T: HeaterTransport>(heater: &Heater<T>, command: Command) -> Result<CommandReport> {
    let before = heater.get_data().await?;

    if command.is_status_request() {
        return Ok(CommandReport {
            command,
            before,
            after: None,
        });
    }

    heater.send_command(command).await?;

    let settle = heater.config().settle_delay;
    debug!("Waiting {:?} for heater to apply {}", settle, command);
    tokio::time::sleep(settle).await;

    let after = heater.get_data().await?;

    Ok(CommandReport {
        command,
        before,
        after: Some(after),
    })
}
