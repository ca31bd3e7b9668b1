//! Example: Poll a heater's status until Ctrl+C
//!
//! Run with: cargo run --example poll_status -- EC:B1:C3:00:4D:61

use hcalory_control::{Heater, HeaterConfig, HeaterState, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hcalory_control=info".parse().unwrap()),
        )
        .init();

    let address = std::env::args()
        .nth(1)
        .expect("usage: poll_status <heater address>");

    let heater = Heater::discover(&address, HeaterConfig::default()).await?;
    heater.connect().await?;

    println!("Polling heater {} every 5 seconds", heater.address());
    println!("Press Ctrl+C to exit.\n");

    let mut last_state: Option<HeaterState> = None;
    let mut interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // get_data reconnects on its own if the heater dropped the link
                let status = match heater.get_data().await {
                    Ok(status) => status,
                    Err(e) => {
                        println!("Read failed: {}", e);
                        continue;
                    }
                };

                if last_state != Some(status.state) {
                    println!("State: {}", status.state);
                    last_state = Some(status.state);
                }

                println!(
                    "  setting {:>3} | {:>2} V | body {:>3}° | ambient {:>3}°",
                    status.setting,
                    status.voltage(),
                    status.body_temperature(),
                    status.ambient_temperature()
                );
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                break;
            }
        }
    }

    heater.disconnect().await?;
    println!("Done!");

    Ok(())
}
