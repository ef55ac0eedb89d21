//! Brew a tea on the teapot
//!
//! Connects to the bonded teapot, heats the water, lowers the infuser once the
//! target temperature is reached and raises it when the countdown ends.
//! Press Ctrl-C to cancel; the kettle is switched off before exiting.
//!
//! Run with: cargo run --example brew
//!
//! Options:
//!   cargo run --example brew -- --name ESP32-BT-Theiere --temp 80 --minutes 3

use std::time::Duration;
use teapot_bt::utils::fahrenheit_label;
use teapot_bt::{
    format_countdown, BleRadio, BrewEvent, BrewPhase, BrewSession, DeviceName, Error, Recipe,
    Result, SessionConfig,
};

fn arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,teapot_bt=info")
        .init();

    println!("Teapot Brew");
    println!("===========\n");

    let args: Vec<String> = std::env::args().collect();
    let name = arg(&args, "--name").unwrap_or_else(|| teapot_bt::DEFAULT_DEVICE_NAME.to_string());
    let temp = arg(&args, "--temp").unwrap_or_else(|| "80".to_string());
    let minutes = arg(&args, "--minutes").unwrap_or_else(|| "3".to_string());

    let recipe = Recipe::from_fields("Demo", &temp, &minutes)?;
    let config = SessionConfig::new(DeviceName::new(name)?);

    println!(
        "Recipe: {}°C{} for {} minutes",
        recipe.target_temperature_celsius,
        fahrenheit_label(recipe.target_temperature_celsius as f64),
        recipe.duration_minutes
    );
    println!("Looking for {}...\n", config.device_name);

    let radio = BleRadio::new().await?.with_scan_window(Duration::from_secs(5));
    let session = match BrewSession::connect(&radio, &config, recipe).await {
        Ok(session) => session,
        Err(Error::DeviceNotFound { name }) => {
            println!("No bonded device named {}. Pair the teapot and retry.", name);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    println!("Connected to {}\n", session.identity().address);

    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BrewEvent::PhaseChanged(change) => println!("Phase: {}", change.to),
                BrewEvent::TemperatureUpdated(reading) => println!("Temperature: {}", reading),
                BrewEvent::CountdownTick { remaining_seconds } => {
                    println!("Remaining: {}", format_countdown(remaining_seconds))
                }
                BrewEvent::ConnectionLost {
                    consecutive_failures,
                } => println!("Lost the teapot after {} failed polls", consecutive_failures),
            }
        }
    });

    let phase = tokio::select! {
        phase = session.wait_until_finished() => phase,
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelling...");
            BrewPhase::Cancelled
        }
    };

    session.close().await?;
    printer.abort();

    match phase {
        BrewPhase::Ready => println!("\nYour tea is ready."),
        _ => println!("\nBrew cancelled."),
    }

    Ok(())
}
