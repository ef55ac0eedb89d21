// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # teapot-bt
//!
//! Bluetooth serial session manager and brew control for an ESP32 teapot.
//!
//! The teapot speaks a line-oriented key/value protocol over a serial
//! Bluetooth link. The app sends `temp>80|motor>UP` once per second and the
//! kettle answers with at least `temp>{current}`. This crate owns that link
//! and drives the brew from the readings.
//!
//! ## Features
//!
//! - **Discovery**: find a bonded teapot by name
//! - **Framed Transport**: `\n`-terminated frames over any serial link
//! - **Telemetry Polling**: one instruction, one reply, every second
//! - **Brew Control**: heating, infusing with a countdown, ready
//! - **Events**: broadcast channel, phase watch and callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use teapot_bt::{BleRadio, BrewPhase, BrewSession, Recipe, Result, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let radio = BleRadio::new().await?;
//!     let config = SessionConfig::default();
//!
//!     let session = BrewSession::connect(&radio, &config, Recipe::new("Sencha", 80, 3)).await?;
//!
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     if session.wait_until_finished().await == BrewPhase::Ready {
//!         println!("Tea is ready");
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### BLE
//! The default [`BleRadio`] backend uses btleplug and reaches the teapot
//! through the Nordic UART service. On Linux it requires BlueZ; on macOS the
//! app needs Bluetooth permission.
//!
//! ### Classic RFCOMM
//! On Linux, the `rfcomm` feature adds `RfcommRadio`, which opens a Serial
//! Port Profile socket to a paired device through BlueZ.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types
//! - `rfcomm`: Classic Bluetooth RFCOMM backend (Linux)

// Public modules
pub mod brew;
pub mod config;
pub mod context;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod utils;

// Re-exports for convenience
pub use config::{DeviceName, SessionConfig, DEFAULT_DEVICE_NAME};
pub use error::{Error, Result};
pub use session::{BrewSession, CallbackHandle};
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius, format_countdown};

// Re-export commonly used types from submodules
pub use brew::{BrewController, BrewEvent, BrewPhase, BrewSnapshot, PhaseChange, Recipe};
pub use context::{Language, SessionContext};
pub use poller::{PollOutcome, PollerExit, TelemetryPoller};
pub use protocol::{Instruction, MotorPosition, Reply, TelemetryReading, TEMPERATURE_OFF};
pub use store::{InMemoryProfileStore, ProfileStore, TeaProfile};
pub use transport::ble::BleRadio;
#[cfg(all(feature = "rfcomm", target_os = "linux"))]
pub use transport::rfcomm::RfcommRadio;
pub use transport::uuids::SPP_SERVICE_UUID;
pub use transport::{BondedDevice, DeviceIdentity, FramedTransport, Link, Radio, StreamLink};
