//! Brew control.
//!
//! - Recipes and the infusion countdown
//! - The phase state machine
//! - Shared controller with event fan-out

pub mod controller;
pub mod countdown;
pub mod machine;
pub mod recipe;

pub use controller::{run_countdown, BrewController, BrewEvent};
pub use countdown::{Countdown, COUNTDOWN_EXTRA_SECONDS};
pub use machine::{BrewMachine, BrewPhase, BrewSnapshot, PhaseChange};
pub use recipe::Recipe;
