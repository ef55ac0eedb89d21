//! Brew phase state machine.
//!
//! ```text
//! AwaitingConnection -> Heating -> Infusing -> Ready
//!          \________________\__________\______> Cancelled
//! ```
//!
//! The machine is pure: it never does I/O or sleeps. The poller feeds it
//! readings, a timer feeds it ticks, and it answers with the instruction the
//! kettle should receive next.

use std::fmt;

use crate::brew::countdown::Countdown;
use crate::brew::recipe::Recipe;
use crate::protocol::{Instruction, MotorPosition, TelemetryReading, TEMPERATURE_OFF};

/// Phase of a brew session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BrewPhase {
    /// Waiting for the serial link to open.
    #[default]
    AwaitingConnection,
    /// Heating water up to the target temperature.
    Heating,
    /// Infuser lowered, countdown running.
    Infusing,
    /// Tea is ready.
    Ready,
    /// Stopped before completion.
    Cancelled,
}

impl BrewPhase {
    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Cancelled)
    }
}

impl fmt::Display for BrewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingConnection => write!(f, "Awaiting connection"),
            Self::Heating => write!(f, "Heating"),
            Self::Infusing => write!(f, "Infusing"),
            Self::Ready => write!(f, "Ready"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    /// Phase before the transition.
    pub from: BrewPhase,
    /// Phase after the transition.
    pub to: BrewPhase,
}

/// Point-in-time view of a brew, for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrewSnapshot {
    /// Current phase.
    pub phase: BrewPhase,
    /// Temperature being sent to the kettle ([`TEMPERATURE_OFF`] when off).
    pub target_temperature: i32,
    /// Motor position being sent to the kettle.
    pub motor: MotorPosition,
    /// Last temperature the kettle reported.
    pub reading: TelemetryReading,
    /// Seconds of infusion left, once infusing has started.
    pub remaining_seconds: Option<u32>,
    /// Seconds of infusion elapsed, once infusing has started.
    pub elapsed_seconds: Option<u32>,
}

/// The brew state machine.
#[derive(Debug, Clone)]
pub struct BrewMachine {
    recipe: Recipe,
    phase: BrewPhase,
    target_temperature: i32,
    motor: MotorPosition,
    reading: TelemetryReading,
    countdown: Option<Countdown>,
}

impl BrewMachine {
    /// Create a machine awaiting connection.
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            phase: BrewPhase::AwaitingConnection,
            target_temperature: TEMPERATURE_OFF,
            motor: MotorPosition::Up,
            reading: TelemetryReading::UNKNOWN,
            countdown: None,
        }
    }

    /// The link opened: start heating to the recipe temperature.
    pub fn on_connected(&mut self) -> Option<PhaseChange> {
        if self.phase != BrewPhase::AwaitingConnection {
            return None;
        }
        self.target_temperature = self.recipe.target_temperature_celsius;
        self.motor = MotorPosition::Up;
        self.transition(BrewPhase::Heating)
    }

    /// Record a reading. Starts infusing on the first reading at or above target.
    pub fn on_telemetry(&mut self, reading: TelemetryReading) -> Option<PhaseChange> {
        self.reading = reading;

        if self.phase != BrewPhase::Heating || reading.value() < self.target_temperature {
            return None;
        }

        self.motor = MotorPosition::Down;
        self.countdown = Some(Countdown::from_seconds(self.recipe.infusion_seconds()));
        self.transition(BrewPhase::Infusing)
    }

    /// Advance the infusion countdown by one second.
    pub fn tick(&mut self) -> Option<PhaseChange> {
        if self.phase != BrewPhase::Infusing {
            return None;
        }
        let finished = match self.countdown.as_mut() {
            Some(countdown) => countdown.tick(),
            None => true,
        };
        if finished {
            self.enter_terminal(BrewPhase::Ready)
        } else {
            None
        }
    }

    /// Stop the brew. Safe to call in any phase and more than once.
    ///
    /// Always leaves the heater off and the infuser raised.
    pub fn cancel(&mut self) -> Option<PhaseChange> {
        if self.phase.is_terminal() {
            self.switch_off();
            return None;
        }
        self.countdown = None;
        self.enter_terminal(BrewPhase::Cancelled)
    }

    /// The instruction to send on the next poll.
    pub fn instruction(&self) -> Instruction {
        Instruction::brew(self.target_temperature, self.motor)
    }

    /// Current phase.
    pub fn phase(&self) -> BrewPhase {
        self.phase
    }

    /// The recipe being brewed.
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Target temperature currently sent.
    pub fn target_temperature(&self) -> i32 {
        self.target_temperature
    }

    /// Motor position currently sent.
    pub fn motor(&self) -> MotorPosition {
        self.motor
    }

    /// Last reading.
    pub fn reading(&self) -> TelemetryReading {
        self.reading
    }

    /// Seconds of infusion left.
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.countdown.map(|c| c.remaining())
    }

    /// Remaining infusion time as `mm:ss`.
    pub fn countdown_display(&self) -> Option<String> {
        self.countdown.map(|c| c.display())
    }

    /// Take a snapshot for rendering.
    pub fn snapshot(&self) -> BrewSnapshot {
        BrewSnapshot {
            phase: self.phase,
            target_temperature: self.target_temperature,
            motor: self.motor,
            reading: self.reading,
            remaining_seconds: self.countdown.map(|c| c.remaining()),
            elapsed_seconds: self.countdown.map(|c| c.elapsed()),
        }
    }

    fn switch_off(&mut self) {
        self.motor = MotorPosition::Up;
        self.target_temperature = TEMPERATURE_OFF;
    }

    fn enter_terminal(&mut self, phase: BrewPhase) -> Option<PhaseChange> {
        self.switch_off();
        self.transition(phase)
    }

    fn transition(&mut self, to: BrewPhase) -> Option<PhaseChange> {
        let from = self.phase;
        if from == to {
            return None;
        }
        self.phase = to;
        Some(PhaseChange { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sencha() -> Recipe {
        Recipe::new("Sencha", 80, 3)
    }

    fn heating() -> BrewMachine {
        let mut machine = BrewMachine::new(sencha());
        machine.on_connected();
        machine
    }

    #[test]
    fn test_initial_state() {
        let machine = BrewMachine::new(sencha());
        assert_eq!(machine.phase(), BrewPhase::AwaitingConnection);
        assert_eq!(machine.instruction().encode(), "temp>-1000|motor>UP");
        assert_eq!(machine.reading(), TelemetryReading::UNKNOWN);
    }

    #[test]
    fn test_connected_starts_heating() {
        let mut machine = BrewMachine::new(sencha());
        assert_eq!(
            machine.on_connected(),
            Some(PhaseChange {
                from: BrewPhase::AwaitingConnection,
                to: BrewPhase::Heating
            })
        );
        assert_eq!(machine.instruction().encode(), "temp>80|motor>UP");
        assert_eq!(machine.on_connected(), None);
    }

    #[test]
    fn test_sencha_scenario() {
        let mut machine = heating();

        for temp in [20, 50, 79] {
            assert_eq!(machine.on_telemetry(TelemetryReading::new(temp)), None);
            assert_eq!(machine.phase(), BrewPhase::Heating);
        }

        let change = machine.on_telemetry(TelemetryReading::new(80));
        assert_eq!(change.map(|c| c.to), Some(BrewPhase::Infusing));
        assert_eq!(machine.motor(), MotorPosition::Down);
        assert_eq!(machine.instruction().encode(), "temp>80|motor>DOWN");
        assert_eq!(machine.remaining_seconds(), Some(181));
        assert_eq!(machine.countdown_display().as_deref(), Some("03:01"));

        for _ in 0..180 {
            assert_eq!(machine.tick(), None);
        }
        assert_eq!(machine.countdown_display().as_deref(), Some("00:01"));

        let change = machine.tick();
        assert_eq!(change.map(|c| c.to), Some(BrewPhase::Ready));
        assert_eq!(machine.countdown_display().as_deref(), Some("00:00"));
        assert_eq!(machine.instruction().encode(), "temp>-1000|motor>UP");
        assert_eq!(machine.tick(), None);
    }

    #[test]
    fn test_tick_ignored_while_heating() {
        let mut machine = heating();
        assert_eq!(machine.tick(), None);
        assert_eq!(machine.remaining_seconds(), None);
    }

    #[test]
    fn test_readings_after_infusing_do_not_regress() {
        let mut machine = heating();
        machine.on_telemetry(TelemetryReading::new(85));
        assert_eq!(machine.on_telemetry(TelemetryReading::new(60)), None);
        assert_eq!(machine.phase(), BrewPhase::Infusing);
        assert_eq!(machine.reading(), TelemetryReading::new(60));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut machine = heating();
        machine.on_telemetry(TelemetryReading::new(90));

        let change = machine.cancel();
        assert_eq!(
            change,
            Some(PhaseChange {
                from: BrewPhase::Infusing,
                to: BrewPhase::Cancelled
            })
        );
        let first = machine.snapshot();

        assert_eq!(machine.cancel(), None);
        assert_eq!(machine.snapshot(), first);
        assert_eq!(first.motor, MotorPosition::Up);
        assert_eq!(first.target_temperature, TEMPERATURE_OFF);
    }

    #[test]
    fn test_cancel_after_ready_keeps_ready() {
        let mut machine = BrewMachine::new(Recipe::new("Rinse", 60, 0));
        machine.on_connected();
        machine.on_telemetry(TelemetryReading::new(60));
        machine.tick();
        assert_eq!(machine.phase(), BrewPhase::Ready);

        assert_eq!(machine.cancel(), None);
        assert_eq!(machine.phase(), BrewPhase::Ready);
    }

    #[test]
    fn test_cancel_before_connection() {
        let mut machine = BrewMachine::new(sencha());
        assert_eq!(machine.cancel().map(|c| c.to), Some(BrewPhase::Cancelled));
        assert_eq!(machine.on_connected(), None);
        assert_eq!(machine.on_telemetry(TelemetryReading::new(99)), None);
        assert_eq!(machine.instruction(), Instruction::off());
    }

    #[derive(Debug, Clone)]
    enum Input {
        Reading(i32),
        Tick,
    }

    fn input() -> impl Strategy<Value = Input> {
        prop_oneof![
            (-50i32..120).prop_map(Input::Reading),
            Just(Input::Tick),
        ]
    }

    proptest! {
        #[test]
        fn prop_infusing_entered_once_on_first_hot_reading(
            target in 40i32..100,
            inputs in prop::collection::vec(input(), 0..200),
        ) {
            let mut machine = BrewMachine::new(Recipe::new("Any", target, 1));
            machine.on_connected();

            let first_hot = inputs.iter().position(|i| matches!(i, Input::Reading(t) if *t >= target));
            let mut entered_at = Vec::new();
            let mut left_heating = false;

            for (idx, inp) in inputs.iter().enumerate() {
                let change = match inp {
                    Input::Reading(t) => machine.on_telemetry(TelemetryReading::new(*t)),
                    Input::Tick => machine.tick(),
                };
                if let Some(c) = change {
                    if c.to == BrewPhase::Infusing {
                        entered_at.push(idx);
                    }
                }
                if machine.phase() != BrewPhase::Heating {
                    left_heating = true;
                }
                if left_heating {
                    prop_assert_ne!(machine.phase(), BrewPhase::Heating);
                }
            }

            match first_hot {
                Some(idx) => prop_assert_eq!(entered_at, vec![idx]),
                None => prop_assert!(entered_at.is_empty()),
            }
        }

        #[test]
        fn prop_cancel_from_any_state_is_off(
            inputs in prop::collection::vec(input(), 0..50),
            cancels in 1usize..3,
        ) {
            let mut machine = BrewMachine::new(Recipe::new("Any", 70, 0));
            machine.on_connected();
            for inp in &inputs {
                match inp {
                    Input::Reading(t) => { machine.on_telemetry(TelemetryReading::new(*t)); }
                    Input::Tick => { machine.tick(); }
                }
            }
            for _ in 0..cancels {
                machine.cancel();
            }
            prop_assert!(machine.phase().is_terminal());
            prop_assert_eq!(machine.motor(), MotorPosition::Up);
            prop_assert_eq!(machine.target_temperature(), TEMPERATURE_OFF);
        }
    }
}
