//! Shared brew state and event fan-out.
//!
//! The poller and the countdown timer both drive the same [`BrewMachine`]
//! through a [`BrewController`]. Every change is published on a broadcast
//! channel, and the phase is also mirrored on a `watch` channel so tasks can
//! wait for a particular phase.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::brew::machine::{BrewMachine, BrewPhase, BrewSnapshot, PhaseChange};
use crate::brew::recipe::Recipe;
use crate::protocol::{Instruction, TelemetryReading};

/// Capacity of the event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something that happened during a brew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrewEvent {
    /// The phase changed.
    PhaseChanged(PhaseChange),
    /// The kettle reported a temperature.
    TemperatureUpdated(TelemetryReading),
    /// One second of infusion elapsed.
    CountdownTick {
        /// Seconds left after this tick.
        remaining_seconds: u32,
    },
    /// The poller gave up on the link.
    ConnectionLost {
        /// Failed cycles in a row when the poller gave up.
        consecutive_failures: u32,
    },
}

/// Thread-safe handle on a brew.
pub struct BrewController {
    machine: RwLock<BrewMachine>,
    events: broadcast::Sender<BrewEvent>,
    phase: watch::Sender<BrewPhase>,
}

impl BrewController {
    /// Create a controller for `recipe`, awaiting connection.
    pub fn new(recipe: Recipe) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (phase, _) = watch::channel(BrewPhase::AwaitingConnection);
        Self {
            machine: RwLock::new(BrewMachine::new(recipe)),
            events,
            phase,
        }
    }

    /// Subscribe to brew events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrewEvent> {
        self.events.subscribe()
    }

    /// Watch the phase.
    pub fn watch_phase(&self) -> watch::Receiver<BrewPhase> {
        self.phase.subscribe()
    }

    /// Current phase.
    pub fn phase(&self) -> BrewPhase {
        self.machine.read().phase()
    }

    /// Snapshot of the brew.
    pub fn snapshot(&self) -> BrewSnapshot {
        self.machine.read().snapshot()
    }

    /// The recipe being brewed.
    pub fn recipe(&self) -> Recipe {
        self.machine.read().recipe().clone()
    }

    /// Instruction for the next poll.
    pub fn instruction(&self) -> Instruction {
        self.machine.read().instruction()
    }

    /// The serial link opened.
    pub fn on_connected(&self) -> Option<PhaseChange> {
        let change = self.machine.write().on_connected();
        self.publish_change(change);
        change
    }

    /// Apply a temperature reading.
    pub fn on_telemetry(&self, reading: TelemetryReading) -> Option<PhaseChange> {
        let change = self.machine.write().on_telemetry(reading);
        let _ = self.events.send(BrewEvent::TemperatureUpdated(reading));
        self.publish_change(change);
        change
    }

    /// Advance the countdown by one second.
    pub fn tick(&self) -> Option<PhaseChange> {
        let (change, remaining) = {
            let mut machine = self.machine.write();
            let infusing = machine.phase() == BrewPhase::Infusing;
            let change = machine.tick();
            (change, machine.remaining_seconds().filter(|_| infusing))
        };
        if let Some(remaining_seconds) = remaining {
            let _ = self
                .events
                .send(BrewEvent::CountdownTick { remaining_seconds });
        }
        self.publish_change(change);
        change
    }

    /// Cancel the brew. Idempotent.
    pub fn cancel(&self) -> Option<PhaseChange> {
        let change = self.machine.write().cancel();
        self.publish_change(change);
        change
    }

    /// The poller gave up on the link; the brew is cancelled.
    pub fn connection_lost(&self, consecutive_failures: u32) -> Option<PhaseChange> {
        let _ = self.events.send(BrewEvent::ConnectionLost {
            consecutive_failures,
        });
        self.cancel()
    }

    fn publish_change(&self, change: Option<PhaseChange>) {
        if let Some(change) = change {
            info!("Brew phase: {} -> {}", change.from, change.to);
            self.phase.send_replace(change.to);
            let _ = self.events.send(BrewEvent::PhaseChanged(change));
        }
    }
}

impl std::fmt::Debug for BrewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrewController")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Drive the infusion countdown.
///
/// Waits for the brew to reach [`BrewPhase::Infusing`], then ticks once per
/// `period` until the phase changes. Returns early if the brew ends first.
pub async fn run_countdown(controller: Arc<BrewController>, period: Duration) {
    let mut phase = controller.watch_phase();

    loop {
        let current = *phase.borrow_and_update();
        if current == BrewPhase::Infusing {
            break;
        }
        if current.is_terminal() {
            debug!("Brew ended before infusing, countdown not started");
            return;
        }
        if phase.changed().await.is_err() {
            warn!("Phase channel closed, countdown not started");
            return;
        }
    }

    debug!("Infusion countdown started");
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while controller.phase() == BrewPhase::Infusing {
        interval.tick().await;
        controller.tick();
    }
    debug!("Infusion countdown stopped in phase {}", controller.phase());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MotorPosition;
    use pretty_assertions::assert_eq;

    fn controller(minutes: u32) -> Arc<BrewController> {
        Arc::new(BrewController::new(Recipe::new("Sencha", 80, minutes)))
    }

    fn drain(rx: &mut broadcast::Receiver<BrewEvent>) -> Vec<BrewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_events_follow_transitions() {
        let controller = controller(3);
        let mut rx = controller.subscribe();

        controller.on_connected();
        controller.on_telemetry(TelemetryReading::new(79));
        controller.on_telemetry(TelemetryReading::new(80));

        assert_eq!(
            drain(&mut rx),
            vec![
                BrewEvent::PhaseChanged(PhaseChange {
                    from: BrewPhase::AwaitingConnection,
                    to: BrewPhase::Heating,
                }),
                BrewEvent::TemperatureUpdated(TelemetryReading::new(79)),
                BrewEvent::TemperatureUpdated(TelemetryReading::new(80)),
                BrewEvent::PhaseChanged(PhaseChange {
                    from: BrewPhase::Heating,
                    to: BrewPhase::Infusing,
                }),
            ]
        );
        assert_eq!(*controller.watch_phase().borrow(), BrewPhase::Infusing);
    }

    #[test]
    fn test_tick_publishes_remaining() {
        let controller = controller(3);
        controller.on_connected();
        controller.on_telemetry(TelemetryReading::new(85));
        let mut rx = controller.subscribe();

        controller.tick();
        assert_eq!(
            drain(&mut rx),
            vec![BrewEvent::CountdownTick {
                remaining_seconds: 180
            }]
        );
    }

    #[test]
    fn test_tick_before_infusing_is_silent() {
        let controller = controller(3);
        controller.on_connected();
        let mut rx = controller.subscribe();

        assert_eq!(controller.tick(), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_connection_lost_cancels() {
        let controller = controller(3);
        controller.on_connected();
        let mut rx = controller.subscribe();

        controller.connection_lost(10);

        assert_eq!(controller.phase(), BrewPhase::Cancelled);
        assert_eq!(controller.snapshot().motor, MotorPosition::Up);
        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            BrewEvent::ConnectionLost {
                consecutive_failures: 10
            }
        );
        assert!(matches!(
            events[1],
            BrewEvent::PhaseChanged(PhaseChange {
                to: BrewPhase::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_to_ready() {
        let controller = controller(0);
        controller.on_connected();

        let task = tokio::spawn(run_countdown(controller.clone(), Duration::from_secs(1)));
        tokio::task::yield_now().await;
        assert_eq!(controller.phase(), BrewPhase::Heating);

        controller.on_telemetry(TelemetryReading::new(80));
        task.await.unwrap();

        assert_eq!(controller.phase(), BrewPhase::Ready);
        assert_eq!(controller.snapshot().remaining_seconds, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_full_recipe() {
        let controller = controller(3);
        controller.on_connected();
        controller.on_telemetry(TelemetryReading::new(80));

        let started = Instant::now();
        run_countdown(controller.clone(), Duration::from_secs(1)).await;

        assert_eq!(controller.phase(), BrewPhase::Ready);
        assert_eq!(started.elapsed(), Duration::from_secs(181));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_stops_on_cancel() {
        let controller = controller(3);
        controller.on_connected();
        controller.on_telemetry(TelemetryReading::new(80));

        let task = tokio::spawn(run_countdown(controller.clone(), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        controller.cancel();
        task.await.unwrap();

        assert_eq!(controller.phase(), BrewPhase::Cancelled);
        assert_eq!(controller.snapshot().remaining_seconds, None);
    }

    #[tokio::test]
    async fn test_countdown_not_started_after_cancel() {
        let controller = controller(3);
        controller.cancel();
        run_countdown(controller.clone(), Duration::from_secs(1)).await;
        assert_eq!(controller.phase(), BrewPhase::Cancelled);
    }
}
