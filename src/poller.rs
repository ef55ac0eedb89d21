//! Telemetry poller.
//!
//! One cycle sends the current instruction, waits for one reply and feeds the
//! decoded temperature to the brew controller. Cycles never overlap: the next
//! send happens one cadence after the previous reply (or failure).
//!
//! I/O failures during polling are logged and the last reading is kept. After
//! `max_consecutive_failures` failed cycles in a row the poller reports the
//! connection as lost, which cancels the brew.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::brew::{BrewController, BrewPhase};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::protocol::{decode, Instruction, TelemetryReading};
use crate::transport::FramedTransport;

/// Result of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The reply carried a temperature.
    Updated(TelemetryReading),
    /// A reply arrived without a usable temperature.
    NoUpdate,
    /// The instruction could not be written; no reply was awaited.
    WriteFailed,
    /// No reply could be read.
    ReadFailed,
}

impl PollOutcome {
    /// Whether this cycle counts toward the failure limit.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::WriteFailed | Self::ReadFailed)
    }
}

/// Why the poller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    /// The stop signal was raised or dropped.
    Stopped,
    /// The brew was cancelled.
    Cancelled,
    /// Too many failed cycles in a row.
    ConnectionLost,
}

/// Periodic send/receive loop over one transport.
pub struct TelemetryPoller {
    transport: FramedTransport,
    controller: Arc<BrewController>,
    cadence: Duration,
    read_timeout: Option<Duration>,
    max_consecutive_failures: Option<u32>,
    final_instruction_timeout: Duration,
    consecutive_failures: u32,
    reply_abandoned: bool,
}

impl TelemetryPoller {
    /// Create a poller that owns `transport`.
    pub fn new(
        transport: FramedTransport,
        controller: Arc<BrewController>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            transport,
            controller,
            cadence: config.cadence,
            read_timeout: config.read_timeout,
            max_consecutive_failures: config.max_consecutive_failures,
            final_instruction_timeout: config.final_instruction_timeout,
            consecutive_failures: 0,
            reply_abandoned: false,
        }
    }

    /// Failed cycles since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one send/receive cycle.
    ///
    /// If the previous cycle timed out, whatever the teapot sent since then
    /// is dropped first so this cycle reads the reply to its own request.
    pub async fn poll_once(&mut self) -> PollOutcome {
        if std::mem::take(&mut self.reply_abandoned) {
            let dropped = self.transport.discard_pending();
            if dropped > 0 {
                debug!("Dropped {} late replies", dropped);
            }
        }

        let line = self.controller.instruction().encode();

        if let Err(e) = self.transport.write_line(&line).await {
            warn!("Failed to send instruction, skipping cycle: {}", e);
            return PollOutcome::WriteFailed;
        }

        let reply = match self.transport.read_line(self.read_timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("No reply from teapot, keeping last reading: {}", e);
                self.reply_abandoned = matches!(e, Error::Timeout);
                return PollOutcome::ReadFailed;
            }
        };

        match TelemetryReading::from_reply(&decode(&reply)) {
            Some(reading) => {
                self.controller.on_telemetry(reading);
                PollOutcome::Updated(reading)
            }
            None => {
                debug!("Reply without temperature: {:?}", reply);
                PollOutcome::NoUpdate
            }
        }
    }

    /// Poll until stopped, cancelled or the link is given up on.
    ///
    /// On the way out a last off instruction is sent and the transport is
    /// closed. Each step is bounded by the final instruction timeout, so a
    /// backend that never finishes disconnecting cannot hold up the caller.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> PollerExit {
        info!(
            "Polling {} every {:?}",
            self.transport.identity().name,
            self.cadence
        );

        let exit = loop {
            if *stop.borrow_and_update() {
                break PollerExit::Stopped;
            }
            if self.controller.phase() == BrewPhase::Cancelled {
                break PollerExit::Cancelled;
            }

            let outcome = tokio::select! {
                outcome = self.poll_once() => outcome,
                _ = stopped(&mut stop) => break PollerExit::Stopped,
            };

            if outcome.is_failure() {
                self.consecutive_failures += 1;
                if let Some(limit) = self.max_consecutive_failures {
                    if self.consecutive_failures >= limit {
                        error!(
                            "Giving up on {} after {} failed cycles",
                            self.transport.identity().name,
                            self.consecutive_failures
                        );
                        self.controller.connection_lost(self.consecutive_failures);
                        break PollerExit::ConnectionLost;
                    }
                }
            } else {
                self.consecutive_failures = 0;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cadence) => {}
                _ = stopped(&mut stop) => break PollerExit::Stopped,
            }
        };

        self.shutdown().await;
        info!("Poller exited: {:?}", exit);
        exit
    }

    async fn shutdown(&mut self) {
        if self.transport.is_open() {
            let off = Instruction::off().encode();
            match tokio::time::timeout(
                self.final_instruction_timeout,
                self.transport.write_line(&off),
            )
            .await
            {
                Ok(Ok(())) => debug!("Sent final off instruction"),
                Ok(Err(e)) => warn!("Failed to send final off instruction: {}", e),
                Err(_) => warn!("Timed out sending final off instruction"),
            }
        }
        if tokio::time::timeout(self.final_instruction_timeout, self.transport.close())
            .await
            .is_err()
        {
            warn!(
                "Timed out closing link to {}, dropping it",
                self.transport.identity().name
            );
        }
    }
}

/// Resolves once `stop` is raised or its sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}
