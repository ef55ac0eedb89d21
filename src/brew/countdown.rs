//! Infusion countdown.

use crate::utils::format_countdown;

/// Seconds added to the recipe duration when the countdown starts.
pub const COUNTDOWN_EXTRA_SECONDS: u32 = 1;

/// A one-second-per-tick countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Countdown {
    total: u32,
    remaining: u32,
}

impl Countdown {
    /// Start a countdown of `seconds` ticks.
    pub fn from_seconds(seconds: u32) -> Self {
        Self {
            total: seconds,
            remaining: seconds,
        }
    }

    /// Advance by one tick.
    ///
    /// Returns `true` on the tick that reaches zero. Ticking a finished
    /// countdown does nothing and returns `false`.
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    /// Seconds left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Seconds elapsed since the start.
    pub fn elapsed(&self) -> u32 {
        self.total - self.remaining
    }

    /// Length the countdown started with.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Whether zero has been reached.
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Remaining time as `mm:ss`.
    pub fn display(&self) -> String {
        format_countdown(self.remaining)
    }
}
