//! Rewind scheduling and retention.
//!
//! The scheduler is a two-state timer polled from the frame loop:
//!
//! ```text
//! Inactive --activate--> Active (armed, fires every `interval`)
//! Active --deactivate--> Inactive   (game change, feature off, teardown)
//! ```
//!
//! Each tick is an independent unit, so disarming needs no cleanup. What a
//! tick does lives in [`crate::coordinator::SaveStateCoordinator::take_rewind_snapshot`].

use std::time::{Duration, Instant};

use crate::slot::{SlotId, SlotRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Inactive,
    Active { next_due: Instant, interval: Duration },
}

#[derive(Debug)]
pub struct RewindScheduler {
    state: SchedulerState,
}

impl RewindScheduler {
    pub fn new() -> Self {
        RewindScheduler { state: SchedulerState::Inactive }
    }

    /// Arm the timer. Re-arming restarts the interval.
    pub fn activate(&mut self, now: Instant, interval: Duration) {
        self.state = SchedulerState::Active { next_due: now + interval, interval };
    }

    pub fn deactivate(&mut self) {
        self.state = SchedulerState::Inactive;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SchedulerState::Active { .. })
    }

    /// Returns true when a tick is due at `now`.
    ///
    /// Missed ticks are not replayed: after a long stall the next tick is
    /// one interval from `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match &mut self.state {
            SchedulerState::Active { next_due, interval } if now >= *next_due => {
                *next_due += *interval;
                if *next_due <= now {
                    *next_due = now + *interval;
                }
                true
            }
            _ => false,
        }
    }
}

impl Default for RewindScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Oldest slots to delete so that one more snapshot fits in `max_states`.
///
/// `slots` must be sorted oldest first.
pub fn retention_victims(slots: &[SlotRecord], max_states: usize) -> Vec<SlotId> {
    let excess = (slots.len() + 1).saturating_sub(max_states);
    slots.iter().take(excess).map(|s| s.id).collect()
}
