//! # Timer Scheduler
//!
//! Cancelable timers for the session event loop.
//!
//! The link needs exactly two kinds of timer: the one-shot reconnect attempt
//! and the periodic synthetic tick. The scheduler keeps at most one entry per
//! kind, so arming a timer always replaces the previous one of the same kind
//! and two timers of one kind can never be pending together.
//!
//! Nothing here sleeps. The event loop asks for [`Scheduler::next_deadline`],
//! waits until then, and collects what fired with [`Scheduler::pop_due`].

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// The kinds of timer the link uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// One-shot reconnect attempt after a close
    Reconnect,
    /// Periodic synthetic sample generation
    SyntheticTick,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Instant,
    period: Option<Duration>,
}

/// Table of pending timers, one slot per [`TimerKind`].
#[derive(Debug, Default)]
pub struct Scheduler {
    slots: BTreeMap<TimerKind, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer firing `delay` after `now`, replacing any pending
    /// timer of the same kind.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration, now: Instant) {
        self.slots.insert(
            kind,
            Entry {
                deadline: now + delay,
                period: None,
            },
        );
    }

    /// Arm a periodic timer whose first firing is one `period` after `now`,
    /// replacing any pending timer of the same kind.
    pub fn schedule_periodic(&mut self, kind: TimerKind, period: Duration, now: Instant) {
        let period = period.max(Duration::from_millis(1));
        self.slots.insert(
            kind,
            Entry {
                deadline: now + period,
                period: Some(period),
            },
        );
    }

    /// Cancel the pending timer of `kind`.
    ///
    /// # Returns
    ///
    /// * `bool` - true if a timer was pending
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slots.remove(&kind).is_some()
    }

    /// Whether a timer of `kind` is pending.
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Number of pending timers.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Deadline of the pending timer of `kind`.
    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots.get(&kind).map(|entry| entry.deadline)
    }

    /// Earliest deadline among pending timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().map(|entry| entry.deadline).min()
    }

    /// Remove and return every timer due at `now`, earliest first.
    ///
    /// One-shot timers are removed. Periodic timers are re-armed on their own
    /// cadence; ticks missed while the loop was busy are skipped rather than
    /// replayed in a burst.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = self
            .slots
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(kind, entry)| (entry.deadline, *kind))
            .collect();
        due.sort();

        for (_, kind) in &due {
            let Some(entry) = self.slots.get_mut(kind) else {
                continue;
            };
            match entry.period {
                Some(period) => {
                    while entry.deadline <= now {
                        entry.deadline += period;
                    }
                }
                None => {
                    self.slots.remove(kind);
                }
            }
        }

        due.into_iter().map(|(_, kind)| kind).collect()
    }
}
