#![forbid(unsafe_code)]

//! Pending delayed actions.
//!
//! Each control has at most one pending action. Arming a control that is
//! already pending replaces its deadline (the restart semantics of
//! re-pressing a delayed button and of dial-turn coalescing). The
//! dispatcher sleeps until the nearest deadline and drains due entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A control position on the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlId {
    Key(u8),
    Dial(u8),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Instant,
    total: Duration,
}

/// Deadline table for delayed actions.
#[derive(Debug, Default)]
pub struct PendingActions {
    entries: HashMap<ControlId, Entry>,
}

impl PendingActions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or restart) the timer for a control.
    pub fn arm(&mut self, control: ControlId, delay: Duration) {
        self.entries.insert(
            control,
            Entry {
                deadline: Instant::now() + delay,
                total: delay,
            },
        );
    }

    /// Drop a pending action. Returns true if one was pending.
    pub fn cancel(&mut self, control: ControlId) -> bool {
        self.entries.remove(&control).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn is_pending(&self, control: ControlId) -> bool {
        self.entries.contains_key(&control)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The nearest deadline, if anything is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    /// Remaining and total time of a control's timer.
    #[must_use]
    pub fn remaining(&self, control: ControlId, now: Instant) -> Option<(Duration, Duration)> {
        self.entries
            .get(&control)
            .map(|e| (e.deadline.saturating_duration_since(now), e.total))
    }

    /// Remove and return every control whose deadline has passed, ordered
    /// by deadline then position.
    pub fn take_due(&mut self, now: Instant) -> Vec<ControlId> {
        let mut due: Vec<(Instant, ControlId)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(c, e)| (e.deadline, *c))
            .collect();
        due.sort();
        for (_, control) in &due {
            self.entries.remove(control);
        }
        due.into_iter().map(|(_, c)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_replaces_existing_deadline() {
        let mut pending = PendingActions::new();
        pending.arm(ControlId::Key(3), Duration::from_millis(10));
        let first = pending.next_deadline().unwrap();
        pending.arm(ControlId::Key(3), Duration::from_secs(60));
        let second = pending.next_deadline().unwrap();
        assert!(second > first);
        // Still exactly one entry.
        assert_eq!(pending.take_due(Instant::now() + Duration::from_secs(120)).len(), 1);
    }

    #[test]
    fn take_due_leaves_future_entries() {
        let mut pending = PendingActions::new();
        pending.arm(ControlId::Key(0), Duration::from_millis(0));
        pending.arm(ControlId::Dial(1), Duration::from_secs(60));
        let due = pending.take_due(Instant::now() + Duration::from_millis(5));
        assert_eq!(due, vec![ControlId::Key(0)]);
        assert!(pending.is_pending(ControlId::Dial(1)));
    }

    #[test]
    fn due_order_is_by_deadline() {
        let mut pending = PendingActions::new();
        pending.arm(ControlId::Key(5), Duration::from_millis(20));
        pending.arm(ControlId::Key(1), Duration::from_millis(10));
        let due = pending.take_due(Instant::now() + Duration::from_millis(50));
        assert_eq!(due, vec![ControlId::Key(1), ControlId::Key(5)]);
    }

    #[test]
    fn cancel_and_cancel_all() {
        let mut pending = PendingActions::new();
        pending.arm(ControlId::Key(0), Duration::from_secs(1));
        pending.arm(ControlId::Dial(0), Duration::from_secs(1));
        assert!(pending.cancel(ControlId::Key(0)));
        assert!(!pending.cancel(ControlId::Key(0)));
        pending.cancel_all();
        assert!(pending.is_empty());
        assert!(pending.next_deadline().is_none());
    }

    #[test]
    fn remaining_never_goes_negative() {
        let mut pending = PendingActions::new();
        pending.arm(ControlId::Key(0), Duration::from_millis(1));
        let (remaining, total) = pending
            .remaining(ControlId::Key(0), Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(remaining, Duration::ZERO);
        assert_eq!(total, Duration::from_millis(1));
    }
}
