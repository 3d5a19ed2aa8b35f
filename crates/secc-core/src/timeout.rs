//! Per-session countdown timers
//!
//! One independently armable slot per timeout kind. Sequence timeouts bound
//! the time the vehicle has to send its next request; the remaining kinds
//! bound slow station-side work. `check` is called once per loop iteration
//! and reports each expiry exactly once; the slot stays occupied until the
//! owning state explicitly stops it, and re-arming an occupied slot is a
//! usage error.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// The timeout kinds a session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The vehicle must send its next request within this window.
    Sequence,
    /// The cable check must finish in the power hardware within this window.
    CableCheck,
    /// The pre-charge voltage ramp must converge within this window.
    PreCharge,
}

impl TimeoutKind {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            TimeoutKind::Sequence => 0,
            TimeoutKind::CableCheck => 1,
            TimeoutKind::PreCharge => 2,
        }
    }

    fn from_index(index: usize) -> Self {
        match index {
            0 => TimeoutKind::Sequence,
            1 => TimeoutKind::CableCheck,
            _ => TimeoutKind::PreCharge,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("timeout {0:?} is already armed")]
    AlreadyArmed(TimeoutKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Armed(Instant),
    /// Expired and reported; stays latched until stopped.
    Expired,
}

/// Fixed array of countdown timers, one slot per kind.
#[derive(Debug)]
pub struct TimeoutSet {
    slots: [Slot; TimeoutKind::COUNT],
}

impl Default for TimeoutSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutSet {
    pub fn new() -> Self {
        Self {
            slots: [Slot::Idle; TimeoutKind::COUNT],
        }
    }

    /// Arm a slot. Fails if it is already occupied; the caller must `stop`
    /// first when it intends to restart a window.
    pub fn start(&mut self, kind: TimeoutKind, duration: Duration) -> Result<(), TimeoutError> {
        let slot = &mut self.slots[kind.index()];
        if *slot != Slot::Idle {
            return Err(TimeoutError::AlreadyArmed(kind));
        }
        *slot = Slot::Armed(Instant::now() + duration);
        Ok(())
    }

    /// Disarm a slot, whether armed, expired, or idle.
    pub fn stop(&mut self, kind: TimeoutKind) {
        self.slots[kind.index()] = Slot::Idle;
    }

    /// Stop and start in one step for states that restart a window.
    pub fn restart(&mut self, kind: TimeoutKind, duration: Duration) {
        self.stop(kind);
        // The slot is idle now, so this cannot fail.
        let _ = self.start(kind, duration);
    }

    pub fn is_armed(&self, kind: TimeoutKind) -> bool {
        matches!(self.slots[kind.index()], Slot::Armed(_))
    }

    /// Report newly expired kinds, ordered by their original deadline.
    pub fn check(&mut self) -> Vec<TimeoutKind> {
        self.check_at(Instant::now())
    }

    /// Deterministic variant of `check` for tests.
    pub fn check_at(&mut self, now: Instant) -> Vec<TimeoutKind> {
        let mut expired: Vec<(Instant, TimeoutKind)> = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Armed(deadline) = *slot {
                if deadline <= now {
                    *slot = Slot::Expired;
                    expired.push((deadline, TimeoutKind::from_index(index)));
                }
            }
        }
        expired.sort_by_key(|(deadline, _)| *deadline);
        expired.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn not_expired_before_deadline() {
        let mut set = TimeoutSet::new();
        set.start(TimeoutKind::Sequence, Duration::from_secs(60)).unwrap();
        assert_eq!(set.check_at(Instant::now()), vec![]);
        assert!(set.is_armed(TimeoutKind::Sequence));
    }

    #[test]
    fn reported_exactly_once() {
        let mut set = TimeoutSet::new();
        set.start(TimeoutKind::Sequence, Duration::from_millis(1)).unwrap();
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(set.check_at(later), vec![TimeoutKind::Sequence]);
        assert_eq!(set.check_at(later), vec![]);
    }

    #[test]
    fn rearm_requires_stop() {
        let mut set = TimeoutSet::new();
        set.start(TimeoutKind::CableCheck, Duration::from_secs(1)).unwrap();
        assert_eq!(
            set.start(TimeoutKind::CableCheck, Duration::from_secs(2)),
            Err(TimeoutError::AlreadyArmed(TimeoutKind::CableCheck))
        );
        set.stop(TimeoutKind::CableCheck);
        set.start(TimeoutKind::CableCheck, Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn expired_slot_still_counts_as_occupied() {
        let mut set = TimeoutSet::new();
        set.start(TimeoutKind::PreCharge, Duration::from_millis(1)).unwrap();
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(set.check_at(later), vec![TimeoutKind::PreCharge]);
        assert_eq!(
            set.start(TimeoutKind::PreCharge, Duration::from_secs(1)),
            Err(TimeoutError::AlreadyArmed(TimeoutKind::PreCharge))
        );
    }

    #[test]
    fn simultaneous_expiries_ordered_by_deadline() {
        let mut set = TimeoutSet::new();
        // PreCharge armed with the earlier deadline despite later slot index.
        set.start(TimeoutKind::PreCharge, Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        set.start(TimeoutKind::Sequence, Duration::from_millis(1)).unwrap();
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(
            set.check_at(later),
            vec![TimeoutKind::PreCharge, TimeoutKind::Sequence]
        );
    }
}
