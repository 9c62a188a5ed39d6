//! Timer queue
//!
//! Deadline-ordered one-shot timers serviced from the main loop between
//! events. Timers never hold references to windows; a fired timer whose
//! owner has gone away is simply ignored by its handler.

use std::time::{Duration, Instant};

use x11rb::protocol::xproto::Window;

use crate::wm::timestamp::Timestamp;

pub type TimerId = u64;

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// No pong arrived for this ping in time
    PingTimeout { window: Window, timestamp: Timestamp },
    /// Re-run a resize that was throttled
    ResizeCompensation,
    /// Raise a window that still has focus
    AutoRaise { window: Window },
}

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    deadline: Instant,
    kind: TimerKind,
}

/// Source of monotonic time, replaceable in tests
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real monotonic clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Pending timers, earliest first
#[derive(Debug)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: TimerId,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
        }
    }

    /// Arm a timer firing `delay` after `now`
    pub fn add(&mut self, now: Instant, delay: Duration, kind: TimerKind) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now + delay;
        let pos = self
            .timers
            .iter()
            .position(|t| t.deadline > deadline)
            .unwrap_or(self.timers.len());
        self.timers.insert(pos, Timer { id, deadline, kind });
        id
    }

    /// Remove a timer; returns whether it was still pending
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.first().map(|t| t.deadline)
    }

    /// Take the earliest timer if it is due
    pub fn pop_expired(&mut self, now: Instant) -> Option<(TimerId, TimerKind)> {
        if self.timers.first().is_some_and(|t| t.deadline <= now) {
            let timer = self.timers.remove(0);
            Some((timer.id, timer.kind))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let start = Instant::now();
        let late = queue.add(start, Duration::from_millis(50), TimerKind::ResizeCompensation);
        let early = queue.add(start, Duration::from_millis(10), TimerKind::AutoRaise { window: 7 });

        assert_eq!(queue.next_deadline(), Some(start + Duration::from_millis(10)));
        assert_eq!(queue.pop_expired(start), None);

        let (id, kind) = queue.pop_expired(start + Duration::from_millis(60)).unwrap();
        assert_eq!(id, early);
        assert_eq!(kind, TimerKind::AutoRaise { window: 7 });
        let (id, _) = queue.pop_expired(start + Duration::from_millis(60)).unwrap();
        assert_eq!(id, late);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_is_exact() {
        let mut queue = TimerQueue::new();
        let start = Instant::now();
        let id = queue.add(start, Duration::from_millis(5), TimerKind::ResizeCompensation);
        assert!(queue.is_pending(id));
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert_eq!(queue.pop_expired(start + Duration::from_secs(1)), None);
    }
}
