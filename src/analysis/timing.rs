use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Monotonic time source the sampler paces itself against.
pub trait Clock {
    /// Time since an arbitrary fixed epoch.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Handle to a scheduled timer, used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerHandle {
    deadline: Duration,
    id: u64,
}

/// Single-threaded timer set, fired in deadline order (ties in scheduling
/// order).
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: BTreeSet<TimerHandle>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Duration, delay: Duration) -> TimerHandle {
        let handle = TimerHandle {
            deadline: now + delay,
            id: self.next_id,
        };
        self.next_id += 1;
        self.timers.insert(handle);
        handle
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle)
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Sleep until the earliest timer is due and pop it.
    pub fn wait_next(&mut self, clock: &dyn Clock) -> Option<TimerHandle> {
        let next = *self.timers.first()?;
        let now = clock.now();
        if next.deadline > now {
            clock.sleep(next.deadline - now);
        }
        self.timers.remove(&next);
        Some(next)
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let clock = ManualClock::default();
        let mut timers = TimerQueue::new();
        let late = timers.schedule(clock.now(), Duration::from_millis(30));
        let early = timers.schedule(clock.now(), Duration::from_millis(10));

        assert_eq!(timers.wait_next(&clock), Some(early));
        assert_eq!(clock.now(), Duration::from_millis(10));
        assert_eq!(timers.wait_next(&clock), Some(late));
        assert_eq!(clock.now(), Duration::from_millis(30));
        assert_eq!(timers.wait_next(&clock), None);
    }

    #[test]
    fn overdue_timer_fires_without_sleeping() {
        let clock = ManualClock::default();
        let mut timers = TimerQueue::new();
        timers.schedule(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(5));
        assert!(timers.wait_next(&clock).is_some());
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let clock = ManualClock::default();
        let mut timers = TimerQueue::new();
        let handle = timers.schedule(clock.now(), Duration::from_millis(40));
        assert!(timers.cancel(handle));
        assert!(!timers.cancel(handle));
        assert!(timers.is_empty());
        assert_eq!(timers.wait_next(&clock), None);
    }
}
