//! One-Shot Timer Scheduling
//!
//! Cooperative, single-threaded timers over a virtual millisecond clock.
//!
//! Timers carry an explicit payload (usually [`TimerKind`](crate::engine::pad::TimerKind))
//! instead of a closure, so a firing can always be matched back to the session
//! or element that scheduled it and re-validated before it acts.
//!
//! The scheduler never looks at a wall clock. The owner advances time by
//! calling [`TimerScheduler::pop_due`] with the current timestamp, either from
//! incoming event timestamps (replay) or from a tokio sleep (live driver).
//!
//! Cancellation is lazy: a cancelled timer is forgotten immediately, and its
//! queue entry is skipped when it reaches the front.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Milliseconds on the engine clock
pub type Millis = u64;

/// Opaque timer identifier, unique for the scheduler's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Cancellable handle to a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: TimerId,
    delay_ms: Millis,
}

impl TimerHandle {
    /// Timer identifier
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Delay the timer was scheduled with
    pub fn delay_ms(&self) -> Millis {
        self.delay_ms
    }
}

/// A timer that reached its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer<T> {
    /// Handle the timer was scheduled under
    pub handle: TimerHandle,
    /// Deadline the timer fired at
    pub deadline: Millis,
    /// Payload supplied at scheduling time
    pub payload: T,
}

#[derive(Debug)]
struct PendingTimer<T> {
    deadline: Millis,
    delay_ms: Millis,
    payload: T,
}

/// Timer scheduler
#[derive(Debug)]
pub struct TimerScheduler<T> {
    next_id: u64,
    queue: BinaryHeap<Reverse<(Millis, u64)>>,
    pending: HashMap<u64, PendingTimer<T>>,
}

impl<T> TimerScheduler<T> {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
        }
    }

    /// Schedule `payload` to fire `delay_ms` after `now`
    pub fn schedule(&mut self, now: Millis, delay_ms: Millis, payload: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = now.saturating_add(delay_ms);
        self.queue.push(Reverse((deadline, id)));
        self.pending.insert(
            id,
            PendingTimer {
                deadline,
                delay_ms,
                payload,
            },
        );

        TimerHandle {
            id: TimerId(id),
            delay_ms,
        }
    }

    /// Cancel a timer.
    ///
    /// Returns `true` if the timer was still pending. Cancelling a fired or
    /// already-cancelled handle is a no-op.
    pub fn cancel(&mut self, handle: &TimerHandle) -> bool {
        self.pending.remove(&handle.id.0).is_some()
    }

    /// Pop the earliest timer whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: Millis) -> Option<FiredTimer<T>> {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if deadline > now {
                return None;
            }
            self.queue.pop();

            if let Some(timer) = self.pending.remove(&id) {
                return Some(FiredTimer {
                    handle: TimerHandle {
                        id: TimerId(id),
                        delay_ms: timer.delay_ms,
                    },
                    deadline: timer.deadline,
                    payload: timer.payload,
                });
            }
        }
        None
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&mut self) -> Option<Millis> {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if self.pending.contains_key(&id) {
                return Some(deadline);
            }
            self.queue.pop();
        }
        None
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timers are pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending timer
    pub fn clear(&mut self) {
        self.pending.clear();
        self.queue.clear();
    }
}

impl<T> Default for TimerScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Auto-repeat delay sequence: `initial`, then `max(floor, previous - decrement)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSchedule {
    /// Delay before the first repeat
    pub initial_ms: Millis,
    /// Amount subtracted after each repeat
    pub decrement_ms: Millis,
    /// Delay never goes below this
    pub floor_ms: Millis,
}

impl RepeatSchedule {
    /// Delay that follows `previous_ms`
    pub fn next_delay(&self, previous_ms: Millis) -> Millis {
        previous_ms
            .saturating_sub(self.decrement_ms)
            .max(self.floor_ms)
    }

    /// First `count` delays of the sequence
    pub fn delays(&self, count: usize) -> Vec<Millis> {
        let mut out = Vec::with_capacity(count);
        let mut delay = self.initial_ms;
        for _ in 0..count {
            out.push(delay);
            delay = self.next_delay(delay);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = TimerScheduler::new();
        timers.schedule(0, 300, "late");
        timers.schedule(0, 100, "early");
        timers.schedule(50, 100, "middle");

        assert!(timers.pop_due(99).is_none());
        assert_eq!(timers.pop_due(1000).unwrap().payload, "early");
        assert_eq!(timers.pop_due(1000).unwrap().payload, "middle");
        assert_eq!(timers.pop_due(1000).unwrap().payload, "late");
        assert!(timers.pop_due(1000).is_none());
    }

    #[test]
    fn test_ties_fire_in_scheduling_order() {
        let mut timers = TimerScheduler::new();
        timers.schedule(0, 100, 1);
        timers.schedule(0, 100, 2);
        timers.schedule(0, 100, 3);

        let order: Vec<i32> = std::iter::from_fn(|| timers.pop_due(100).map(|f| f.payload)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timers = TimerScheduler::new();
        let handle = timers.schedule(0, 100, ());

        assert!(timers.cancel(&handle));
        assert!(!timers.cancel(&handle));
        assert!(timers.pop_due(1000).is_none());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut timers = TimerScheduler::new();
        let handle = timers.schedule(0, 100, "once");

        let fired = timers.pop_due(100).unwrap();
        assert_eq!(fired.handle, handle);
        assert_eq!(fired.deadline, 100);

        assert!(!timers.cancel(&handle));
        assert!(!timers.cancel(&handle));
        assert!(timers.pop_due(10_000).is_none());
    }

    #[test]
    fn test_next_deadline_skips_cancelled() {
        let mut timers = TimerScheduler::new();
        let first = timers.schedule(0, 100, ());
        timers.schedule(0, 200, ());

        assert_eq!(timers.next_deadline(), Some(100));
        timers.cancel(&first);
        assert_eq!(timers.next_deadline(), Some(200));
        assert_eq!(timers.len(), 1);

        timers.clear();
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_repeat_schedule_decays_to_floor() {
        let schedule = RepeatSchedule {
            initial_ms: 500,
            decrement_ms: 50,
            floor_ms: 350,
        };
        assert_eq!(schedule.delays(6), vec![500, 450, 400, 350, 350, 350]);
    }

    #[test]
    fn test_repeat_schedule_trackpad_zones() {
        let schedule = RepeatSchedule {
            initial_ms: 350,
            decrement_ms: 25,
            floor_ms: 75,
        };
        let delays = schedule.delays(20);
        assert_eq!(delays[0], 350);
        assert_eq!(delays[1], 325);
        assert_eq!(*delays.last().unwrap(), 75);
    }
}
