//! Discrete-event scheduler driving simulated time.
//!
//! Maintains a time-ordered queue of future events and advances the simulated
//! clock event by event. There is no real parallelism anywhere in the
//! simulator: all waiting is expressed as a scheduled future event, and the
//! handler invoked for each event runs on the single logical thread that
//! called [`EventScheduler::run`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Error type for scheduling failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerError {
    /// A negative or non-finite delay was requested. The queue is untouched.
    InvalidDelay(f64),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::InvalidDelay(delay) => {
                write!(f, "invalid event delay: {}", delay)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

struct QueuedEvent<T> {
    fire_time: f64,
    /// Insertion sequence number; resolves ties at equal fire times in FIFO
    /// order.
    seq: u64,
    payload: T,
}

impl<T> Ord for QueuedEvent<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; compare reversed so the earliest fire
        // time (and the lowest sequence number on ties) surfaces first.
        other
            .fire_time
            .total_cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for QueuedEvent<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for QueuedEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time.total_cmp(&other.fire_time) == Ordering::Equal && self.seq == other.seq
    }
}

impl<T> Eq for QueuedEvent<T> {}

/// Time-ordered event queue with a simulated clock.
///
/// `T` is the event payload dispatched back to the caller; the scheduler
/// itself attaches no meaning to it.
pub struct EventScheduler<T> {
    queue: BinaryHeap<QueuedEvent<T>>,
    now: f64,
    next_seq: u64,
}

impl<T> EventScheduler<T> {
    pub fn new() -> Self {
        EventScheduler {
            queue: BinaryHeap::new(),
            now: 0.0,
            next_seq: 0,
        }
    }

    /// Current simulated time in seconds. Monotonically non-decreasing.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of events still queued.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Insert an event firing `delay` seconds from the current simulated
    /// time. Returns the absolute fire time.
    ///
    /// A negative or non-finite delay is the caller's error and is rejected
    /// without touching the queue.
    pub fn schedule(&mut self, delay: f64, payload: T) -> Result<f64, SchedulerError> {
        if !delay.is_finite() || delay < 0.0 {
            return Err(SchedulerError::InvalidDelay(delay));
        }
        let fire_time = self.now + delay;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueuedEvent {
            fire_time,
            seq,
            payload,
        });
        Ok(fire_time)
    }

    /// Dispatch queued events in time order until the queue is empty or the
    /// next event would fire at or after `stop_time`.
    ///
    /// The handler receives the scheduler itself and may schedule further
    /// events; newly inserted events are ordered against the already-queued
    /// ones. On return the clock rests at `stop_time` (never beyond), or at
    /// its previous value if the run had already passed it.
    pub fn run<F>(&mut self, stop_time: f64, mut handler: F)
    where
        F: FnMut(&mut Self, T),
    {
        while let Some(head) = self.queue.peek() {
            if head.fire_time >= stop_time {
                break;
            }
            let Some(event) = self.queue.pop() else { break };
            self.now = event.fire_time;
            handler(self, event.payload);
        }
        if stop_time > self.now {
            self.now = stop_time;
        }
    }
}

impl<T> Default for EventScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
