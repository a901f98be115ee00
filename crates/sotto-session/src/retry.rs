//! Retry queue with exponential backoff for relay publishes.
//!
//! Signaling must be resilient to transient relay outages: a failed
//! publish is queued here instead of surfacing to the caller. The
//! queue is strict FIFO with a single in-flight item at a time, so
//! retried records reach the relay in submission order. After the
//! attempt bound is exhausted the record is dropped and exactly one
//! delivery-failure notification is emitted.

use std::{
    collections::VecDeque,
    ops::{Add, Sub},
    time::Duration,
};

/// Default first retry delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default publish attempt bound (initial attempt plus retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff schedule: base delay doubling up to a cap.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: DEFAULT_BASE_DELAY, cap: DEFAULT_MAX_DELAY }
    }
}

impl Backoff {
    /// A schedule starting at `base` and doubling up to `cap`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the retry following the given failure count.
    ///
    /// Failure counts start at 1: `delay(1)` is the wait after the
    /// first failed attempt.
    pub fn delay(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(1 << doublings);
        delay.min(self.cap)
    }
}

/// Retry queue configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts per record before it is dropped.
    pub max_attempts: u32,
    /// Backoff schedule between attempts.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, backoff: Backoff::default() }
    }
}

#[derive(Debug, Clone)]
struct RetryItem<I> {
    record: String,
    attempts: u32,
    next_eligible: I,
}

/// FIFO retry queue for failed relay publishes.
///
/// Only the head of the queue is ever offered for retry, and only one
/// retry is in flight at a time: later records wait behind earlier
/// ones so relay writes keep submission order.
///
/// Generic over `Instant` to support both real time and virtual time
/// for deterministic testing.
#[derive(Debug, Clone)]
pub struct RetryQueue<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    items: VecDeque<RetryItem<I>>,
    config: RetryConfig,
    in_flight: bool,
}

impl<I> RetryQueue<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    /// Create an empty queue.
    pub fn new(config: RetryConfig) -> Self {
        Self { items: VecDeque::new(), config, in_flight: false }
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The queue configuration.
    #[must_use]
    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// The record currently offered for retry, if any.
    #[must_use]
    pub fn in_flight_record(&self) -> Option<&str> {
        if self.in_flight {
            self.items.front().map(|item| item.record.as_str())
        } else {
            None
        }
    }

    /// Whether the queue holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queue a record whose initial publish failed.
    pub fn enqueue(&mut self, record: String, now: I) {
        let next_eligible = now + self.config.backoff.delay(1);
        self.items.push_back(RetryItem { record, attempts: 1, next_eligible });
    }

    /// Offer the head record for retry if it is due.
    ///
    /// Returns `None` while a retry is already in flight, the queue is
    /// empty, or the head's backoff has not elapsed. The caller must
    /// answer every `Some` with [`report_success`](Self::report_success)
    /// or [`report_failure`](Self::report_failure).
    pub fn tick(&mut self, now: I) -> Option<String> {
        if self.in_flight {
            return None;
        }

        let head = self.items.front()?;
        if now < head.next_eligible {
            return None;
        }

        self.in_flight = true;
        Some(head.record.clone())
    }

    /// The in-flight retry reached the relay; drop the record.
    pub fn report_success(&mut self) {
        self.in_flight = false;
        self.items.pop_front();
    }

    /// The in-flight retry failed.
    ///
    /// Reschedules the record with the next backoff step, or, once the
    /// attempt bound is exhausted, drops it and returns it so the
    /// caller can emit exactly one delivery-failure notification.
    pub fn report_failure(&mut self, now: I) -> Option<String> {
        self.in_flight = false;
        let head = self.items.front_mut()?;

        head.attempts += 1;
        if head.attempts > self.config.max_attempts {
            tracing::warn!(
                attempts = head.attempts,
                "dropping record after exhausting publish retries"
            );
            return self.items.pop_front().map(|item| item.record);
        }

        head.next_eligible = now + self.config.backoff.delay(head.attempts);
        None
    }

    /// Drop every queued record (room teardown).
    pub fn clear(&mut self) {
        self.items.clear();
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Virtual instant for deterministic scheduling tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct VInstant(Duration);

    impl Add<Duration> for VInstant {
        type Output = Self;
        fn add(self, rhs: Duration) -> Self {
            Self(self.0 + rhs)
        }
    }

    impl Sub for VInstant {
        type Output = Duration;
        fn sub(self, rhs: Self) -> Duration {
            self.0 - rhs.0
        }
    }

    const T0: VInstant = VInstant(Duration::ZERO);

    fn at_secs(secs: u64) -> VInstant {
        VInstant(Duration::from_secs(secs))
    }

    #[test]
    fn backoff_doubles_to_cap() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(4), Duration::from_secs(16));
        assert_eq!(backoff.delay(5), Duration::from_secs(30), "capped at 30s");
        assert_eq!(backoff.delay(50), Duration::from_secs(30), "large counts stay capped");
    }

    #[test]
    fn head_is_not_offered_before_backoff_elapses() {
        let mut queue = RetryQueue::new(RetryConfig::default());
        queue.enqueue("r1".to_owned(), T0);

        assert_eq!(queue.tick(at_secs(1)), None);
        assert_eq!(queue.tick(at_secs(2)), Some("r1".to_owned()));
    }

    #[test]
    fn only_one_retry_in_flight() {
        let mut queue = RetryQueue::new(RetryConfig::default());
        queue.enqueue("r1".to_owned(), T0);

        assert!(queue.tick(at_secs(5)).is_some());
        assert_eq!(queue.tick(at_secs(5)), None, "in-flight retry blocks the queue");

        queue.report_success();
        assert!(queue.is_empty());
    }

    #[test]
    fn records_retry_in_submission_order() {
        let mut queue = RetryQueue::new(RetryConfig::default());
        queue.enqueue("first".to_owned(), T0);
        queue.enqueue("second".to_owned(), T0);

        assert_eq!(queue.tick(at_secs(10)), Some("first".to_owned()));
        queue.report_success();

        // "second" was due long ago but still waited behind "first".
        assert_eq!(queue.tick(at_secs(10)), Some("second".to_owned()));
    }

    #[test]
    fn failure_reschedules_with_longer_delay() {
        let mut queue = RetryQueue::new(RetryConfig::default());
        queue.enqueue("r1".to_owned(), T0);

        assert!(queue.tick(at_secs(2)).is_some());
        assert_eq!(queue.report_failure(at_secs(2)), None);

        // Second failure: next delay is 4s from the failure time.
        assert_eq!(queue.tick(at_secs(5)), None);
        assert!(queue.tick(at_secs(6)).is_some());
    }

    #[test]
    fn exhausted_record_is_dropped_exactly_once() {
        let mut queue = RetryQueue::new(RetryConfig::default());
        queue.enqueue("doomed".to_owned(), T0);

        // Initial failure already counted; four more keep it queued.
        let mut now = T0;
        for _ in 0..4 {
            now = now + Duration::from_secs(60);
            assert!(queue.tick(now).is_some());
            assert_eq!(queue.report_failure(now), None);
        }

        // Attempt bound (5) exhausted: dropped, returned once.
        now = now + Duration::from_secs(60);
        assert!(queue.tick(now).is_some());
        assert_eq!(queue.report_failure(now), Some("doomed".to_owned()));
        assert!(queue.is_empty());
        assert_eq!(queue.tick(now + Duration::from_secs(60)), None);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = RetryQueue::new(RetryConfig::default());
        queue.enqueue("r1".to_owned(), T0);
        queue.enqueue("r2".to_owned(), T0);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.tick(at_secs(60)), None);
    }
}
