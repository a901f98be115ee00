//! Property-based tests for the retry queue.
//!
//! These verify the delivery-failure bounds for ALL interleavings of
//! outcomes, not just specific schedules: a record is retried at most
//! `max_attempts` times in total, dropped records are reported exactly
//! once, and FIFO order holds whatever the outcome sequence.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

use proptest::prelude::*;
use sotto_session::{RetryConfig, RetryQueue};

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

#[test]
fn prop_each_record_is_dropped_at_most_once() {
    proptest!(|(outcomes in prop::collection::vec(any::<bool>(), 1..64), records in 1usize..8)| {
        let mut queue = RetryQueue::new(RetryConfig::default());
        let mut now = VInstant(Duration::ZERO);

        for i in 0..records {
            queue.enqueue(format!("record-{i}"), now);
        }

        let mut drops: Vec<String> = Vec::new();
        for delivered in outcomes {
            now = now + Duration::from_secs(60);
            let Some(record) = queue.tick(now) else {
                continue;
            };

            if delivered {
                queue.report_success();
            } else if let Some(dropped) = queue.report_failure(now) {
                prop_assert_eq!(&dropped, &record);
                drops.push(dropped);
            }
        }

        // PROPERTY: no record is ever reported dropped twice.
        let mut unique = drops.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), drops.len());
    });
}

#[test]
fn prop_retries_respect_fifo_order() {
    proptest!(|(outcomes in prop::collection::vec(any::<bool>(), 1..128))| {
        let mut queue = RetryQueue::new(RetryConfig::default());
        let mut now = VInstant(Duration::ZERO);

        for i in 0..4 {
            queue.enqueue(format!("record-{i}"), now);
        }

        // Track the order records leave the queue (delivered or
        // dropped); it must match submission order.
        let mut departures = Vec::new();

        for delivered in outcomes {
            now = now + Duration::from_secs(60);
            let Some(record) = queue.tick(now) else {
                break;
            };

            if delivered {
                queue.report_success();
                departures.push(record);
            } else if let Some(dropped) = queue.report_failure(now) {
                departures.push(dropped);
            }
        }

        for (i, record) in departures.iter().enumerate() {
            prop_assert_eq!(record, &format!("record-{i}"));
        }
    });
}

#[test]
fn prop_a_record_is_attempted_at_most_max_attempts_times() {
    proptest!(|(extra_ticks in 0usize..32)| {
        let config = RetryConfig::default();
        let mut queue = RetryQueue::new(config);
        let mut now = VInstant(Duration::ZERO);

        queue.enqueue("doomed".to_owned(), now);

        let mut retries = 0;
        for _ in 0..(config.max_attempts as usize + extra_ticks) {
            now = now + Duration::from_secs(60);
            if queue.tick(now).is_some() {
                retries += 1;
                let _ = queue.report_failure(now);
            }
        }

        // PROPERTY: the initial attempt plus retries never exceeds
        // the configured bound.
        prop_assert!(retries <= config.max_attempts);
    });
}
