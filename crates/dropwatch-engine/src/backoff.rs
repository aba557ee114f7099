// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped exponential backoff for transport connects.

use std::time::Duration;

use dropwatch_core::{DropwatchError, MessagingSource};
use tracing::{info, warn};

/// Doubling delay, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            current: initial,
            max,
        }
    }

    /// The delay to sleep now; the next call returns twice as much, up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Connects `source`, retrying forever with `backoff` between attempts.
///
/// Every attempt is bounded by `timeout`. `on_failure` sees each error
/// before the sleep, so callers can surface it on the actor's row.
/// Cancellation is the caller's job (drop the future).
pub async fn connect_with_backoff<F>(
    source: &dyn MessagingSource,
    timeout: Duration,
    mut backoff: Backoff,
    mut on_failure: F,
) where
    F: FnMut(&DropwatchError),
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(timeout, source.connect()).await {
            Ok(result) => result,
            Err(_) => Err(DropwatchError::Timeout { duration: timeout }),
        };
        match result {
            Ok(()) => {
                info!(source = source.name(), attempt, "transport connected");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    source = source.name(),
                    attempt,
                    error = %e,
                    retry_in_secs = delay.as_secs_f64(),
                    "transport connect failed"
                );
                on_failure(&e);
                // A half-open connection can wedge the next attempt.
                let _ = tokio::time::timeout(timeout, source.disconnect()).await;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));
        let delays: Vec<u64> = (0..7).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn never_exceeds_cap() {
        let mut b = Backoff::new(Duration::from_secs(3), Duration::from_secs(30));
        let mut prev = Duration::ZERO;
        for _ in 0..50 {
            let d = b.next_delay();
            assert!(d <= Duration::from_secs(30));
            assert!(d >= prev);
            if prev < Duration::from_secs(15) && prev > Duration::ZERO {
                assert_eq!(d, prev * 2);
            }
            prev = d;
        }
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(2));
    }
}
