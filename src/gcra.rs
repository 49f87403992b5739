//! The pace algorithm: GCRA (Generic Cell Rate Algorithm), virtual-scheduling
//! form.
//!
//! GCRA tracks a single timestamp per key, the theoretical arrival time
//! (TAT): the instant at which the bucket would be empty if usage continued
//! at the sustained rate. Bursts are admitted by letting `now` lag the TAT by
//! up to `burst * emission_interval`; capacity replenishes linearly as wall
//! time catches up with the TAT. No counters, no sliding log.
//!
//! This module is pure: it maps `(stored TAT, limit, now)` to a decision.
//! The in-memory backend runs it under its lock; the Redis backend runs the
//! identical arithmetic server-side in Lua so the read-compute-write cycle
//! stays atomic across processes.

use std::time::Duration;

use crate::limit::{Limit, Timestamp};

/// Outcome of a single GCRA evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PaceDecision {
    pub allowed: bool,
    /// The TAT to persist. `None` on denial: the attempted event did not
    /// happen, so the stored state must not move.
    pub new_tat: Option<Timestamp>,
    pub remaining: u32,
    pub retry_after: Option<Duration>,
    pub reset_after: Duration,
}

/// Evaluate one event against the stored TAT at time `now`.
///
/// All arithmetic is in whole microseconds; `Limit` construction guarantees
/// the emission interval is at least one microsecond.
pub(crate) fn evaluate(stored_tat: Option<Timestamp>, limit: &Limit, now: Timestamp) -> PaceDecision {
    let emission = limit.emission_interval_micros();
    let burst_offset = emission * i64::from(limit.burst());

    let now_us = now.as_micros();
    // A TAT in the past is equivalent to a fully drained bucket.
    let tat = stored_tat.map_or(now_us, |t| t.as_micros().max(now_us));

    let new_tat = tat + emission;
    let allow_at = new_tat - burst_offset;

    if now_us >= allow_at {
        let reset_after = new_tat - now_us;
        let remaining = ((burst_offset - reset_after) / emission)
            .clamp(0, i64::from(limit.burst()) - 1) as u32;

        PaceDecision {
            allowed: true,
            new_tat: Some(Timestamp::from_micros(new_tat)),
            remaining,
            retry_after: None,
            reset_after: Duration::from_micros(reset_after as u64),
        }
    } else {
        PaceDecision {
            allowed: false,
            new_tat: None,
            remaining: 0,
            retry_after: Some(Duration::from_micros((allow_at - now_us) as u64)),
            reset_after: Duration::from_micros((tat - now_us).max(0) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_hour(rate: u32) -> Limit {
        Limit::per_hour(rate).unwrap()
    }

    #[test]
    fn test_fresh_key_admits_with_full_burst() {
        let limit = per_hour(5);
        let now = Timestamp::from_micros(1_000_000_000_000);

        let d = evaluate(None, &limit, now);
        assert!(d.allowed);
        assert_eq!(d.remaining, 4);
        assert_eq!(d.retry_after, None);
        assert_eq!(d.reset_after, Duration::from_secs(720));
        assert_eq!(d.new_tat, Some(now + Duration::from_secs(720)));
    }

    #[test]
    fn test_burst_admission_then_denial() {
        let limit = per_hour(5);
        let now = Timestamp::from_micros(1_000_000_000_000);

        let mut tat = None;
        for expected_remaining in [4, 3, 2, 1, 0] {
            let d = evaluate(tat, &limit, now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
            tat = d.new_tat;
        }

        // Sixth back-to-back call: denied, retry after one emission interval.
        let d = evaluate(tat, &limit, now);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.retry_after, Some(Duration::from_secs(720)));
        assert_eq!(d.new_tat, None);
    }

    #[test]
    fn test_linear_replenishment() {
        let limit = per_hour(5);
        let t0 = Timestamp::from_micros(1_000_000_000_000);

        let mut tat = None;
        for _ in 0..5 {
            let d = evaluate(tat, &limit, t0);
            tat = d.new_tat;
        }
        assert!(!evaluate(tat, &limit, t0).allowed);

        // Advancing exactly one emission interval admits exactly one event.
        let t1 = t0 + Duration::from_secs(720);
        let d = evaluate(tat, &limit, t1);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);

        assert!(!evaluate(d.new_tat, &limit, t1).allowed);
    }

    #[test]
    fn test_denial_is_idempotent() {
        let limit = per_hour(1);
        let now = Timestamp::from_micros(1_000_000_000_000);

        let d = evaluate(None, &limit, now);
        let tat = d.new_tat;

        // Repeated denied evaluations at the same instant do not drift.
        let first = evaluate(tat, &limit, now);
        let second = evaluate(tat, &limit, now);
        assert!(!first.allowed);
        assert_eq!(first.retry_after, second.retry_after);
        assert_eq!(first.reset_after, second.reset_after);
    }

    #[test]
    fn test_stale_tat_treated_as_empty_bucket() {
        let limit = per_hour(5);
        let long_ago = Timestamp::from_micros(1_000);
        let now = Timestamp::from_micros(1_000_000_000_000);

        let d = evaluate(Some(long_ago), &limit, now);
        assert!(d.allowed);
        assert_eq!(d.remaining, 4);
        assert_eq!(d.new_tat, Some(now + Duration::from_secs(720)));
    }

    #[test]
    fn test_microsecond_precision_retry_after() {
        // 5 events/hour: the emission interval is 720s exactly. A denial
        // 123456us after the window started must reflect that in retry_after
        // instead of rounding to whole seconds.
        let limit = per_hour(5);
        let t0 = Timestamp::from_micros(1_000_000_000_000);

        let mut tat = None;
        for _ in 0..5 {
            tat = evaluate(tat, &limit, t0).new_tat;
        }

        let t1 = t0 + Duration::from_micros(123_456);
        let d = evaluate(tat, &limit, t1);
        assert!(!d.allowed);
        assert_eq!(
            d.retry_after,
            Some(Duration::from_secs(720) - Duration::from_micros(123_456))
        );
    }

    #[test]
    fn test_remaining_replenishes_partially() {
        let limit = Limit::per_second(10).unwrap();
        let t0 = Timestamp::from_micros(1_000_000_000_000);

        let mut tat = None;
        for _ in 0..10 {
            tat = evaluate(tat, &limit, t0).new_tat;
        }

        // Half the period later, half the burst is back (one interval of the
        // five replenished is consumed by this event itself).
        let t1 = t0 + Duration::from_millis(500);
        let d = evaluate(tat, &limit, t1);
        assert!(d.allowed);
        assert_eq!(d.remaining, 4);
    }
}
