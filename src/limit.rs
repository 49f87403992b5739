//! Limit policies, timestamps, and admission decisions.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, TurnstileError};

/// An immutable rate limit policy: `rate` events per `period`, with a burst
/// allowance of `burst` events that may be admitted back-to-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    rate: u32,
    burst: u32,
    period: Duration,
}

impl Limit {
    /// Create a new limit, validating its parameters.
    ///
    /// Rejects zero rates, zero bursts, zero periods, and policies so tight
    /// that a single event would cost less than a microsecond (the algorithm's
    /// timing granularity).
    pub fn new(rate: u32, burst: u32, period: Duration) -> Result<Self> {
        if rate == 0 {
            return Err(TurnstileError::Policy("rate must be >= 1".into()));
        }
        if burst == 0 {
            return Err(TurnstileError::Policy("burst must be >= 1".into()));
        }
        if period.is_zero() {
            return Err(TurnstileError::Policy("period must be > 0".into()));
        }
        let limit = Self { rate, burst, period };
        if limit.emission_interval_micros() < 1 {
            return Err(TurnstileError::Policy(format!(
                "period/rate below 1us: {rate} events per {period:?}"
            )));
        }
        Ok(limit)
    }

    /// `rate` events per second, with burst equal to the rate.
    pub fn per_second(rate: u32) -> Result<Self> {
        Self::new(rate, rate, Duration::from_secs(1))
    }

    /// `rate` events per minute, with burst equal to the rate.
    pub fn per_minute(rate: u32) -> Result<Self> {
        Self::new(rate, rate, Duration::from_secs(60))
    }

    /// `rate` events per hour, with burst equal to the rate.
    pub fn per_hour(rate: u32) -> Result<Self> {
        Self::new(rate, rate, Duration::from_secs(3600))
    }

    /// Sustained rate in events per period.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Maximum number of events admitted back-to-back.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// The period over which `rate` events are admitted.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The time a single admitted event costs against the budget
    /// (`period / rate`), in microseconds.
    pub(crate) fn emission_interval_micros(&self) -> i64 {
        self.period.as_micros() as i64 / i64::from(self.rate)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} req/{} (burst {})",
            self.rate,
            fmt_period(self.period),
            self.burst
        )
    }
}

fn fmt_period(period: Duration) -> String {
    if period.subsec_nanos() != 0 {
        return format!("{period:?}");
    }
    match period.as_secs() {
        1 => "s".to_string(),
        60 => "m".to_string(),
        3600 => "h".to_string(),
        _ => format!("{period:?}"),
    }
}

/// A wall-clock instant with microsecond precision, measured since the Unix
/// epoch.
///
/// The manager reads the clock once per decision and passes the timestamp
/// into the store adapter; the store itself is a dumb state holder, never a
/// clock source. Decisions are therefore deterministic given a timestamp,
/// which is what the tests rely on.
///
/// Operational requirement: timestamps produced by different server processes
/// are compared against each other through the shared store, so process
/// clocks must be synchronized (e.g. via NTP) to well within the smallest
/// emission interval in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(since_epoch.as_micros() as i64)
    }

    /// Construct from microseconds since the Unix epoch.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Microseconds since the Unix epoch.
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Split into whole seconds and the sub-second microsecond remainder,
    /// the argument shape the store-side script expects.
    pub(crate) fn split(self) -> (i64, i64) {
        (self.0.div_euclid(1_000_000), self.0.rem_euclid(1_000_000))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.as_micros() as i64))
    }
}

/// The outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The limit that was used to obtain this decision.
    pub limit: Limit,

    /// Whether the event was admitted.
    pub allowed: bool,

    /// The maximum number of further events that could be admitted
    /// instantaneously for this key given the current state.
    pub remaining: u32,

    /// Time until the next event will be admitted. `None` when this event
    /// was allowed.
    pub retry_after: Option<Duration>,

    /// Time until the limiter returns to its initial state for this key,
    /// i.e. until the full burst is available again.
    pub reset_after: Duration,
}
