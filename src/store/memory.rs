//! In-memory store adapter.
//!
//! A mutex-guarded map with the same semantics as the Redis script,
//! including TTL behavior against the caller-supplied clock. Suitable for
//! single-process deployments and for tests that need a deterministic store
//! without a live Redis.
//!
//! Redis reclaims expired keys on its own; here dead entries are evicted
//! when touched and the maps are fully swept every `SWEEP_INTERVAL`
//! evaluations, so memory stays bounded by the number of live keys.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{BanPolicy, MAX_BAN_TTL};
use crate::error::Result;
use crate::gcra;
use crate::limit::{Decision, Limit, Timestamp};

use super::StoreBackend;

/// Full-map sweeps of expired entries happen every this many evaluations.
const SWEEP_INTERVAL: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct PaceEntry {
    tat: Timestamp,
    expires_at: Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct BanEntry {
    banned_until: Option<Timestamp>,
    violations: u32,
    expires_at: Timestamp,
}

#[derive(Debug, Default)]
struct Shared {
    pace: HashMap<String, PaceEntry>,
    bans: HashMap<String, BanEntry>,
    evaluations: u64,
}

/// A single-process store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live pace entries at time `now`. Primarily useful in tests.
    pub fn pace_entry_count(&self, now: Timestamp) -> usize {
        let inner = self.inner.lock();
        inner.pace.values().filter(|e| e.expires_at > now).count()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn evaluate(
        &self,
        pace_key: &str,
        ban_key: &str,
        limit: Limit,
        ban: &BanPolicy,
        now: Timestamp,
    ) -> Result<Decision> {
        let mut inner = self.inner.lock();

        inner.evaluations += 1;
        if inner.evaluations % SWEEP_INTERVAL == 0 {
            inner.pace.retain(|_, e| e.expires_at > now);
            inner.bans.retain(|_, e| e.expires_at > now);
        }

        // Ban short-circuit: an active ban bypasses the pace algorithm.
        let ban_entry = match inner.bans.get(ban_key).copied() {
            Some(entry) if entry.expires_at > now => Some(entry),
            Some(_) => {
                inner.bans.remove(ban_key);
                None
            }
            None => None,
        };
        if let Some(entry) = ban_entry {
            if let Some(banned_until) = entry.banned_until.filter(|until| *until > now) {
                let ban_left = duration_between(now, banned_until);
                return Ok(Decision {
                    limit,
                    allowed: false,
                    remaining: 0,
                    retry_after: Some(ban_left),
                    reset_after: ban_left,
                });
            }
        }

        let stored_tat = match inner.pace.get(pace_key).copied() {
            Some(entry) if entry.expires_at > now => Some(entry.tat),
            Some(_) => {
                inner.pace.remove(pace_key);
                None
            }
            None => None,
        };

        let pace = gcra::evaluate(stored_tat, &limit, now);

        if let Some(new_tat) = pace.new_tat {
            inner.pace.insert(
                pace_key.to_string(),
                PaceEntry {
                    tat: new_tat,
                    expires_at: now + pace.reset_after.min(MAX_BAN_TTL),
                },
            );
            return Ok(Decision {
                limit,
                allowed: true,
                remaining: pace.remaining,
                retry_after: None,
                reset_after: pace.reset_after,
            });
        }

        // Denied: record the violation and escalate once the threshold is
        // crossed within the counting window.
        let mut entry = ban_entry.unwrap_or(BanEntry {
            banned_until: None,
            violations: 0,
            expires_at: now + ban.violation_window(),
        });
        entry.violations += 1;

        let mut retry_after = pace.retry_after;
        if entry.violations >= ban.violation_threshold {
            let ban_duration = ban.ban_duration();
            entry.banned_until = Some(now + ban_duration);
            entry.violations = 0;
            entry.expires_at = now + ban_duration;
            retry_after = Some(ban_duration);
            debug!(ban_key = %ban_key, "Violation threshold crossed, subject banned");
        }
        inner.bans.insert(ban_key.to_string(), entry);

        Ok(Decision {
            limit,
            allowed: false,
            remaining: 0,
            retry_after,
            reset_after: pace.reset_after,
        })
    }

    async fn reset(&self, pace_key: &str, ban_key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.pace.remove(pace_key);
        inner.bans.remove(ban_key);
        Ok(())
    }
}

fn duration_between(from: Timestamp, to: Timestamp) -> std::time::Duration {
    std::time::Duration::from_micros((to.as_micros() - from.as_micros()).max(0) as u64)
}
