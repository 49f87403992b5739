//! Limiter manager: the public admission-control API.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::LimiterConfig;
use crate::error::Result;
use crate::limit::{Decision, Limit, Timestamp};
use crate::store::StoreBackend;

/// Action namespace used by [`Manager::login`] and [`Manager::reset`].
const LOGIN_ACTION: &str = "login";

/// The limiter manager façade.
///
/// Holds an injected store handle; construct one at process startup and
/// share it across request handlers. Every decision performs exactly one
/// round trip to the shared store, on the caller's task, with no internal
/// retries: transient store errors propagate, and callers of
/// security-sensitive actions must fail closed on them.
pub struct Manager {
    store: Arc<dyn StoreBackend>,
    config: LimiterConfig,
}

impl Manager {
    /// Create a manager with default configuration.
    pub fn new(store: Arc<dyn StoreBackend>) -> Self {
        Self::with_config(store, LimiterConfig::default())
    }

    /// Create a manager with explicit configuration.
    pub fn with_config(store: Arc<dyn StoreBackend>, config: LimiterConfig) -> Self {
        Self { store, config }
    }

    /// Check whether `subject` may perform `action` under `limit`.
    ///
    /// Returns the admission decision and the remaining instantaneous
    /// capacity for the key.
    pub async fn allow_action(
        &self,
        subject: &str,
        action: &str,
        limit: Limit,
    ) -> Result<(bool, u32)> {
        let decision = self.decide_action(subject, action, limit).await?;
        Ok((decision.allowed, decision.remaining))
    }

    /// Like [`allow_action`](Manager::allow_action), but returns the full
    /// [`Decision`] so callers can surface `retry_after` to well-behaved
    /// clients (e.g. in an HTTP 429 response).
    pub async fn decide_action(
        &self,
        subject: &str,
        action: &str,
        limit: Limit,
    ) -> Result<Decision> {
        let pace_key = self.pace_key(action, subject);
        let ban_key = self.ban_key(action, subject);
        let now = Timestamp::now();

        trace!(
            pace_key = %pace_key,
            limit = %limit,
            "Checking admission"
        );

        let decision = self
            .store
            .evaluate(&pace_key, &ban_key, limit, &self.config.ban, now)
            .await?;

        if !decision.allowed {
            debug!(
                pace_key = %pace_key,
                retry_after = ?decision.retry_after,
                "Admission denied"
            );
        }

        Ok(decision)
    }

    /// Check whether a login attempt from `ip` may proceed, under the fixed
    /// built-in policy (default 5 attempts/hour). Used to slow down
    /// credential guessing.
    pub async fn login(&self, ip: &str) -> Result<(bool, u32)> {
        let limit = Limit::per_hour(self.config.login_rate_per_hour)?;
        self.allow_action(ip, LOGIN_ACTION, limit).await
    }

    /// Forget all login pace and ban state for `ip`.
    ///
    /// Called after a successful login, so a user who mistyped a password a
    /// few times is not penalized going forward.
    pub async fn reset(&self, ip: &str) -> Result<()> {
        self.reset_action(ip, LOGIN_ACTION).await
    }

    /// Forget all pace and ban state for a (subject, action) pair. The only
    /// explicit deletion path; everything else expires via TTL.
    pub async fn reset_action(&self, subject: &str, action: &str) -> Result<()> {
        let pace_key = self.pace_key(action, subject);
        let ban_key = self.ban_key(action, subject);
        debug!(pace_key = %pace_key, "Resetting limiter state");
        self.store.reset(&pace_key, &ban_key).await
    }

    fn pace_key(&self, action: &str, subject: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.config.namespace, self.config.version, action, subject
        )
    }

    fn ban_key(&self, action: &str, subject: &str) -> String {
        format!(
            "{}:{}:ban:{}:{}",
            self.config.namespace, self.config.version, action, subject
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> Manager {
        Manager::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_key_construction() {
        let m = manager();
        assert_eq!(m.pace_key("login", "1.2.3.4"), "turnstile:v1:login:1.2.3.4");
        assert_eq!(m.ban_key("login", "1.2.3.4"), "turnstile:v1:ban:login:1.2.3.4");
    }

    #[tokio::test]
    async fn test_login_burst_and_denial() {
        let m = manager();
        let ip = "10.0.0.1";

        for expected in [4, 3, 2, 1, 0] {
            let (allowed, remain) = m.login(ip).await.unwrap();
            assert!(allowed);
            assert_eq!(remain, expected);
        }

        let (allowed, remain) = m.login(ip).await.unwrap();
        assert!(!allowed);
        assert_eq!(remain, 0);
    }

    #[tokio::test]
    async fn test_reset_restores_full_burst() {
        let m = manager();
        let ip = "10.0.0.2";

        for _ in 0..6 {
            m.login(ip).await.unwrap();
        }
        m.reset(ip).await.unwrap();

        let (allowed, remain) = m.login(ip).await.unwrap();
        assert!(allowed);
        assert_eq!(remain, 4);
    }

    #[tokio::test]
    async fn test_actions_have_separate_state() {
        let m = manager();
        let limit = Limit::per_hour(1).unwrap();

        let (allowed, _) = m.allow_action("42", "comment", limit).await.unwrap();
        assert!(allowed);
        let (allowed, _) = m.allow_action("42", "comment", limit).await.unwrap();
        assert!(!allowed);

        // Same subject, different action: untouched bucket.
        let (allowed, _) = m.allow_action("42", "collect", limit).await.unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_denied_decision_carries_retry_after() {
        let m = manager();
        let limit = Limit::per_hour(1).unwrap();

        m.allow_action("7", "edit", limit).await.unwrap();
        let decision = m.decide_action("7", "edit", limit).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.retry_after.is_some());
    }
}
