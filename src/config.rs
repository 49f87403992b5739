//! Configuration for the Turnstile admission controller.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the TTL of any stored entry. Ban entries never outlive
/// this, and pace entries for pathologically large limits are capped to it.
pub const MAX_BAN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Main configuration for a limiter manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Key namespace prefix shared by all keys this manager writes
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Key-scheme version segment. Bumping it invalidates every entry
    /// written under the previous scheme without an explicit migration.
    #[serde(default = "default_version")]
    pub version: String,

    /// Fixed policy for the `login` operation, in events per hour
    #[serde(default = "default_login_rate_per_hour")]
    pub login_rate_per_hour: u32,

    /// Ban escalation policy
    #[serde(default)]
    pub ban: BanPolicy,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            version: default_version(),
            login_rate_per_hour: default_login_rate_per_hour(),
            ban: BanPolicy::default(),
        }
    }
}

fn default_namespace() -> String {
    "turnstile".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_login_rate_per_hour() -> u32 {
    5
}

/// Ban escalation policy.
///
/// After a pace-algorithm denial, a violation counter is incremented; the
/// counting window starts at the first violation and expires after
/// `violation_window_secs`. When the counter reaches `violation_threshold`
/// within one window, the subject is banned for `ban_duration_secs` and the
/// counter is cleared. While banned, decisions short-circuit to deny without
/// touching pace state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanPolicy {
    /// Denials within one window before a ban is imposed
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u32,

    /// Rolling window over which violations are counted, in seconds
    #[serde(default = "default_violation_window_secs")]
    pub violation_window_secs: u64,

    /// How long a ban lasts, in seconds (capped at [`MAX_BAN_TTL`])
    #[serde(default = "default_ban_duration_secs")]
    pub ban_duration_secs: u64,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            violation_threshold: default_violation_threshold(),
            violation_window_secs: default_violation_window_secs(),
            ban_duration_secs: default_ban_duration_secs(),
        }
    }
}

fn default_violation_threshold() -> u32 {
    3
}

fn default_violation_window_secs() -> u64 {
    3600
}

fn default_ban_duration_secs() -> u64 {
    MAX_BAN_TTL.as_secs()
}

impl BanPolicy {
    /// Rolling window over which violations are counted.
    pub fn violation_window(&self) -> Duration {
        Duration::from_secs(self.violation_window_secs)
    }

    /// How long a ban lasts, capped at [`MAX_BAN_TTL`].
    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs).min(MAX_BAN_TTL)
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: LimiterConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }
}
