//! Redis-backed store adapter.
//!
//! Executes the whole admission decision as a single server-side Lua script
//! invocation: one round trip reads the TAT and ban state, computes the
//! decision, and conditionally writes the new state with a TTL. Redis runs
//! scripts atomically, which is what makes concurrent decisions from many
//! server processes safe without client-side locking.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script, Value};
use tracing::{debug, trace};

use crate::config::BanPolicy;
use crate::error::{Result, TurnstileError};
use crate::limit::{Decision, Limit, Timestamp};

use super::StoreBackend;

const EVALUATE_LUA: &str = include_str!("evaluate.lua");

/// A store adapter backed by a Redis-compatible server.
///
/// Cloning is cheap; all clones share one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!(url = %url, "Connected to shared store");
        Ok(Self::with_connection(connection))
    }

    /// Build a store adapter over an existing connection, letting the
    /// process's startup sequence own the client lifecycle.
    pub fn with_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            script: Script::new(EVALUATE_LUA),
        }
    }
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn evaluate(
        &self,
        pace_key: &str,
        ban_key: &str,
        limit: Limit,
        ban: &BanPolicy,
        now: Timestamp,
    ) -> Result<Decision> {
        let (now_secs, now_micros) = now.split();
        let mut connection = self.connection.clone();

        let reply: Value = self
            .script
            .key(pace_key)
            .key(ban_key)
            .arg(limit.burst())
            .arg(limit.rate())
            .arg(limit.period().as_micros() as i64)
            .arg(now_secs)
            .arg(now_micros)
            .arg(ban.violation_threshold)
            .arg(ban.violation_window().as_millis() as i64)
            .arg(ban.ban_duration().as_millis() as i64)
            .arg(crate::config::MAX_BAN_TTL.as_millis() as i64)
            .invoke_async(&mut connection)
            .await?;

        trace!(
            pace_key = %pace_key,
            reply = ?reply,
            "Evaluated admission script"
        );

        decode_reply(&reply).map(|raw| raw.into_decision(limit))
    }

    async fn reset(&self, pace_key: &str, ban_key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(pace_key)
            .arg(ban_key)
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}

/// The raw reply shape produced by the evaluation script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawReply {
    allowed: i64,
    remaining: i64,
    retry_after_us: i64,
    reset_after_us: i64,
}

impl RawReply {
    fn into_decision(self, limit: Limit) -> Decision {
        Decision {
            limit,
            allowed: self.allowed == 1,
            remaining: self.remaining.max(0) as u32,
            retry_after: if self.retry_after_us < 0 {
                None
            } else {
                Some(std::time::Duration::from_micros(self.retry_after_us as u64))
            },
            reset_after: std::time::Duration::from_micros(self.reset_after_us.max(0) as u64),
        }
    }
}

/// Decode the script reply into its typed shape.
///
/// A malformed reply (wrong arity, wrong element types) is a decode error,
/// never a panic: an admission controller must not crash a request-serving
/// process because of an unexpected remote reply.
fn decode_reply(value: &Value) -> Result<RawReply> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(TurnstileError::Decode(format!(
                "expected a 4-element array, got {other:?}"
            )))
        }
    };

    if items.len() != 4 {
        return Err(TurnstileError::Decode(format!(
            "expected a 4-element array, got {} elements",
            items.len()
        )));
    }

    let int_at = |index: usize| -> Result<i64> {
        match &items[index] {
            Value::Int(n) => Ok(*n),
            other => Err(TurnstileError::Decode(format!(
                "expected integer at index {index}, got {other:?}"
            ))),
        }
    };

    Ok(RawReply {
        allowed: int_at(0)?,
        remaining: int_at(1)?,
        retry_after_us: int_at(2)?,
        reset_after_us: int_at(3)?,
    })
}
