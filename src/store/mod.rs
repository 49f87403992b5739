//! Shared state store adapters.
//!
//! The store is the only point of mutation for pace and ban state. Every
//! decision runs "read state, compute, conditionally write" as one
//! indivisible store-side operation, so concurrent callers on different
//! processes can never lose or double each other's writes.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;

use crate::config::BanPolicy;
use crate::error::Result;
use crate::limit::{Decision, Limit, Timestamp};

/// Trait for shared state store backends.
///
/// Implementations must execute [`evaluate`](StoreBackend::evaluate) as a
/// single atomic operation: ban short-circuit, pace decision, conditional
/// TAT write, and violation bookkeeping all happen inside one store-side
/// transaction. The timestamp is supplied by the caller; the store is a
/// dumb state holder, not a clock source.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Evaluate one event against the pace and ban state for a key pair.
    ///
    /// Fails with a store error when the backing store is unreachable;
    /// callers must treat that as "not admitted" for sensitive actions.
    async fn evaluate(
        &self,
        pace_key: &str,
        ban_key: &str,
        limit: Limit,
        ban: &BanPolicy,
        now: Timestamp,
    ) -> Result<Decision>;

    /// Delete both the pace and ban state for a key pair.
    async fn reset(&self, pace_key: &str, ban_key: &str) -> Result<()>;
}
