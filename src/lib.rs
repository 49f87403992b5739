//! Turnstile - Distributed Admission Control
//!
//! This crate implements a distributed admission controller (rate limiter)
//! shared by multiple stateless API server processes. Decisions use GCRA
//! ("virtual scheduling" leaky bucket) for burst tolerance with smooth
//! replenishment, escalate repeat offenders into longer-lived bans, and are
//! evaluated atomically against a shared Redis-compatible store so that
//! concurrent requests on different processes never race.
//!
//! No process holds authoritative state: the store owns it, all of it
//! expires via TTL, and each decision is one atomic server-side script
//! invocation.

pub mod config;
pub mod error;
pub mod limit;
pub mod manager;
pub mod store;

mod gcra;

pub use config::{BanPolicy, LimiterConfig, MAX_BAN_TTL};
pub use error::{Result, TurnstileError};
pub use limit::{Decision, Limit, Timestamp};
pub use manager::Manager;
pub use store::{MemoryStore, RedisStore, StoreBackend};
