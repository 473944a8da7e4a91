//! Convoy coordination store
//!
//! The controller and the agents never talk to each other directly. Every
//! command, status record and snapshot goes through a Redis-compatible
//! store, accessed via the [`CoordinationStore`] trait.
//!
//! On top of the raw store this crate provides the shared protocol pieces:
//! - [`TaskQueue`]: enqueue one task copy per node, blocking poll
//! - [`StatusBoard`]: monotonic per-node task status and aggregate view
//! - [`NodeRegistry`]: node/health snapshots and deploy history

pub mod error;
pub mod json;
pub mod memory;
pub mod queue;
pub mod redis_store;
pub mod registry;
pub mod status;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use queue::TaskQueue;
pub use redis_store::RedisStore;
pub use registry::NodeRegistry;
pub use status::StatusBoard;

use async_trait::async_trait;
use std::time::Duration;

/// Redis-compatible key/value, set, list and pub/sub operations
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn set_ex(&self, key: &str, ttl: Duration, value: &str) -> StoreResult<()>;

    /// Returns false if the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Returns false if the key did not exist
    async fn del(&self, key: &str) -> StoreResult<bool>;

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Returns true if the member was newly added
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn rpop(&self, key: &str) -> StoreResult<Option<String>>;

    /// Blocking right pop that gives up after `timeout`
    async fn brpop(&self, key: &str, timeout: Duration) -> StoreResult<Option<String>>;

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()>;

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()>;
}
