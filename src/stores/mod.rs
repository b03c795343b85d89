//! Token usage stores keyed by `cti`.
//!
//! Two implementations are provided:
//!
//! - **In-memory**: a process-local map, for single-node deployments and tests
//! - **Redis**: a shared atomic counter (requires the `redis-store` feature)

use crate::error::Error;
use crate::token::CommonAccessToken;

mod memory;
#[cfg(feature = "redis-store")]
mod redis;

pub use memory::MemoryCtiStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisCtiStore;

/// Usage counter for token identifiers.
///
/// `store_token` must be an atomic increment: concurrent validations of the
/// same token observe a gap-free count sequence. Tokens without a `cti` are
/// not tracked and report a count of 0.
#[async_trait::async_trait]
pub trait CtiStore: Send + Sync {
    /// Record one use of the token and return its usage count
    async fn store_token(&self, token: &CommonAccessToken) -> Result<u64, Error>;

    /// Current usage count of the token
    async fn get_token_count(&self, token: &CommonAccessToken) -> Result<u64, Error>;
}
