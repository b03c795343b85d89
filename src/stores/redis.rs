use redis::AsyncCommands;
use tracing::debug;

use super::CtiStore;
use crate::error::Error;
use crate::token::CommonAccessToken;

/// Redis-backed usage counter using `INCR`, shared by every node using the same server
pub struct RedisCtiStore {
    client: redis::aio::ConnectionManager,
    key_prefix: String,
}

impl RedisCtiStore {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis connection cannot be established
    pub async fn new(redis_url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Store(format!("Failed to create Redis client: {e}")))?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Store(format!("Failed to connect to Redis: {e}")))?;

        debug!("Redis CTI store initialized");

        Ok(Self {
            client: connection_manager,
            key_prefix: String::new(),
        })
    }

    /// Prefix every key, e.g. `"cat:cti:"`
    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, cti: &str) -> String {
        format!("{}{}", self.key_prefix, cti)
    }
}

#[async_trait::async_trait]
impl CtiStore for RedisCtiStore {
    async fn store_token(&self, token: &CommonAccessToken) -> Result<u64, Error> {
        let Some(cti) = token.cti() else {
            return Ok(0);
        };
        let mut conn = self.client.clone();
        let count: u64 = conn
            .incr(self.key(&cti), 1u64)
            .await
            .map_err(|e| Error::Store(format!("Redis INCR failed: {e}")))?;
        debug!(cti = %cti, count, "token usage recorded");
        Ok(count)
    }

    async fn get_token_count(&self, token: &CommonAccessToken) -> Result<u64, Error> {
        let Some(cti) = token.cti() else {
            return Ok(0);
        };
        let mut conn = self.client.clone();
        let count: Option<u64> = conn
            .get(self.key(&cti))
            .await
            .map_err(|e| Error::Store(format!("Redis GET failed: {e}")))?;
        Ok(count.unwrap_or(0))
    }
}
