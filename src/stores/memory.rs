use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use super::CtiStore;
use crate::error::Error;
use crate::token::CommonAccessToken;

/// In-memory usage counter.
///
/// Counts are not shared across processes.
#[derive(Debug, Default)]
pub struct MemoryCtiStore {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryCtiStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CtiStore for MemoryCtiStore {
    async fn store_token(&self, token: &CommonAccessToken) -> Result<u64, Error> {
        let Some(cti) = token.cti() else {
            return Ok(0);
        };
        let mut counts = self.counts.lock().await;
        let count = counts.entry(cti).or_insert(0);
        *count += 1;
        debug!(count = *count, "token usage recorded");
        Ok(*count)
    }

    async fn get_token_count(&self, token: &CommonAccessToken) -> Result<u64, Error> {
        let Some(cti) = token.cti() else {
            return Ok(0);
        };
        Ok(self.counts.lock().await.get(&cti).copied().unwrap_or(0))
    }
}
