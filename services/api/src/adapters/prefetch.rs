//! services/api/src/adapters/prefetch.rs
//!
//! An in-process implementation of the `PrefetchCache` port: one payload per
//! session, each with its own expiry.

use async_trait::async_trait;
use quiz_supply_core::domain::QuestionPayload;
use quiz_supply_core::ports::{PortResult, PrefetchCache};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

struct Entry {
    payload: QuestionPayload,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryPrefetchCache {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl InMemoryPrefetchCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrefetchCache for InMemoryPrefetchCache {
    async fn set(&self, session_id: Uuid, payload: QuestionPayload, ttl: Duration) -> PortResult<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            session_id,
            Entry {
                payload,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn take(&self, session_id: Uuid) -> PortResult<Option<QuestionPayload>> {
        let entry = self.entries.lock().await.remove(&session_id);
        Ok(entry
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.payload))
    }

    async fn delete(&self, session_id: Uuid) -> PortResult<()> {
        self.entries.lock().await.remove(&session_id);
        Ok(())
    }
}
