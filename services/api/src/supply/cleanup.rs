//! services/api/src/supply/cleanup.rs
//!
//! Garbage collection of generated content that no session uses.
//!
//! Content becomes an orphan when its last link into an open session is removed
//! and nobody ever answered it. Reclaiming happens eagerly wherever links are
//! deleted; anything a failed reclaim leaves behind is picked up by the periodic
//! sweep.

use quiz_supply_core::ports::DatabaseService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrphanReclaimer {
    db: Arc<dyn DatabaseService>,
}

impl OrphanReclaimer {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Deletes every content in `content_ids` that is now orphaned.
    /// Returns how many rows were removed. Failures are logged, never returned.
    pub async fn reclaim(&self, content_ids: &[Uuid]) -> u32 {
        let attempts = content_ids.iter().map(|id| {
            let db = self.db.clone();
            let id = *id;
            async move {
                match db.delete_content_if_orphaned(id).await {
                    Ok(deleted) => deleted,
                    Err(e) => {
                        tracing::warn!(content_id = %id, "Orphan reclaim failed, leaving it for the sweep: {}", e);
                        false
                    }
                }
            }
        });
        let removed = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|deleted| *deleted)
            .count() as u32;
        if removed > 0 {
            tracing::debug!(removed, "Reclaimed orphaned content");
        }
        removed
    }

    /// Removes a freshly created row after its candidate was rejected.
    pub async fn reclaim_one(&self, content_id: Uuid) {
        self.reclaim(&[content_id]).await;
    }

    /// Spawns the periodic sweep that runs until `shutdown` is cancelled.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let db = self.db.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match db.sweep_orphaned_contents().await {
                            Ok(0) => tracing::trace!("Orphan sweep found nothing"),
                            Ok(removed) => tracing::info!(removed, "Orphan sweep removed content"),
                            Err(e) => tracing::error!("Orphan sweep failed: {}", e),
                        }
                    }
                }
            }
            tracing::debug!("Orphan sweeper stopped");
        })
    }
}
