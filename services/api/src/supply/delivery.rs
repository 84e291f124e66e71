//! services/api/src/supply/delivery.rs
//!
//! Resolves "give me the next question" for a session: the prefetched payload
//! first, then the lowest-order queued question, then a short bounded wait for
//! generation to catch up, and finally an explicit "nothing available".

use crate::config::PipelineConfig;
use crate::supply::gateway::GenerationGateway;
use quiz_supply_core::{
    difficulty::DifficultyEngine,
    domain::{Delivery, QuestionContent, QuestionPayload, Session},
    ports::{DatabaseService, PortResult, PrefetchCache},
};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

#[derive(Clone)]
pub struct DeliveryResolver {
    db: Arc<dyn DatabaseService>,
    cache: Arc<dyn PrefetchCache>,
    gateway: GenerationGateway,
    engine: DifficultyEngine,
    config: PipelineConfig,
}

impl DeliveryResolver {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        cache: Arc<dyn PrefetchCache>,
        gateway: GenerationGateway,
        engine: DifficultyEngine,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            cache,
            gateway,
            engine,
            config,
        }
    }

    pub async fn resolve(&self, session_id: Uuid) -> PortResult<Delivery> {
        let session = self.db.get_session(session_id).await?;
        if session.phase.is_terminal() || session.is_finished() {
            return Ok(Delivery::Finished);
        }

        if let Some(payload) = self.take_prefetched(&session).await {
            self.db.mark_shown(session_id, payload.content_id).await?;
            tracing::debug!(%session_id, content_id = %payload.content_id, "Served prefetched question");
            return Ok(Delivery::Ready(payload));
        }

        if let Some(payload) = self.serve_queued(&session).await? {
            return Ok(Delivery::Ready(payload));
        }

        // Nothing queued: generate a slice inline, then give the workers a moment.
        let tier = self.engine.level_of(session.difficulty_score);
        let slice = self.config.sync_slice.min(session.remaining());
        self.gateway.fill(session_id, tier, slice).await;

        let deadline = Instant::now() + self.config.delivery_wait;
        loop {
            if let Some(payload) = self.serve_queued(&session).await? {
                return Ok(Delivery::Ready(payload));
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.config.delivery_poll_interval).await;
        }

        tracing::warn!(%session_id, %tier, "No question available within the wait budget");
        Ok(Delivery::Unavailable)
    }

    /// Builds the next payload and parks it in the cache. Does not stamp the link.
    pub async fn prefetch(&self, session_id: Uuid) -> PortResult<()> {
        let session = self.db.get_session(session_id).await?;
        if session.phase.is_terminal() || session.is_finished() {
            return Ok(());
        }
        if let Some(payload) = self.next_queued(&session).await? {
            self.cache
                .set(session_id, payload, self.config.prefetch_ttl)
                .await?;
        }
        Ok(())
    }

    /// A cached payload, discarded if it was built for an earlier question.
    async fn take_prefetched(&self, session: &Session) -> Option<QuestionPayload> {
        match self.cache.take(session.id).await {
            Ok(Some(payload)) if payload.question_number == session.total_answered + 1 => Some(payload),
            Ok(Some(_)) => {
                tracing::debug!(session_id = %session.id, "Discarded stale prefetched question");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(session_id = %session.id, "Prefetch cache unavailable: {}", e);
                None
            }
        }
    }

    async fn serve_queued(&self, session: &Session) -> PortResult<Option<QuestionPayload>> {
        let Some(payload) = self.next_queued(session).await? else {
            return Ok(None);
        };
        self.db.mark_shown(session.id, payload.content_id).await?;
        Ok(Some(payload))
    }

    /// The lowest-order unanswered question whose content the session has not
    /// already answered under another link. Questions of the session's current
    /// tier go first; pre-emptively seeded ones wait until it runs dry.
    async fn next_queued(&self, session: &Session) -> PortResult<Option<QuestionPayload>> {
        let answered = self.db.answered_fingerprints(session.id).await?;
        let queued: Vec<QuestionContent> = self
            .db
            .unanswered_links(session.id)
            .await?
            .into_iter()
            .map(|(_, content)| content)
            .filter(|content| !answered.contains(&content.fingerprint))
            .collect();
        let tier = self.engine.level_of(session.difficulty_score);
        let next = queued.iter().find(|c| c.tier == tier).or_else(|| queued.first());
        Ok(next.map(|content| payload_for(session, content)))
    }
}

/// The player-facing view of a question, options shuffled.
pub fn payload_for(session: &Session, content: &QuestionContent) -> QuestionPayload {
    let mut options = content.options();
    options.shuffle(&mut rand::thread_rng());
    QuestionPayload {
        session_id: session.id,
        content_id: content.id,
        text: content.text.clone(),
        options,
        tier: content.tier,
        seconds_per_question: session.seconds_per_question,
        question_number: session.total_answered + 1,
        total_questions: session.target_count,
    }
}
