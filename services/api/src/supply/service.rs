//! services/api/src/supply/service.rs
//!
//! The `QuizService` is the single entry point the HTTP layer talks to. It wires
//! the gateway, workers, orchestrator and delivery resolver together over the
//! injected ports and enforces session ownership.

use crate::config::PipelineConfig;
use crate::supply::{
    delivery::DeliveryResolver,
    gateway::GenerationGateway,
    orchestrator::SupplyOrchestrator,
    worker::WorkerPool,
};
use chrono::Utc;
use quiz_supply_core::{
    dedup::{normalize, Deduplicator},
    difficulty::DifficultyEngine,
    domain::{
        Answer, AnswerOutcome, Delivery, NewSession, RecordOutcome, RollbackReport, Session,
        SessionStats,
    },
    ports::{DatabaseService, PortError, PortResult, PrefetchCache, QuestionGenerator, SimilarityService},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A player's answer to one question.
#[derive(Debug, Clone)]
pub struct SubmitAnswer {
    pub session_id: Uuid,
    pub content_id: Uuid,
    pub user_id: Uuid,
    pub selected: String,
    pub response_time_ms: u32,
}

pub struct QuizService {
    db: Arc<dyn DatabaseService>,
    cache: Arc<dyn PrefetchCache>,
    orchestrator: SupplyOrchestrator,
    delivery: DeliveryResolver,
    workers: Arc<WorkerPool>,
    engine: DifficultyEngine,
}

impl QuizService {
    /// Builds the pipeline and spawns its background workers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn DatabaseService>,
        generator: Arc<dyn QuestionGenerator>,
        similarity: Option<Arc<dyn SimilarityService>>,
        cache: Arc<dyn PrefetchCache>,
        engine: DifficultyEngine,
        dedup: Deduplicator,
        config: PipelineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let gateway = GenerationGateway::new(db.clone(), generator, similarity, dedup, config.clone());
        let workers = Arc::new(WorkerPool::spawn(
            gateway.clone(),
            config.background_workers,
            config.worker_queue_depth,
            shutdown,
        ));
        let orchestrator = SupplyOrchestrator::new(
            db.clone(),
            gateway.clone(),
            workers.clone(),
            engine.clone(),
            config.clone(),
        );
        let delivery = DeliveryResolver::new(db.clone(), cache.clone(), gateway, engine.clone(), config);
        Self {
            db,
            cache,
            orchestrator,
            delivery,
            workers,
            engine,
        }
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn shutdown(&self) {
        self.workers.shutdown();
    }

    pub async fn start_session(&self, new_session: NewSession) -> PortResult<Session> {
        self.orchestrator.start_session(&new_session).await
    }

    pub async fn get_next_question(&self, session_id: Uuid, user_id: Uuid) -> PortResult<Delivery> {
        self.owned_session(session_id, user_id).await?;
        self.delivery.resolve(session_id).await
    }

    /// Records an answer. Resubmitting the same question returns the original
    /// result without counting it again.
    pub async fn submit_answer(&self, submission: SubmitAnswer) -> PortResult<AnswerOutcome> {
        let session_id = submission.session_id;
        let session = self.owned_session(session_id, submission.user_id).await?;
        if let Err(e) = self.cache.delete(session_id).await {
            tracing::warn!(%session_id, "Could not invalidate the prefetched question: {}", e);
        }

        let content = self.db.get_content(submission.content_id).await?;
        let is_correct = normalize(&submission.selected) == normalize(&content.correct_answer);
        let answer = Answer {
            id: Uuid::new_v4(),
            session_id,
            content_id: content.id,
            user_id: submission.user_id,
            selected_text: submission.selected,
            is_correct,
            response_time_ms: submission.response_time_ms,
            difficulty_at_answer: session.difficulty_score,
            answered_at: Utc::now(),
        };

        match self.db.record_answer(&answer).await? {
            RecordOutcome::Duplicate(prior) => {
                tracing::debug!(%session_id, content_id = %content.id, "Answer already recorded");
                let session = self.db.get_session(session_id).await?;
                Ok(AnswerOutcome {
                    is_correct: prior.is_correct,
                    correct_answer: content.correct_answer,
                    explanation: content.explanation,
                    tier_changed: false,
                    already_answered: true,
                    stats: self.stats_of(&session),
                })
            }
            RecordOutcome::SessionClosed => Err(PortError::Conflict(format!(
                "Session {} is no longer accepting answers",
                session_id
            ))),
            RecordOutcome::Recorded(updated) => {
                tracing::debug!(%session_id, content_id = %content.id, is_correct, "Answer recorded");
                let reaction = self.orchestrator.on_answer(&updated).await?;

                let delivery = self.delivery.clone();
                tokio::spawn(async move {
                    if let Err(e) = delivery.prefetch(session_id).await {
                        tracing::warn!(%session_id, "Prefetch failed: {}", e);
                    }
                });

                let session = self.db.get_session(session_id).await?;
                Ok(AnswerOutcome {
                    is_correct,
                    correct_answer: content.correct_answer,
                    explanation: content.explanation,
                    tier_changed: reaction.tier_changed,
                    already_answered: false,
                    stats: self.stats_of(&session),
                })
            }
        }
    }

    pub async fn end_session(&self, session_id: Uuid, user_id: Uuid) -> PortResult<SessionStats> {
        let session = self.owned_session(session_id, user_id).await?;
        self.orchestrator
            .complete(session_id, session.difficulty_score)
            .await?;
        self.drop_prefetched(session_id).await;
        let session = self.db.get_session(session_id).await?;
        Ok(self.stats_of(&session))
    }

    pub async fn cancel_session(&self, session_id: Uuid, user_id: Uuid) -> PortResult<RollbackReport> {
        self.owned_session(session_id, user_id).await?;
        self.drop_prefetched(session_id).await;
        self.orchestrator.cancel(session_id).await
    }

    pub async fn session_stats(&self, session_id: Uuid, user_id: Uuid) -> PortResult<SessionStats> {
        let session = self.owned_session(session_id, user_id).await?;
        Ok(self.stats_of(&session))
    }

    /// Another user's session is reported as missing.
    async fn owned_session(&self, session_id: Uuid, user_id: Uuid) -> PortResult<Session> {
        let session = self.db.get_session(session_id).await?;
        if session.user_id != user_id {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(session)
    }

    async fn drop_prefetched(&self, session_id: Uuid) {
        if let Err(e) = self.cache.delete(session_id).await {
            tracing::warn!(%session_id, "Could not drop the prefetched question: {}", e);
        }
    }

    fn stats_of(&self, session: &Session) -> SessionStats {
        SessionStats {
            session_id: session.id,
            total_answered: session.total_answered,
            total_correct: session.total_correct,
            target_count: session.target_count,
            streak: session.streak,
            difficulty_score: session.difficulty_score,
            tier: self.engine.level_of(session.difficulty_score),
            phase: session.phase,
        }
    }
}
