//! services/api/src/supply/orchestrator.rs
//!
//! The supply orchestrator decides how many questions a session still needs,
//! generates a small slice inline so the player has something right away, and
//! hands the remainder to the background workers. The unanswered backlog is kept
//! to a rolling window, so part of the quota stays free for the tier the player
//! is about to enter. It also drives the session's lifecycle: tier transitions
//! purge and re-seed the backlog, completion and cancellation clean up
//! everything the session no longer needs.

use crate::config::PipelineConfig;
use crate::supply::cleanup::OrphanReclaimer;
use crate::supply::gateway::GenerationGateway;
use crate::supply::worker::{GenerationJob, WorkerPool};
use quiz_supply_core::{
    difficulty::DifficultyEngine,
    domain::{NewSession, PhaseError, RollbackReport, Session, SessionPhase, Tier},
    ports::{DatabaseService, PortError, PortResult},
};
use std::sync::Arc;
use uuid::Uuid;

fn phase_err(e: PhaseError) -> PortError {
    PortError::Conflict(e.to_string())
}

/// What happened to the session as a consequence of one recorded answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerReaction {
    pub difficulty_score: f64,
    pub previous_tier: Tier,
    pub tier: Tier,
    pub tier_changed: bool,
    pub phase: SessionPhase,
}

#[derive(Clone)]
pub struct SupplyOrchestrator {
    db: Arc<dyn DatabaseService>,
    gateway: GenerationGateway,
    workers: Arc<WorkerPool>,
    reclaimer: OrphanReclaimer,
    engine: DifficultyEngine,
    config: PipelineConfig,
}

impl SupplyOrchestrator {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        gateway: GenerationGateway,
        workers: Arc<WorkerPool>,
        engine: DifficultyEngine,
        config: PipelineConfig,
    ) -> Self {
        let reclaimer = OrphanReclaimer::new(db.clone());
        Self {
            db,
            gateway,
            workers,
            reclaimer,
            engine,
            config,
        }
    }

    /// Creates the session, seeds its first questions inline and queues the rest.
    pub async fn start_session(&self, new_session: &NewSession) -> PortResult<Session> {
        let tier = new_session.knowledge_level.starting_tier();
        let score = self.engine.initial_score(tier);
        let session = self.db.create_session(new_session, score).await?;
        let session_id = session.id;
        tracing::info!(%session_id, %tier, target = session.target_count, "Quiz session created");

        if session.target_count == 0 {
            self.db
                .update_session_state(session_id, score, SessionPhase::Completed)
                .await?;
            return self.db.get_session(session_id).await;
        }

        let window = self.window_for(&session);
        let slice = self.config.sync_slice.min(window);
        self.gateway.fill(session_id, tier, slice).await;

        let linked = self.db.count_links(session_id).await?;
        self.workers.dispatch(GenerationJob {
            session_id,
            tier,
            count: window.saturating_sub(linked),
        });

        let backlog = self.db.count_unanswered(session_id, None).await?;
        let phase = session.phase.seeded(backlog).map_err(phase_err)?;
        if !self.db.update_session_state(session_id, score, phase).await? {
            tracing::debug!(%session_id, "Session closed while it was being seeded");
        }
        self.db.get_session(session_id).await
    }

    /// Reacts to a freshly recorded answer. `session` carries the counters as
    /// they were right after the answer was stored.
    pub async fn on_answer(&self, session: &Session) -> PortResult<AnswerReaction> {
        let session_id = session.id;
        let window = self.engine.config().streak_threshold.max(1);
        let recent = self.db.recent_outcomes(session_id, window).await?;

        let previous_tier = self.engine.level_of(session.difficulty_score);
        let difficulty_score = if session.adaptive {
            self.engine.adjust(session.difficulty_score, &recent)
        } else {
            session.difficulty_score
        };
        let tier = self.engine.level_of(difficulty_score);
        let tier_changed = tier != previous_tier;

        let phase = session
            .phase
            .answered(
                session.total_answered,
                session.target_count,
                tier_changed,
                self.config.draining_window,
            )
            .map_err(phase_err)?;

        let mut reaction = AnswerReaction {
            difficulty_score,
            previous_tier,
            tier,
            tier_changed,
            phase,
        };

        if phase == SessionPhase::Completed {
            self.complete(session_id, difficulty_score).await?;
            return Ok(reaction);
        }

        if !self
            .db
            .update_session_state(session_id, difficulty_score, phase)
            .await?
        {
            // Ended or cancelled after the answer was stored: nothing more to supply.
            let closed = self.db.get_session(session_id).await?;
            tracing::info!(%session_id, phase = %closed.phase, "Session closed while the answer was processed");
            return Ok(AnswerReaction {
                difficulty_score: closed.difficulty_score,
                previous_tier,
                tier: self.engine.level_of(closed.difficulty_score),
                tier_changed: false,
                phase: closed.phase,
            });
        }

        if tier_changed {
            tracing::info!(%session_id, from = %previous_tier, to = %tier, score = difficulty_score, "Difficulty tier changed");
            reaction.phase = self.transition(session, previous_tier, tier, difficulty_score).await?;
            return Ok(reaction);
        }

        let reserved = if session.adaptive && phase.allows_speculative_seeding() {
            self.seed_predicted_tier(session, difficulty_score, &recent).await?
        } else {
            0
        };
        self.replenish(session, tier, reserved).await?;
        Ok(reaction)
    }

    /// The most unanswered questions a session keeps queued at once.
    fn window_for(&self, session: &Session) -> u32 {
        self.config.backlog_window.max(1).min(session.remaining())
    }

    /// Links the session may still add before hitting its quota. Always a fresh read.
    async fn quota_room(&self, session_id: Uuid, target_count: u32) -> PortResult<u32> {
        let linked = self.db.count_links(session_id).await?;
        Ok(target_count.saturating_sub(linked))
    }

    /// Tops the current tier's backlog back up to the window, leaving `reserved`
    /// slots of the quota to speculative work already queued.
    async fn replenish(&self, session: &Session, tier: Tier, reserved: u32) -> PortResult<()> {
        let queued = self.db.count_unanswered(session.id, Some(tier)).await?;
        let room = self
            .quota_room(session.id, session.target_count)
            .await?
            .saturating_sub(reserved);
        let count = self.window_for(session).saturating_sub(queued).min(room);
        if count > 0 {
            tracing::debug!(session_id = %session.id, %tier, count, "Replenishing the backlog");
            self.workers.dispatch(GenerationJob {
                session_id: session.id,
                tier,
                count,
            });
        }
        Ok(())
    }

    /// Purges the stale tier's backlog and re-seeds the new tier.
    async fn transition(
        &self,
        session: &Session,
        from: Tier,
        to: Tier,
        difficulty_score: f64,
    ) -> PortResult<SessionPhase> {
        let session_id = session.id;
        let purged = self.db.delete_unanswered_links(session_id, Some(from)).await?;
        let reclaimed = self.reclaimer.reclaim(&purged).await;
        tracing::debug!(%session_id, purged = purged.len(), reclaimed, "Purged stale backlog");

        let window = self.window_for(session);
        let queued = self.db.count_unanswered(session_id, None).await?;
        let needed = window.saturating_sub(queued);
        if needed > 0 {
            let slice = self.config.sync_slice.min(needed);
            self.gateway.fill(session_id, to, slice).await;

            let queued = self.db.count_unanswered(session_id, None).await?;
            self.workers.dispatch(GenerationJob {
                session_id,
                tier: to,
                count: window.saturating_sub(queued),
            });
        }

        let backlog = self.db.count_unanswered(session_id, None).await?;
        let phase = SessionPhase::LevelTransition.seeded(backlog).map_err(phase_err)?;
        if phase != SessionPhase::LevelTransition
            && !self
                .db
                .update_session_state(session_id, difficulty_score, phase)
                .await?
        {
            return Ok(self.db.get_session(session_id).await?.phase);
        }
        Ok(phase)
    }

    /// Queues a few questions of the tier the session is about to enter, if it
    /// has none yet. Returns how many quota slots the queued job claims.
    async fn seed_predicted_tier(&self, session: &Session, score: f64, recent: &[bool]) -> PortResult<u32> {
        let Some(predicted) = self.engine.will_cross_tier_soon(
            score,
            recent,
            session.total_answered,
            session.target_count,
        ) else {
            return Ok(0);
        };
        if self.db.count_unanswered(session.id, Some(predicted)).await? > 0 {
            return Ok(0);
        }
        let room = self.quota_room(session.id, session.target_count).await?;
        let count = self.config.preemptive_slice.min(session.remaining()).min(room);
        if count == 0 {
            tracing::debug!(session_id = %session.id, %predicted, "No quota left for the predicted tier");
            return Ok(0);
        }
        tracing::debug!(session_id = %session.id, %predicted, count, "Pre-emptively seeding the predicted tier");
        let queued = self.workers.dispatch(GenerationJob {
            session_id: session.id,
            tier: predicted,
            count,
        });
        Ok(if queued { count } else { 0 })
    }

    /// Marks the session completed and drops everything it did not use.
    /// Completing an already completed session is a no-op.
    pub async fn complete(&self, session_id: Uuid, difficulty_score: f64) -> PortResult<()> {
        let session = self.db.get_session(session_id).await?;
        let phase = session.phase.complete().map_err(phase_err)?;
        // Flip the phase first so late workers stop linking.
        if !self
            .db
            .update_session_state(session_id, difficulty_score, phase)
            .await?
        {
            tracing::debug!(%session_id, "Session was already closed");
        }

        let unused = self.db.delete_unanswered_links(session_id, None).await?;
        let reclaimed = self.reclaimer.reclaim(&unused).await;
        tracing::info!(
            %session_id,
            answered = session.total_answered,
            correct = session.total_correct,
            unused = unused.len(),
            reclaimed,
            "Quiz session completed"
        );
        Ok(())
    }

    /// Rolls the session back entirely and reclaims the content it leaves orphaned.
    pub async fn cancel(&self, session_id: Uuid) -> PortResult<RollbackReport> {
        let session = self.db.get_session(session_id).await?;
        let phase = session.phase.cancel().map_err(phase_err)?;
        if !self
            .db
            .update_session_state(session_id, session.difficulty_score, phase)
            .await?
        {
            return Err(PortError::Conflict(format!("Session {} is already closed", session_id)));
        }

        let report = self.db.rollback_session(session_id).await?;
        let reclaimed = self.reclaimer.reclaim(&report.content_ids).await;
        tracing::info!(
            %session_id,
            answers = report.answers_deleted,
            links = report.links_deleted,
            reclaimed,
            "Quiz session cancelled"
        );
        Ok(report)
    }
}
