//! services/api/src/supply/gateway.rs
//!
//! The generation gateway turns "N more questions for (session, tier)" into N
//! persisted and linked `QuestionContent` rows. It oversamples the generator to
//! absorb rejects, validates and deduplicates every item, and never lets a
//! generator failure escape: the worst outcome is a shorter batch.

use crate::config::PipelineConfig;
use crate::supply::cleanup::OrphanReclaimer;
use quiz_supply_core::{
    dedup::{DedupSubject, DedupVerdict, Deduplicator, DuplicateReason},
    domain::{CandidateError, LinkOutcome, QuestionCandidate, QuestionContent, RawQuestion, Tier},
    ports::{DatabaseService, GenerationRequest, PortResult, QuestionGenerator, SimilarityService},
};
use std::sync::Arc;
use uuid::Uuid;

/// How many items to request so that `target` survive validation and dedup.
/// Zero for a zero target.
pub fn buffer_size(target: u32, ratio: f64, min_extra: u32) -> u32 {
    if target == 0 {
        return 0;
    }
    // The epsilon keeps 10 * 1.1 from rounding up to 12.
    let scaled = (f64::from(target) * ratio - 1e-9).ceil().max(0.0) as u32;
    scaled.max(target + min_extra)
}

/// Counts of one gateway run, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub requested: u32,
    pub received: u32,
    pub accepted: u32,
    pub rejected: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    Invalid(CandidateError),
    SeenInSession,
    Duplicate(DuplicateReason),
}

#[derive(Debug, Clone, PartialEq)]
enum ItemOutcome {
    Accepted,
    Rejected(Rejection),
    /// The session closed or its quota filled; later items would fail too.
    Stop,
}

#[derive(Clone)]
pub struct GenerationGateway {
    db: Arc<dyn DatabaseService>,
    generator: Arc<dyn QuestionGenerator>,
    similarity: Option<Arc<dyn SimilarityService>>,
    dedup: Deduplicator,
    reclaimer: OrphanReclaimer,
    config: PipelineConfig,
}

impl GenerationGateway {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        generator: Arc<dyn QuestionGenerator>,
        similarity: Option<Arc<dyn SimilarityService>>,
        dedup: Deduplicator,
        config: PipelineConfig,
    ) -> Self {
        let reclaimer = OrphanReclaimer::new(db.clone());
        Self {
            db,
            generator,
            similarity,
            dedup,
            reclaimer,
            config,
        }
    }

    pub fn buffer_size(&self, target: u32) -> u32 {
        buffer_size(target, self.config.buffer_ratio, self.config.buffer_min_extra)
    }

    /// Generates, filters and links up to `wanted` questions of `tier` into the session.
    pub async fn fill(&self, session_id: Uuid, tier: Tier, wanted: u32) -> GenerationReport {
        let mut report = GenerationReport::default();
        if wanted == 0 {
            return report;
        }

        let session = match self.db.get_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(%session_id, "Skipping generation, session unavailable: {}", e);
                return report;
            }
        };
        if !session.phase.accepts_generation() {
            tracing::debug!(%session_id, phase = %session.phase, "Skipping generation for a closed session");
            return report;
        }
        let linked = match self.db.count_links(session_id).await {
            Ok(linked) => linked,
            Err(e) => {
                tracing::warn!(%session_id, "Skipping generation, could not count links: {}", e);
                return report;
            }
        };
        let wanted = wanted.min(session.target_count.saturating_sub(linked));
        if wanted == 0 {
            return report;
        }

        let recent_questions = self
            .db
            .recent_question_texts(session_id, self.config.recent_sample)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(%session_id, "Could not load recent questions: {}", e);
                Vec::new()
            });
        let request = GenerationRequest {
            topic: session.topic.clone(),
            subtopic: session.subtopic.clone(),
            tier,
            knowledge_level: session.knowledge_level,
            count: self.buffer_size(wanted),
            recent_questions,
        };
        report.requested = request.count;

        let batch = self.fetch_batch(&request).await;
        report.received = batch.len() as u32;

        for raw in batch {
            if report.accepted >= wanted {
                break;
            }
            match self.accept_or_reject(session_id, &session.topic, tier, raw).await {
                Ok(ItemOutcome::Accepted) => report.accepted += 1,
                Ok(ItemOutcome::Rejected(reason)) => {
                    tracing::debug!(%session_id, ?reason, "Rejected generated question");
                    report.rejected += 1;
                }
                Ok(ItemOutcome::Stop) => break,
                Err(e) => {
                    tracing::warn!(%session_id, "Failed to store generated question: {}", e);
                    report.rejected += 1;
                }
            }
        }

        tracing::info!(
            %session_id,
            %tier,
            requested = report.requested,
            received = report.received,
            accepted = report.accepted,
            rejected = report.rejected,
            "Generation batch finished"
        );
        report
    }

    /// One generator call under the timeout. Failures become an empty batch.
    async fn fetch_batch(&self, request: &GenerationRequest) -> Vec<RawQuestion> {
        match tokio::time::timeout(self.config.generator_timeout, self.generator.generate(request)).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                tracing::error!(tier = %request.tier, "Question generator failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                tracing::error!(
                    tier = %request.tier,
                    timeout_secs = self.config.generator_timeout.as_secs(),
                    "Question generator timed out"
                );
                Vec::new()
            }
        }
    }

    async fn accept_or_reject(
        &self,
        session_id: Uuid,
        topic: &str,
        tier: Tier,
        raw: RawQuestion,
    ) -> PortResult<ItemOutcome> {
        // Fresh read before every item: workers race each other and the player.
        let session = self.db.get_session(session_id).await?;
        if !session.phase.accepts_generation() {
            return Ok(ItemOutcome::Stop);
        }
        if self.db.count_links(session_id).await? >= session.target_count {
            return Ok(ItemOutcome::Stop);
        }

        let candidate = match QuestionCandidate::from_raw(raw, topic, tier) {
            Ok(candidate) => candidate,
            Err(e) => return Ok(ItemOutcome::Rejected(Rejection::Invalid(e))),
        };
        if self
            .db
            .linked_fingerprints(session_id)
            .await?
            .contains(&candidate.fingerprint)
        {
            return Ok(ItemOutcome::Rejected(Rejection::SeenInSession));
        }

        let corpus = self.db.session_contents(session_id).await?;
        let (content, created) = self.db.find_or_create_content(&candidate).await?;

        if let DedupVerdict::Duplicate { reason, score } = self.dedup_against(&candidate, content.id, &corpus).await {
            tracing::trace!(%session_id, ?reason, score, "Near-duplicate of an existing question");
            if created {
                self.reclaimer.reclaim_one(content.id).await;
            }
            return Ok(ItemOutcome::Rejected(Rejection::Duplicate(reason)));
        }

        let outcome = self.db.link_content(session_id, content.id).await?;
        let item = match outcome {
            LinkOutcome::Linked(_) => return Ok(ItemOutcome::Accepted),
            LinkOutcome::AlreadyLinked => ItemOutcome::Rejected(Rejection::SeenInSession),
            LinkOutcome::QuotaFull | LinkOutcome::SessionClosed => ItemOutcome::Stop,
        };
        if created {
            self.reclaimer.reclaim_one(content.id).await;
        }
        Ok(item)
    }

    /// Compares the candidate with every question already linked into the session.
    async fn dedup_against(
        &self,
        candidate: &QuestionCandidate,
        content_id: Uuid,
        corpus: &[QuestionContent],
    ) -> DedupVerdict {
        let subject = DedupSubject::from(candidate);
        for existing in corpus.iter().filter(|c| c.id != content_id) {
            let other = DedupSubject::from(existing);
            let verdict = match self.dedup.structural_verdict(&subject, &other) {
                Some(verdict) => verdict,
                None => {
                    let score = self.semantic_score(&subject.text, &other.text).await;
                    self.dedup.check(&subject, &other, score)
                }
            };
            if verdict.is_duplicate() {
                return verdict;
            }
        }
        DedupVerdict::Unique
    }

    async fn semantic_score(&self, a: &str, b: &str) -> Option<f64> {
        let similarity = self.similarity.as_ref()?;
        match similarity.similarity(a, b).await {
            Ok(score) => Some(score),
            Err(e) => {
                tracing::debug!("Similarity unavailable, skipping the semantic check: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_oversamples_by_ratio_with_a_minimum_extra() {
        assert_eq!(buffer_size(5, 1.1, 1), 6);
        assert_eq!(buffer_size(10, 1.1, 1), 11);
        assert_eq!(buffer_size(20, 1.1, 1), 22);
        assert_eq!(buffer_size(1, 1.1, 1), 2);
        assert_eq!(buffer_size(3, 1.5, 1), 5);
    }

    #[test]
    fn zero_target_needs_no_buffer() {
        assert_eq!(buffer_size(0, 1.1, 1), 0);
    }
}
