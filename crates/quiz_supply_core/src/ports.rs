//! crates/quiz_supply_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the question supply pipeline.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database, content generator, cache and
//! similarity collaborators.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Answer, KnowledgeLevel, LinkOutcome, NewSession, QuestionCandidate, QuestionContent,
    QuestionPayload, RawQuestion, RecordOutcome, RollbackReport, Session, SessionPhase,
    SessionQuestionLink, Tier,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Sessions ---
    async fn create_session(&self, new_session: &NewSession, initial_score: f64) -> PortResult<Session>;

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session>;

    /// Persists the request thread's view of difficulty and lifecycle.
    /// Counters are never written through this method.
    ///
    /// A Completed or Cancelled session is never written: the call returns
    /// `Ok(false)` and leaves the row untouched.
    async fn update_session_state(
        &self,
        session_id: Uuid,
        difficulty_score: f64,
        phase: SessionPhase,
    ) -> PortResult<bool>;

    // --- Global content corpus ---
    /// Returns the existing row with the candidate's fingerprint or inserts a new one.
    /// The boolean is `true` when the row was created by this call.
    async fn find_or_create_content(
        &self,
        candidate: &QuestionCandidate,
    ) -> PortResult<(QuestionContent, bool)>;

    async fn get_content(&self, content_id: Uuid) -> PortResult<QuestionContent>;

    /// Deletes the content when it has no answers anywhere and no link into an open
    /// session. Returns whether a row was deleted. Safe to call repeatedly.
    async fn delete_content_if_orphaned(&self, content_id: Uuid) -> PortResult<bool>;

    /// Deletes every orphaned content row. Returns the number of rows removed.
    async fn sweep_orphaned_contents(&self) -> PortResult<u64>;

    // --- Session queue ---
    /// Links content into the session, re-checking the quota and the session's
    /// phase atomically with the insert.
    async fn link_content(&self, session_id: Uuid, content_id: Uuid) -> PortResult<LinkOutcome>;

    async fn count_links(&self, session_id: Uuid) -> PortResult<u32>;

    /// Unanswered links, optionally restricted to one tier.
    async fn count_unanswered(&self, session_id: Uuid, tier: Option<Tier>) -> PortResult<u32>;

    /// Unanswered links with their content, in presentation order.
    async fn unanswered_links(
        &self,
        session_id: Uuid,
    ) -> PortResult<Vec<(SessionQuestionLink, QuestionContent)>>;

    /// Deletes unanswered links (optionally of one tier) and returns their content ids.
    async fn delete_unanswered_links(&self, session_id: Uuid, tier: Option<Tier>) -> PortResult<Vec<Uuid>>;

    async fn mark_shown(&self, session_id: Uuid, content_id: Uuid) -> PortResult<()>;

    /// Fingerprints of every content linked into the session.
    async fn linked_fingerprints(&self, session_id: Uuid) -> PortResult<HashSet<String>>;

    /// Fingerprints of the content the session has already answered.
    async fn answered_fingerprints(&self, session_id: Uuid) -> PortResult<HashSet<String>>;

    /// Everything linked into the session, used as the dedup corpus.
    async fn session_contents(&self, session_id: Uuid) -> PortResult<Vec<QuestionContent>>;

    /// The most recently linked question texts, newest first.
    async fn recent_question_texts(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<String>>;

    // --- Answers ---
    /// Atomic insert-or-fetch keyed by (content, session). A new answer increments
    /// the session counters and the content usage counters in the same operation.
    async fn record_answer(&self, answer: &Answer) -> PortResult<RecordOutcome>;

    /// Correctness of the most recent answers, oldest first.
    async fn recent_outcomes(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<bool>>;

    // --- Teardown ---
    /// All-or-nothing removal of a session's answers (restoring usage counters),
    /// links and the session row itself.
    async fn rollback_session(&self, session_id: Uuid) -> PortResult<RollbackReport>;
}

//=========================================================================================
// Content Generation Ports
//=========================================================================================

/// Everything the external generator is told about the batch it must produce.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub topic: String,
    pub subtopic: Option<String>,
    pub tier: Tier,
    pub knowledge_level: KnowledgeLevel,
    pub count: u32,
    pub recent_questions: Vec<String>,
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Produces up to `request.count` questions. May return fewer, or fail.
    async fn generate(&self, request: &GenerationRequest) -> PortResult<Vec<RawQuestion>>;
}

#[async_trait]
pub trait SimilarityService: Send + Sync {
    /// Semantic similarity of two texts in `[0, 1]`.
    async fn similarity(&self, a: &str, b: &str) -> PortResult<f64>;
}

//=========================================================================================
// Prefetch Cache Port
//=========================================================================================

#[async_trait]
pub trait PrefetchCache: Send + Sync {
    async fn set(&self, session_id: Uuid, payload: QuestionPayload, ttl: Duration) -> PortResult<()>;

    /// Destructive read: a hit removes the entry.
    async fn take(&self, session_id: Uuid) -> PortResult<Option<QuestionPayload>>;

    async fn delete(&self, session_id: Uuid) -> PortResult<()>;
}
