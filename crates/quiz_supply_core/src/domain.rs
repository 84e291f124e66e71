//! crates/quiz_supply_core/src/domain.rs
//!
//! Defines the pure, core data structures for the question supply pipeline.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Tiers and Knowledge Levels
//=========================================================================================

/// A discrete difficulty tier derived from the continuous difficulty score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Easy,
    Medium,
    Hard,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Easy, Tier::Medium, Tier::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Easy => "easy",
            Tier::Medium => "medium",
            Tier::Hard => "hard",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Tier::Easy),
            "medium" => Ok(Tier::Medium),
            "hard" => Ok(Tier::Hard),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// The player's self-declared knowledge level, chosen when the quiz starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnowledgeLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl KnowledgeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeLevel::Beginner => "beginner",
            KnowledgeLevel::Intermediate => "intermediate",
            KnowledgeLevel::Advanced => "advanced",
        }
    }

    /// The tier a fresh session starts in.
    pub fn starting_tier(self) -> Tier {
        match self {
            KnowledgeLevel::Beginner => Tier::Easy,
            KnowledgeLevel::Intermediate => Tier::Medium,
            KnowledgeLevel::Advanced => Tier::Hard,
        }
    }
}

impl fmt::Display for KnowledgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(KnowledgeLevel::Beginner),
            "intermediate" => Ok(KnowledgeLevel::Intermediate),
            "advanced" => Ok(KnowledgeLevel::Advanced),
            other => Err(format!("unknown knowledge level '{}'", other)),
        }
    }
}

//=========================================================================================
// Session Lifecycle
//=========================================================================================

/// Raised when a lifecycle transition is attempted from a state that forbids it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    #[error("session is already {0}")]
    Closed(SessionPhase),
}

/// The explicit lifecycle of a quiz session's question backlog.
///
/// `Completed` and `Cancelled` are terminal: no transition leaves them and no
/// generation is accepted for a session in either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Just created, backlog still empty.
    Seeding,
    /// At least one unanswered item is queued.
    Steady,
    /// The difficulty tier changed on the last answer; backlog is being re-seeded.
    LevelTransition,
    /// Close to the target count, no speculative seeding any more.
    Draining,
    Completed,
    Cancelled,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Seeding => "seeding",
            SessionPhase::Steady => "steady",
            SessionPhase::LevelTransition => "level_transition",
            SessionPhase::Draining => "draining",
            SessionPhase::Completed => "completed",
            SessionPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Cancelled)
    }

    /// Whether the gateway may link new content into a session in this phase.
    pub fn accepts_generation(self) -> bool {
        !self.is_terminal()
    }

    /// Whether speculative (pre-emptive or top-up) seeding is worthwhile.
    pub fn allows_speculative_seeding(self) -> bool {
        matches!(self, SessionPhase::Seeding | SessionPhase::Steady)
    }

    /// Transition after an initial or re-seeding pass has produced `backlog` items.
    pub fn seeded(self, backlog: u32) -> Result<Self, PhaseError> {
        match self {
            SessionPhase::Completed | SessionPhase::Cancelled => Err(PhaseError::Closed(self)),
            SessionPhase::Seeding | SessionPhase::LevelTransition if backlog > 0 => {
                Ok(SessionPhase::Steady)
            }
            other => Ok(other),
        }
    }

    /// Transition after an answer has been recorded.
    ///
    /// `draining_window` is the number of outstanding questions at or below which
    /// the session stops speculative seeding.
    pub fn answered(
        self,
        answered: u32,
        target: u32,
        tier_changed: bool,
        draining_window: u32,
    ) -> Result<Self, PhaseError> {
        if self.is_terminal() {
            return Err(PhaseError::Closed(self));
        }
        let remaining = target.saturating_sub(answered);
        Ok(if remaining == 0 {
            SessionPhase::Completed
        } else if tier_changed {
            SessionPhase::LevelTransition
        } else if remaining <= draining_window {
            SessionPhase::Draining
        } else if self == SessionPhase::LevelTransition {
            SessionPhase::Steady
        } else {
            self
        })
    }

    pub fn complete(self) -> Result<Self, PhaseError> {
        match self {
            SessionPhase::Cancelled => Err(PhaseError::Closed(self)),
            _ => Ok(SessionPhase::Completed),
        }
    }

    pub fn cancel(self) -> Result<Self, PhaseError> {
        match self {
            SessionPhase::Completed | SessionPhase::Cancelled => Err(PhaseError::Closed(self)),
            _ => Ok(SessionPhase::Cancelled),
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seeding" => Ok(SessionPhase::Seeding),
            "steady" => Ok(SessionPhase::Steady),
            "level_transition" => Ok(SessionPhase::LevelTransition),
            "draining" => Ok(SessionPhase::Draining),
            "completed" => Ok(SessionPhase::Completed),
            "cancelled" => Ok(SessionPhase::Cancelled),
            other => Err(format!("unknown session phase '{}'", other)),
        }
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

/// Parameters supplied by the caller when a quiz is started.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub topic: String,
    pub subtopic: Option<String>,
    pub knowledge_level: KnowledgeLevel,
    pub target_count: u32,
    pub seconds_per_question: u32,
    pub adaptive: bool,
}

/// One quiz attempt.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub subtopic: Option<String>,
    pub knowledge_level: KnowledgeLevel,
    pub target_count: u32,
    pub seconds_per_question: u32,
    pub adaptive: bool,
    pub difficulty_score: f64,
    pub streak: u32,
    pub total_answered: u32,
    pub total_correct: u32,
    pub generated_count: u32,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Questions still to be answered before the session completes.
    pub fn remaining(&self) -> u32 {
        self.target_count.saturating_sub(self.total_answered)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Completed || self.total_answered >= self.target_count
    }
}

/// A snapshot of a session's progress, returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub total_answered: u32,
    pub total_correct: u32,
    pub target_count: u32,
    pub streak: u32,
    pub difficulty_score: f64,
    pub tier: Tier,
    pub phase: SessionPhase,
}

//=========================================================================================
// Question Content
//=========================================================================================

/// A question exactly as the external generator produced it. Nothing about it is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuestion {
    pub text: String,
    pub correct_answer: String,
    pub wrong_answers: Vec<String>,
    pub explanation: String,
}

/// Why a raw generated item could not become a candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error("question text is empty")]
    EmptyText,
    #[error("correct answer is empty")]
    EmptyAnswer,
    #[error("expected 3 wrong answers, got {0}")]
    WrongAnswerCount(usize),
    #[error("answer options are not pairwise distinct")]
    DuplicateOptions,
}

/// A validated question ready to be persisted into the global corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCandidate {
    pub text: String,
    pub correct_answer: String,
    pub wrong_answers: [String; 3],
    pub explanation: String,
    pub topic: String,
    pub tier: Tier,
    pub fingerprint: String,
}

impl QuestionCandidate {
    /// Validates a raw item and computes its fingerprint.
    pub fn from_raw(raw: RawQuestion, topic: &str, tier: Tier) -> Result<Self, CandidateError> {
        let text = raw.text.trim().to_string();
        let correct_answer = raw.correct_answer.trim().to_string();
        if text.is_empty() {
            return Err(CandidateError::EmptyText);
        }
        if correct_answer.is_empty() {
            return Err(CandidateError::EmptyAnswer);
        }
        let wrong: Vec<String> = raw
            .wrong_answers
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        let wrong_answers: [String; 3] = wrong
            .try_into()
            .map_err(|w: Vec<String>| CandidateError::WrongAnswerCount(w.len()))?;

        let mut seen = std::collections::HashSet::new();
        let all_distinct = std::iter::once(&correct_answer)
            .chain(wrong_answers.iter())
            .all(|option| seen.insert(crate::dedup::normalize(option)));
        if !all_distinct {
            return Err(CandidateError::DuplicateOptions);
        }

        let fingerprint = crate::fingerprint::fingerprint(&text, &correct_answer, topic, tier);
        Ok(Self {
            text,
            correct_answer,
            wrong_answers,
            explanation: raw.explanation.trim().to_string(),
            topic: topic.to_string(),
            tier,
            fingerprint,
        })
    }
}

/// A generated question in the global, content-addressed corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionContent {
    pub id: Uuid,
    pub text: String,
    pub correct_answer: String,
    pub wrong_answers: [String; 3],
    pub explanation: String,
    pub topic: String,
    pub tier: Tier,
    pub fingerprint: String,
    pub times_served: u32,
    pub times_correct: u32,
    pub created_at: DateTime<Utc>,
}

impl QuestionContent {
    /// All four options, correct answer first.
    pub fn options(&self) -> Vec<String> {
        std::iter::once(self.correct_answer.clone())
            .chain(self.wrong_answers.iter().cloned())
            .collect()
    }
}

/// Places one `QuestionContent` into one session's ordered queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionQuestionLink {
    pub session_id: Uuid,
    pub content_id: Uuid,
    pub order: u32,
    pub shown_at: Option<DateTime<Utc>>,
}

/// The result of trying to link content into a session under its quota.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    Linked(SessionQuestionLink),
    /// The session already holds `target_count` links.
    QuotaFull,
    /// The content is already in this session's queue.
    AlreadyLinked,
    /// The session is completed, cancelled or gone.
    SessionClosed,
}

//=========================================================================================
// Answers
//=========================================================================================

/// One recorded outcome for a (content, session) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content_id: Uuid,
    pub user_id: Uuid,
    pub selected_text: String,
    pub is_correct: bool,
    pub response_time_ms: u32,
    pub difficulty_at_answer: f64,
    pub answered_at: DateTime<Utc>,
}

/// The result of the atomic insert-or-fetch of an answer.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// The answer was new; carries the session with its counters already incremented.
    Recorded(Session),
    /// An answer for this (content, session) already existed; nothing was counted.
    Duplicate(Answer),
    /// The session is no longer accepting answers.
    SessionClosed,
}

/// Rows touched by a session rollback, needed for the follow-up orphan reclaim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub answers_deleted: u32,
    pub links_deleted: u32,
    pub content_ids: Vec<Uuid>,
}

//=========================================================================================
// Delivery
//=========================================================================================

/// The player-facing form of the next question. Never carries the correct answer.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPayload {
    pub session_id: Uuid,
    pub content_id: Uuid,
    pub text: String,
    pub options: Vec<String>,
    pub tier: Tier,
    pub seconds_per_question: u32,
    pub question_number: u32,
    pub total_questions: u32,
}

/// The outcome of a "give me the next question" request.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Ready(QuestionPayload),
    /// Nothing could be produced within the wait budget; the caller should retry.
    Unavailable,
    /// The session has reached its target count.
    Finished,
}

/// The result returned to the caller of `submit_answer`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer: String,
    pub explanation: String,
    pub tier_changed: bool,
    pub already_answered: bool,
    pub stats: SessionStats,
}
