pub mod dedup;
pub mod difficulty;
pub mod domain;
pub mod fingerprint;
pub mod ports;

pub use dedup::{DedupConfig, DedupSubject, DedupVerdict, Deduplicator, DuplicateReason, QuestionCategory};
pub use difficulty::{DifficultyConfig, DifficultyEngine};
pub use domain::{
    Answer, AnswerOutcome, CandidateError, Delivery, KnowledgeLevel, LinkOutcome, NewSession,
    PhaseError, QuestionCandidate, QuestionContent, QuestionPayload, RawQuestion, RecordOutcome,
    RollbackReport, Session, SessionPhase, SessionQuestionLink, SessionStats, Tier,
};
pub use ports::{
    DatabaseService, GenerationRequest, PortError, PortResult, PrefetchCache, QuestionGenerator,
    SimilarityService,
};
