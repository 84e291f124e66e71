//! services/api/src/supply/mod.rs
//!
//! The question supply pipeline: generation, background workers, lifecycle
//! orchestration, delivery and cleanup.

pub mod cleanup;
pub mod delivery;
pub mod gateway;
pub mod orchestrator;
pub mod service;
pub mod worker;

pub use cleanup::OrphanReclaimer;
pub use delivery::DeliveryResolver;
pub use gateway::{buffer_size, GenerationGateway, GenerationReport};
pub use orchestrator::{AnswerReaction, SupplyOrchestrator};
pub use service::{QuizService, SubmitAnswer};
pub use worker::{GenerationJob, WorkerPool};
