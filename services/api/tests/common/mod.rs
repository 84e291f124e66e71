//! Shared fixtures for the pipeline integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use quiz_api_lib::adapters::{InMemoryDb, InMemoryPrefetchCache};
use quiz_api_lib::config::PipelineConfig;
use quiz_api_lib::supply::{QuizService, SubmitAnswer};
use quiz_supply_core::dedup::Deduplicator;
use quiz_supply_core::difficulty::DifficultyEngine;
use quiz_supply_core::domain::{AnswerOutcome, Delivery, KnowledgeLevel, NewSession, RawQuestion, Session, Tier};
use quiz_supply_core::ports::{DatabaseService, GenerationRequest, PortError, PortResult, QuestionGenerator, SimilarityService};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// Fake generators
//=========================================================================================

pub enum Behavior {
    /// A fresh, valid question for every requested slot.
    Unique,
    /// The same items on every call.
    Fixed(Vec<RawQuestion>),
    Fail,
    Hang(Duration),
}

pub struct FakeGenerator {
    behavior: Behavior,
    next_id: AtomicU32,
    requested: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            next_id: AtomicU32::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn unique() -> Arc<Self> {
        Self::new(Behavior::Unique)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> PortResult<Vec<RawQuestion>> {
        self.requested.lock().unwrap().push(request.clone());
        match &self.behavior {
            Behavior::Unique => Ok((0..request.count)
                .map(|_| unique_question(self.next_id.fetch_add(1, Ordering::SeqCst) + 1, request.tier))
                .collect()),
            Behavior::Fixed(items) => Ok(items.clone()),
            Behavior::Fail => Err(PortError::Unexpected("generator offline".to_string())),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn unique_question(n: u32, tier: Tier) -> RawQuestion {
    RawQuestion {
        text: format!("Which {} fact number {} should every player know?", tier, n),
        correct_answer: format!("right {}", n),
        wrong_answers: vec![
            format!("wrong a{}", n),
            format!("wrong b{}", n),
            format!("wrong c{}", n),
        ],
        explanation: format!("Fact {} is well known.", n),
    }
}

pub fn raw<const N: usize>(text: &str, correct: &str, wrong: [&str; N]) -> RawQuestion {
    RawQuestion {
        text: text.to_string(),
        correct_answer: correct.to_string(),
        wrong_answers: wrong.iter().map(|w| w.to_string()).collect(),
        explanation: String::new(),
    }
}

/// Scores texts sharing `keyword` as near-identical and everything else as unrelated.
pub struct KeywordSimilarity(pub &'static str);

#[async_trait]
impl SimilarityService for KeywordSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> PortResult<f64> {
        let hit = a.to_lowercase().contains(self.0) && b.to_lowercase().contains(self.0);
        Ok(if hit { 0.99 } else { 0.1 })
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        generator_timeout: Duration::from_millis(200),
        background_workers: 2,
        delivery_wait: Duration::from_millis(200),
        delivery_poll_interval: Duration::from_millis(20),
        ..PipelineConfig::default()
    }
}

pub fn new_session(user_id: Uuid, level: KnowledgeLevel, target: u32) -> NewSession {
    NewSession {
        user_id,
        topic: "Space".to_string(),
        subtopic: None,
        knowledge_level: level,
        target_count: target,
        seconds_per_question: 20,
        adaptive: true,
    }
}

pub struct Harness {
    pub db: Arc<InMemoryDb>,
    pub cache: Arc<InMemoryPrefetchCache>,
    pub generator: Arc<FakeGenerator>,
    pub quiz: QuizService,
    pub user_id: Uuid,
}

impl Harness {
    pub fn new(generator: Arc<FakeGenerator>) -> Self {
        Self::with_config(generator, test_config())
    }

    pub fn with_config(generator: Arc<FakeGenerator>, config: PipelineConfig) -> Self {
        Self::with_engine(generator, DifficultyEngine::default(), config)
    }

    pub fn with_engine(generator: Arc<FakeGenerator>, engine: DifficultyEngine, config: PipelineConfig) -> Self {
        let db = Arc::new(InMemoryDb::new());
        let cache = Arc::new(InMemoryPrefetchCache::new());
        let quiz = QuizService::new(
            db.clone(),
            generator.clone(),
            None,
            cache.clone(),
            engine,
            Deduplicator::default(),
            config,
            CancellationToken::new(),
        );
        Self {
            db,
            cache,
            generator,
            quiz,
            user_id: Uuid::new_v4(),
        }
    }

    /// Waits for every queued background job.
    pub async fn settle(&self) {
        assert!(
            self.quiz.workers().wait_idle(Duration::from_secs(5)).await,
            "background generation did not finish"
        );
    }

    pub async fn start(&self, level: KnowledgeLevel, target: u32) -> Session {
        self.quiz
            .start_session(new_session(self.user_id, level, target))
            .await
            .unwrap()
    }

    pub async fn session(&self, session_id: Uuid) -> Session {
        self.db.get_session(session_id).await.unwrap()
    }

    /// Fetches the next question and answers it, correctly or not.
    pub async fn answer_next(&self, session_id: Uuid, correct: bool) -> AnswerOutcome {
        let payload = match self.quiz.get_next_question(session_id, self.user_id).await.unwrap() {
            Delivery::Ready(payload) => payload,
            other => panic!("expected a question, got {:?}", other),
        };
        let content = self.db.get_content(payload.content_id).await.unwrap();
        let selected = if correct {
            content.correct_answer.clone()
        } else {
            content.wrong_answers[0].clone()
        };
        let outcome = self
            .quiz
            .submit_answer(SubmitAnswer {
                session_id,
                content_id: payload.content_id,
                user_id: self.user_id,
                selected,
                response_time_ms: 1500,
            })
            .await
            .unwrap();
        self.settle().await;
        outcome
    }
}
