//! The generation gateway and the worker pool, driven directly.

mod common;

use common::{raw, test_config, Behavior, FakeGenerator, KeywordSimilarity};
use quiz_api_lib::adapters::InMemoryDb;
use quiz_api_lib::supply::{GenerationGateway, GenerationJob, WorkerPool};
use quiz_supply_core::dedup::Deduplicator;
use quiz_supply_core::domain::{KnowledgeLevel, Session, SessionPhase, Tier};
use quiz_supply_core::ports::{DatabaseService, QuestionGenerator, SimilarityService};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn open_session(db: &InMemoryDb, target: u32) -> Session {
    db.create_session(&common::new_session(Uuid::new_v4(), KnowledgeLevel::Beginner, target), 2.5)
        .await
        .unwrap()
}

fn gateway(
    db: Arc<InMemoryDb>,
    generator: Arc<dyn QuestionGenerator>,
    similarity: Option<Arc<dyn SimilarityService>>,
) -> GenerationGateway {
    GenerationGateway::new(db, generator, similarity, Deduplicator::default(), test_config())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fills_never_exceed_the_quota() {
    let db = Arc::new(InMemoryDb::new());
    let session = open_session(&db, 5).await;
    let gateway = gateway(db.clone(), FakeGenerator::unique(), None);

    let fills = (0..8).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.fill(session.id, Tier::Easy, 5).await }
    });
    let reports = futures::future::join_all(fills).await;

    let accepted: u32 = reports.iter().map(|r| r.accepted).sum();
    assert_eq!(accepted, 5);
    assert_eq!(db.count_links(session.id).await.unwrap(), 5);
    // Items that lost the race were reclaimed immediately.
    assert_eq!(db.content_count().await, 5);
}

#[tokio::test]
async fn fill_stops_for_closed_sessions() {
    let db = Arc::new(InMemoryDb::new());
    let session = open_session(&db, 5).await;
    db.update_session_state(session.id, 2.5, SessionPhase::Completed)
        .await
        .unwrap();
    let generator = FakeGenerator::unique();
    let gateway = gateway(db.clone(), generator.clone(), None);

    let report = gateway.fill(session.id, Tier::Easy, 3).await;
    assert_eq!(report.accepted, 0);
    assert!(generator.requests().is_empty());
    assert_eq!(db.content_count().await, 0);
}

#[tokio::test]
async fn invalid_and_duplicate_items_are_rejected_and_reclaimed() {
    let db = Arc::new(InMemoryDb::new());
    let session = open_session(&db, 10).await;
    let generator = FakeGenerator::new(Behavior::Fixed(vec![
        raw("What is 2 + 2?", "4", ["3", "5", "22"]),
        // Same shape, different operands: never a duplicate.
        raw("What is 7 + 8?", "15", ["14", "16", "78"]),
        raw("Why do leaves change color in autumn?", "Chlorophyll breaks down", ["Cold wind", "Less water", "Insects"]),
        raw("Why do leaves change colour in the fall?", "Pigments are revealed", ["Frost", "Rain", "Birds"]),
        // Exact text of an accepted question with a different answer.
        raw("what is 2 + 2", "four", ["three", "five", "twenty-two"]),
        raw("Broken item", "A", ["A", "B", "C"]),
        raw("Too few options?", "A", ["B", "C"]),
    ]));
    let similarity: Arc<dyn SimilarityService> = Arc::new(KeywordSimilarity("leaves"));
    let gateway = gateway(db.clone(), generator.clone(), Some(similarity));

    let report = gateway.fill(session.id, Tier::Easy, 7).await;
    assert_eq!(report.received, 7);
    assert_eq!(report.accepted, 3);
    assert_eq!(report.rejected, 4);
    assert_eq!(db.count_links(session.id).await.unwrap(), 3);
    assert_eq!(db.content_count().await, 3);

    let texts: Vec<String> = db
        .session_contents(session.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(
        texts,
        vec![
            "What is 2 + 2?".to_string(),
            "What is 7 + 8?".to_string(),
            "Why do leaves change color in autumn?".to_string(),
        ]
    );
}

#[tokio::test]
async fn recent_questions_are_passed_to_the_generator() {
    let db = Arc::new(InMemoryDb::new());
    let session = open_session(&db, 10).await;
    let generator = FakeGenerator::unique();
    let gateway = gateway(db.clone(), generator.clone(), None);

    gateway.fill(session.id, Tier::Easy, 2).await;
    gateway.fill(session.id, Tier::Easy, 2).await;

    let requests = generator.requests();
    assert!(requests[0].recent_questions.is_empty());
    assert_eq!(requests[1].recent_questions.len(), 2);
    assert_eq!(requests[1].count, 3);
}

#[tokio::test]
async fn full_worker_queues_drop_jobs() {
    let db = Arc::new(InMemoryDb::new());
    let session = open_session(&db, 10).await;
    let generator = FakeGenerator::new(Behavior::Hang(Duration::from_secs(30)));
    let config = quiz_api_lib::config::PipelineConfig {
        generator_timeout: Duration::from_secs(30),
        ..test_config()
    };
    let gateway = GenerationGateway::new(db.clone(), generator, None, Deduplicator::default(), config);
    let pool = WorkerPool::spawn(gateway, 1, 1, CancellationToken::new());

    let job = GenerationJob {
        session_id: session.id,
        tier: Tier::Easy,
        count: 2,
    };
    assert!(pool.dispatch(job));
    // Let the single worker pick the first job up and block on the generator.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pool.dispatch(job));
    assert!(!pool.dispatch(job));
    assert_eq!(pool.in_flight(), 2);

    pool.shutdown();
    assert!(!pool.dispatch(job));
}
