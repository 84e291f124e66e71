//! End-to-end behaviour of the question supply pipeline over the in-memory store.

mod common;

use common::{test_config, Behavior, FakeGenerator, Harness};
use quiz_api_lib::supply::SubmitAnswer;
use quiz_supply_core::difficulty::{DifficultyConfig, DifficultyEngine};
use quiz_supply_core::domain::{Delivery, KnowledgeLevel, QuestionCandidate, SessionPhase, Tier};
use quiz_supply_core::ports::{DatabaseService, PortError, PrefetchCache};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn start_session_seeds_inline_and_fills_the_rest_in_the_background() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 5).await;

    assert_eq!(session.difficulty_score, 2.5);
    assert_eq!(session.phase, SessionPhase::Steady);
    assert!(h.db.count_links(session.id).await.unwrap() >= 3);

    h.settle().await;
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 5);
    assert_eq!(h.db.count_unanswered(session.id, Some(Tier::Easy)).await.unwrap(), 5);

    let first = &h.generator.requests()[0];
    assert_eq!(first.tier, Tier::Easy);
    assert_eq!(first.knowledge_level, KnowledgeLevel::Beginner);
}

#[tokio::test]
async fn the_generator_is_asked_for_a_buffered_count() {
    let config = quiz_api_lib::config::PipelineConfig {
        sync_slice: 5,
        ..test_config()
    };
    let h = Harness::with_config(FakeGenerator::unique(), config);
    h.start(KnowledgeLevel::Intermediate, 5).await;

    let first = &h.generator.requests()[0];
    assert_eq!(first.count, 6);
    assert_eq!(first.tier, Tier::Medium);
}

#[tokio::test]
async fn resubmitting_an_answer_is_idempotent() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 5).await;
    h.settle().await;

    let Delivery::Ready(payload) = h.quiz.get_next_question(session.id, h.user_id).await.unwrap() else {
        panic!("expected a question");
    };
    let content = h.db.get_content(payload.content_id).await.unwrap();
    let submit = |selected: String| SubmitAnswer {
        session_id: session.id,
        content_id: payload.content_id,
        user_id: h.user_id,
        selected,
        response_time_ms: 900,
    };

    let first = h.quiz.submit_answer(submit(content.correct_answer.clone())).await.unwrap();
    assert!(first.is_correct);
    assert!(!first.already_answered);

    // A different choice on resubmission does not change the recorded result.
    let second = h.quiz.submit_answer(submit(content.wrong_answers[1].clone())).await.unwrap();
    assert!(second.already_answered);
    assert!(second.is_correct);
    assert!(!second.tier_changed);
    assert_eq!(second.stats.total_answered, 1);

    assert_eq!(h.db.answer_count(session.id).await, 1);
    let content = h.db.get_content(payload.content_id).await.unwrap();
    assert_eq!(content.times_served, 1);
    assert_eq!(content.times_correct, 1);
}

#[tokio::test]
async fn wrong_answers_reset_the_streak() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Intermediate, 6).await;
    h.settle().await;

    let right = h.answer_next(session.id, true).await;
    assert_eq!(right.stats.streak, 1);
    let wrong = h.answer_next(session.id, false).await;
    assert!(!wrong.is_correct);
    assert_eq!(wrong.stats.streak, 0);
    assert_eq!(wrong.stats.total_correct, 1);
    assert_eq!(wrong.stats.total_answered, 2);
}

#[tokio::test]
async fn the_backlog_is_a_rolling_window_not_the_whole_quiz() {
    let h = Harness::new(FakeGenerator::unique());
    let mut new_session = common::new_session(h.user_id, KnowledgeLevel::Beginner, 12);
    new_session.adaptive = false;
    let session = h.quiz.start_session(new_session).await.unwrap();
    h.settle().await;
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 5);

    // Each answer tops the window back up by one.
    h.answer_next(session.id, true).await;
    h.answer_next(session.id, false).await;
    assert_eq!(h.db.count_unanswered(session.id, Some(Tier::Easy)).await.unwrap(), 5);
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 7);
}

#[tokio::test]
async fn a_predicted_tier_is_seeded_before_the_flip() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 8).await;
    h.settle().await;
    h.db.update_session_state(session.id, 4.0, SessionPhase::Steady)
        .await
        .unwrap();

    // One more correct answer would lift 4.0 into the medium tier.
    let outcome = h.answer_next(session.id, true).await;
    assert!(!outcome.tier_changed);
    assert_eq!(outcome.stats.tier, Tier::Easy);

    assert!(h.generator.requests().iter().any(|r| r.tier == Tier::Medium));
    assert_eq!(h.db.count_unanswered(session.id, Some(Tier::Medium)).await.unwrap(), 3);
    assert_eq!(h.db.count_unanswered(session.id, Some(Tier::Easy)).await.unwrap(), 4);
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 8);

    // The speculative questions wait until the player actually gets there.
    let Delivery::Ready(next) = h.quiz.get_next_question(session.id, h.user_id).await.unwrap() else {
        panic!("expected a question");
    };
    assert_eq!(next.tier, Tier::Easy);
}

#[tokio::test]
async fn crossing_into_medium_purges_the_easy_backlog_and_reseeds() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 8).await;
    h.settle().await;
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 5);

    h.db.update_session_state(session.id, 4.0, SessionPhase::Steady)
        .await
        .unwrap();

    let first = h.answer_next(session.id, true).await;
    assert!(!first.tier_changed);
    assert_eq!(first.stats.difficulty_score, 4.0);
    let medium_requests = h.generator.requests().iter().filter(|r| r.tier == Tier::Medium).count();

    let second = h.answer_next(session.id, true).await;
    assert!(second.tier_changed);
    assert_eq!(second.stats.difficulty_score, 6.0);
    assert_eq!(second.stats.tier, Tier::Medium);
    assert_eq!(second.stats.phase, SessionPhase::Steady);

    assert_eq!(h.db.count_unanswered(session.id, Some(Tier::Easy)).await.unwrap(), 0);
    // Three pre-seeded medium questions were kept; the transition only topped up two.
    assert_eq!(h.db.count_unanswered(session.id, Some(Tier::Medium)).await.unwrap(), 5);
    assert_eq!(
        h.generator.requests().iter().filter(|r| r.tier == Tier::Medium).count(),
        medium_requests + 1
    );
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 7);
    // The three purged easy questions were reclaimed.
    assert_eq!(h.db.content_count().await, 7);

    let Delivery::Ready(next) = h.quiz.get_next_question(session.id, h.user_id).await.unwrap() else {
        panic!("expected a question");
    };
    assert_eq!(next.tier, Tier::Medium);
    assert_eq!(next.question_number, 3);
}

#[tokio::test]
async fn the_injected_difficulty_engine_drives_adaptation() {
    let engine = DifficultyEngine::new(DifficultyConfig {
        up_step: 3.0,
        streak_threshold: 1,
        ..DifficultyConfig::default()
    });
    let h = Harness::with_engine(FakeGenerator::unique(), engine, test_config());
    let session = h.start(KnowledgeLevel::Beginner, 6).await;
    h.settle().await;

    let outcome = h.answer_next(session.id, true).await;
    assert!(outcome.tier_changed);
    assert_eq!(outcome.stats.difficulty_score, 5.5);
    assert_eq!(outcome.stats.tier, Tier::Medium);
}

#[tokio::test]
async fn non_adaptive_sessions_keep_their_score() {
    let h = Harness::new(FakeGenerator::unique());
    let mut new_session = common::new_session(h.user_id, KnowledgeLevel::Beginner, 5);
    new_session.adaptive = false;
    let session = h.quiz.start_session(new_session).await.unwrap();
    h.settle().await;

    h.answer_next(session.id, true).await;
    let outcome = h.answer_next(session.id, true).await;
    assert!(!outcome.tier_changed);
    assert_eq!(outcome.stats.difficulty_score, 2.5);
    assert_eq!(outcome.stats.tier, Tier::Easy);
}

#[tokio::test]
async fn completing_a_session_leaves_no_orphans() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 3).await;
    h.settle().await;

    let mut last = None;
    for _ in 0..3 {
        last = Some(h.answer_next(session.id, true).await);
    }
    let last = last.unwrap();
    assert_eq!(last.stats.phase, SessionPhase::Completed);
    assert_eq!(last.stats.total_answered, 3);

    assert_eq!(h.db.count_unanswered(session.id, None).await.unwrap(), 0);
    assert_eq!(h.db.content_count().await, h.db.answer_count(session.id).await);
    assert_eq!(h.db.sweep_orphaned_contents().await.unwrap(), 0);

    let delivery = h.quiz.get_next_question(session.id, h.user_id).await.unwrap();
    assert_eq!(delivery, Delivery::Finished);
}

#[tokio::test]
async fn ending_early_drops_the_unanswered_backlog() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Advanced, 6).await;
    h.settle().await;

    h.answer_next(session.id, false).await;
    let stats = h.quiz.end_session(session.id, h.user_id).await.unwrap();
    assert_eq!(stats.phase, SessionPhase::Completed);
    assert_eq!(stats.total_answered, 1);

    h.settle().await;
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 1);
    assert_eq!(h.db.content_count().await, 1);
    assert_eq!(
        h.quiz.get_next_question(session.id, h.user_id).await.unwrap(),
        Delivery::Finished
    );

    // Ending twice is harmless.
    let again = h.quiz.end_session(session.id, h.user_id).await.unwrap();
    assert_eq!(again.total_answered, 1);
}

#[tokio::test]
async fn cancelling_rolls_back_and_keeps_content_used_elsewhere() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 4).await;
    h.settle().await;

    let outcome = h.answer_next(session.id, true).await;
    assert_eq!(outcome.stats.total_answered, 1);
    let answered = h
        .db
        .session_contents(session.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.times_served == 1)
        .expect("one content was answered");

    // Another open session still queues the answered question.
    let other = h
        .db
        .create_session(&common::new_session(Uuid::new_v4(), KnowledgeLevel::Beginner, 4), 2.5)
        .await
        .unwrap();
    h.db.force_link(other.id, answered.id).await;

    let report = h.quiz.cancel_session(session.id, h.user_id).await.unwrap();
    assert_eq!(report.answers_deleted, 1);
    assert_eq!(report.links_deleted, 4);

    assert!(matches!(h.db.get_session(session.id).await, Err(PortError::NotFound(_))));
    assert_eq!(h.db.answer_count(session.id).await, 0);
    assert_eq!(h.db.content_count().await, 1);
    let kept = h.db.get_content(answered.id).await.unwrap();
    assert_eq!(kept.times_served, 0);
    assert_eq!(kept.times_correct, 0);
}

#[tokio::test]
async fn a_failing_generator_leaves_the_player_with_an_explicit_unavailable() {
    let h = Harness::new(FakeGenerator::new(Behavior::Fail));
    let session = h.start(KnowledgeLevel::Beginner, 3).await;
    assert_eq!(session.phase, SessionPhase::Seeding);
    h.settle().await;
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 0);

    let delivery = h.quiz.get_next_question(session.id, h.user_id).await.unwrap();
    assert_eq!(delivery, Delivery::Unavailable);
    // Start, its background job and the delivery's own seeding pass.
    assert!(h.generator.requests().len() >= 3);
    assert_eq!(h.db.content_count().await, 0);
}

#[tokio::test]
async fn a_hanging_generator_is_cut_off_by_the_timeout() {
    let h = Harness::new(FakeGenerator::new(Behavior::Hang(Duration::from_secs(30))));
    let started = tokio::time::timeout(Duration::from_secs(5), h.start(KnowledgeLevel::Beginner, 3)).await;
    let session = started.expect("start_session must not wait for the generator");
    assert_eq!(h.db.count_links(session.id).await.unwrap(), 0);

    let delivery = tokio::time::timeout(
        Duration::from_secs(5),
        h.quiz.get_next_question(session.id, h.user_id),
    )
    .await
    .expect("delivery is bounded")
    .unwrap();
    assert_eq!(delivery, Delivery::Unavailable);
}

#[tokio::test]
async fn the_next_question_is_prefetched_after_an_answer() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 5).await;
    h.settle().await;
    h.answer_next(session.id, false).await;

    let mut cached = None;
    for _ in 0..50 {
        cached = h.cache.take(session.id).await.unwrap();
        if cached.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let cached = cached.expect("a payload was prefetched");
    assert_eq!(cached.question_number, 2);
    assert_eq!(cached.total_questions, 5);
    assert_eq!(cached.options.len(), 4);
    assert!(h.cache.take(session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn sessions_of_other_users_are_invisible() {
    let h = Harness::new(FakeGenerator::unique());
    let session = h.start(KnowledgeLevel::Beginner, 3).await;
    let stranger = Uuid::new_v4();

    assert!(matches!(
        h.quiz.get_next_question(session.id, stranger).await,
        Err(PortError::NotFound(_))
    ));
    assert!(matches!(
        h.quiz.session_stats(session.id, stranger).await,
        Err(PortError::NotFound(_))
    ));
    assert!(matches!(
        h.quiz.cancel_session(session.id, stranger).await,
        Err(PortError::NotFound(_))
    ));
    assert!(h.quiz.session_stats(session.id, h.user_id).await.is_ok());
}

#[tokio::test]
async fn the_sweep_removes_content_nobody_uses() {
    let h = Harness::new(FakeGenerator::unique());
    let candidate = QuestionCandidate::from_raw(common::unique_question(900, Tier::Hard), "Space", Tier::Hard).unwrap();
    let (content, created) = h.db.find_or_create_content(&candidate).await.unwrap();
    assert!(created);
    let (again, created) = h.db.find_or_create_content(&candidate).await.unwrap();
    assert!(!created);
    assert_eq!(again.id, content.id);

    assert_eq!(h.db.sweep_orphaned_contents().await.unwrap(), 1);
    assert!(!h.db.content_exists(content.id).await);
}
