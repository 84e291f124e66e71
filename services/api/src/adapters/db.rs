//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Quota and idempotency guarantees come from the database: the session row is
//! locked (`FOR UPDATE`) while a link or an answer is inserted, and the unique
//! constraints on `(session_id, content_id)` and `fingerprint` back every
//! insert-or-fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_supply_core::domain::{
    Answer, LinkOutcome, NewSession, QuestionCandidate, QuestionContent, RecordOutcome,
    RollbackReport, Session, SessionPhase, SessionQuestionLink, Tier,
};
use quiz_supply_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct PgAdapter {
    pool: PgPool,
}

impl PgAdapter {
    /// Creates a new `PgAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_err(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(what: &str, id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        other => db_err(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const SESSION_COLUMNS: &str = "id, user_id, topic, subtopic, knowledge_level, target_count, \
     seconds_per_question, adaptive, difficulty_score, streak, total_answered, total_correct, \
     generated_count, phase, created_at";

const CONTENT_COLUMNS: &str = "c.id, c.text, c.correct_answer, c.wrong_answer_1, c.wrong_answer_2, \
     c.wrong_answer_3, c.explanation, c.topic, c.tier, c.fingerprint, c.times_served, \
     c.times_correct, c.created_at";

const ANSWER_COLUMNS: &str = "id, session_id, content_id, user_id, selected_text, is_correct, \
     response_time_ms, difficulty_at_answer, answered_at";

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    topic: String,
    subtopic: Option<String>,
    knowledge_level: String,
    target_count: i32,
    seconds_per_question: i32,
    adaptive: bool,
    difficulty_score: f64,
    streak: i32,
    total_answered: i32,
    total_correct: i32,
    generated_count: i32,
    phase: String,
    created_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<Session> {
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            topic: self.topic,
            subtopic: self.subtopic,
            knowledge_level: self.knowledge_level.parse().map_err(PortError::Unexpected)?,
            target_count: self.target_count as u32,
            seconds_per_question: self.seconds_per_question as u32,
            adaptive: self.adaptive,
            difficulty_score: self.difficulty_score,
            streak: self.streak as u32,
            total_answered: self.total_answered as u32,
            total_correct: self.total_correct as u32,
            generated_count: self.generated_count as u32,
            phase: self.phase.parse().map_err(PortError::Unexpected)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ContentRecord {
    id: Uuid,
    text: String,
    correct_answer: String,
    wrong_answer_1: String,
    wrong_answer_2: String,
    wrong_answer_3: String,
    explanation: String,
    topic: String,
    tier: String,
    fingerprint: String,
    times_served: i32,
    times_correct: i32,
    created_at: DateTime<Utc>,
}
impl ContentRecord {
    fn to_domain(self) -> PortResult<QuestionContent> {
        Ok(QuestionContent {
            id: self.id,
            text: self.text,
            correct_answer: self.correct_answer,
            wrong_answers: [self.wrong_answer_1, self.wrong_answer_2, self.wrong_answer_3],
            explanation: self.explanation,
            topic: self.topic,
            tier: self.tier.parse::<Tier>().map_err(PortError::Unexpected)?,
            fingerprint: self.fingerprint,
            times_served: self.times_served as u32,
            times_correct: self.times_correct as u32,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct QueuedRecord {
    session_id: Uuid,
    content_id: Uuid,
    display_order: i32,
    shown_at: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    content: ContentRecord,
}
impl QueuedRecord {
    fn to_domain(self) -> PortResult<(SessionQuestionLink, QuestionContent)> {
        let link = SessionQuestionLink {
            session_id: self.session_id,
            content_id: self.content_id,
            order: self.display_order as u32,
            shown_at: self.shown_at,
        };
        Ok((link, self.content.to_domain()?))
    }
}

#[derive(FromRow)]
struct AnswerRecord {
    id: Uuid,
    session_id: Uuid,
    content_id: Uuid,
    user_id: Uuid,
    selected_text: String,
    is_correct: bool,
    response_time_ms: i32,
    difficulty_at_answer: f64,
    answered_at: DateTime<Utc>,
}
impl AnswerRecord {
    fn to_domain(self) -> Answer {
        Answer {
            id: self.id,
            session_id: self.session_id,
            content_id: self.content_id,
            user_id: self.user_id,
            selected_text: self.selected_text,
            is_correct: self.is_correct,
            response_time_ms: self.response_time_ms as u32,
            difficulty_at_answer: self.difficulty_at_answer,
            answered_at: self.answered_at,
        }
    }
}

const ORPHAN_PREDICATE: &str = "NOT EXISTS (SELECT 1 FROM answers a WHERE a.content_id = c.id) \
     AND NOT EXISTS (SELECT 1 FROM session_question_links l \
                     JOIN quiz_sessions s ON s.id = l.session_id \
                     WHERE l.content_id = c.id AND s.phase NOT IN ('completed', 'cancelled'))";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for PgAdapter {
    async fn create_session(&self, new_session: &NewSession, initial_score: f64) -> PortResult<Session> {
        let sql = format!(
            "INSERT INTO quiz_sessions (id, user_id, topic, subtopic, knowledge_level, target_count, \
             seconds_per_question, adaptive, difficulty_score, phase) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            SESSION_COLUMNS
        );
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_session.user_id)
            .bind(&new_session.topic)
            .bind(&new_session.subtopic)
            .bind(new_session.knowledge_level.as_str())
            .bind(new_session.target_count as i32)
            .bind(new_session.seconds_per_question as i32)
            .bind(new_session.adaptive)
            .bind(initial_score)
            .bind(SessionPhase::Seeding.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        record.to_domain()
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let sql = format!("SELECT {} FROM quiz_sessions WHERE id = $1", SESSION_COLUMNS);
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found("Session", session_id))?;
        record.to_domain()
    }

    async fn update_session_state(
        &self,
        session_id: Uuid,
        difficulty_score: f64,
        phase: SessionPhase,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE quiz_sessions SET difficulty_score = $1, phase = $2 \
             WHERE id = $3 AND phase NOT IN ('completed', 'cancelled')",
        )
        .bind(difficulty_score)
        .bind(phase.as_str())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM quiz_sessions WHERE id = $1)")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if !exists {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(false)
    }

    async fn find_or_create_content(
        &self,
        candidate: &QuestionCandidate,
    ) -> PortResult<(QuestionContent, bool)> {
        let insert = format!(
            "INSERT INTO question_contents AS c (id, text, correct_answer, wrong_answer_1, wrong_answer_2, \
             wrong_answer_3, explanation, topic, tier, fingerprint) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (fingerprint) DO NOTHING RETURNING {}",
            CONTENT_COLUMNS
        );
        let created = sqlx::query_as::<_, ContentRecord>(&insert)
            .bind(Uuid::new_v4())
            .bind(&candidate.text)
            .bind(&candidate.correct_answer)
            .bind(&candidate.wrong_answers[0])
            .bind(&candidate.wrong_answers[1])
            .bind(&candidate.wrong_answers[2])
            .bind(&candidate.explanation)
            .bind(&candidate.topic)
            .bind(candidate.tier.as_str())
            .bind(&candidate.fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if let Some(record) = created {
            return Ok((record.to_domain()?, true));
        }

        let select = format!("SELECT {} FROM question_contents c WHERE c.fingerprint = $1", CONTENT_COLUMNS);
        let existing = sqlx::query_as::<_, ContentRecord>(&select)
            .bind(&candidate.fingerprint)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok((existing.to_domain()?, false))
    }

    async fn get_content(&self, content_id: Uuid) -> PortResult<QuestionContent> {
        let sql = format!("SELECT {} FROM question_contents c WHERE c.id = $1", CONTENT_COLUMNS);
        let record = sqlx::query_as::<_, ContentRecord>(&sql)
            .bind(content_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found("Content", content_id))?;
        record.to_domain()
    }

    async fn delete_content_if_orphaned(&self, content_id: Uuid) -> PortResult<bool> {
        let sql = format!("DELETE FROM question_contents c WHERE c.id = $1 AND {}", ORPHAN_PREDICATE);
        let result = sqlx::query(&sql)
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep_orphaned_contents(&self) -> PortResult<u64> {
        let sql = format!("DELETE FROM question_contents c WHERE {}", ORPHAN_PREDICATE);
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn link_content(&self, session_id: Uuid, content_id: Uuid) -> PortResult<LinkOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let session: Option<(i32, String)> =
            sqlx::query_as("SELECT target_count, phase FROM quiz_sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let Some((target, phase)) = session else {
            return Ok(LinkOutcome::SessionClosed);
        };
        let phase: SessionPhase = phase.parse().map_err(PortError::Unexpected)?;
        if !phase.accepts_generation() {
            return Ok(LinkOutcome::SessionClosed);
        }

        let already: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM session_question_links WHERE session_id = $1 AND content_id = $2)",
        )
        .bind(session_id)
        .bind(content_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if already {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_question_links WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        if linked >= i64::from(target) {
            return Ok(LinkOutcome::QuotaFull);
        }

        let order: i32 = sqlx::query_scalar(
            "INSERT INTO session_question_links (session_id, content_id, display_order) \
             SELECT $1, $2, COALESCE(MAX(display_order), 0) + 1 FROM session_question_links WHERE session_id = $1 \
             RETURNING display_order",
        )
        .bind(session_id)
        .bind(content_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE quiz_sessions SET generated_count = generated_count + 1 WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(LinkOutcome::Linked(SessionQuestionLink {
            session_id,
            content_id,
            order: order as u32,
            shown_at: None,
        }))
    }

    async fn count_links(&self, session_id: Uuid) -> PortResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_question_links WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u32)
    }

    async fn count_unanswered(&self, session_id: Uuid, tier: Option<Tier>) -> PortResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM session_question_links l \
             JOIN question_contents c ON c.id = l.content_id \
             WHERE l.session_id = $1 AND ($2::TEXT IS NULL OR c.tier = $2) \
             AND NOT EXISTS (SELECT 1 FROM answers a WHERE a.session_id = l.session_id AND a.content_id = l.content_id)",
        )
        .bind(session_id)
        .bind(tier.map(Tier::as_str))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count as u32)
    }

    async fn unanswered_links(
        &self,
        session_id: Uuid,
    ) -> PortResult<Vec<(SessionQuestionLink, QuestionContent)>> {
        let sql = format!(
            "SELECT l.session_id, l.content_id, l.display_order, l.shown_at, {} \
             FROM session_question_links l JOIN question_contents c ON c.id = l.content_id \
             WHERE l.session_id = $1 \
             AND NOT EXISTS (SELECT 1 FROM answers a WHERE a.session_id = l.session_id AND a.content_id = l.content_id) \
             ORDER BY l.display_order ASC",
            CONTENT_COLUMNS
        );
        let records = sqlx::query_as::<_, QueuedRecord>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        records.into_iter().map(QueuedRecord::to_domain).collect()
    }

    async fn delete_unanswered_links(&self, session_id: Uuid, tier: Option<Tier>) -> PortResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "DELETE FROM session_question_links l USING question_contents c \
             WHERE l.session_id = $1 AND c.id = l.content_id AND ($2::TEXT IS NULL OR c.tier = $2) \
             AND NOT EXISTS (SELECT 1 FROM answers a WHERE a.session_id = l.session_id AND a.content_id = l.content_id) \
             RETURNING l.content_id",
        )
        .bind(session_id)
        .bind(tier.map(Tier::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(ids)
    }

    async fn mark_shown(&self, session_id: Uuid, content_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE session_question_links SET shown_at = COALESCE(shown_at, NOW()) \
             WHERE session_id = $1 AND content_id = $2",
        )
        .bind(session_id)
        .bind(content_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn linked_fingerprints(&self, session_id: Uuid) -> PortResult<HashSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT c.fingerprint FROM session_question_links l \
             JOIN question_contents c ON c.id = l.content_id WHERE l.session_id = $1",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn answered_fingerprints(&self, session_id: Uuid) -> PortResult<HashSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT c.fingerprint FROM answers a \
             JOIN question_contents c ON c.id = a.content_id WHERE a.session_id = $1",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn session_contents(&self, session_id: Uuid) -> PortResult<Vec<QuestionContent>> {
        let sql = format!(
            "SELECT {} FROM session_question_links l JOIN question_contents c ON c.id = l.content_id \
             WHERE l.session_id = $1 ORDER BY l.display_order ASC",
            CONTENT_COLUMNS
        );
        let records = sqlx::query_as::<_, ContentRecord>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        records.into_iter().map(ContentRecord::to_domain).collect()
    }

    async fn recent_question_texts(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<String>> {
        let texts: Vec<String> = sqlx::query_scalar(
            "SELECT c.text FROM session_question_links l JOIN question_contents c ON c.id = l.content_id \
             WHERE l.session_id = $1 ORDER BY l.display_order DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(texts)
    }

    async fn record_answer(&self, answer: &Answer) -> PortResult<RecordOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let select_existing = format!(
            "SELECT {} FROM answers WHERE session_id = $1 AND content_id = $2",
            ANSWER_COLUMNS
        );

        let existing = sqlx::query_as::<_, AnswerRecord>(&select_existing)
            .bind(answer.session_id)
            .bind(answer.content_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if let Some(record) = existing {
            return Ok(RecordOutcome::Duplicate(record.to_domain()));
        }

        let session: Option<(String, i32, i32)> = sqlx::query_as(
            "SELECT phase, total_answered, target_count FROM quiz_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(answer.session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let Some((phase, answered, target)) = session else {
            return Err(PortError::NotFound(format!("Session {} not found", answer.session_id)));
        };
        let phase: SessionPhase = phase.parse().map_err(PortError::Unexpected)?;
        if phase.is_terminal() || answered >= target {
            return Ok(RecordOutcome::SessionClosed);
        }

        let linked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM session_question_links WHERE session_id = $1 AND content_id = $2)",
        )
        .bind(answer.session_id)
        .bind(answer.content_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if !linked {
            return Err(PortError::NotFound(format!(
                "Content {} is not queued in session {}",
                answer.content_id, answer.session_id
            )));
        }

        let inserted: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO answers (id, session_id, content_id, user_id, selected_text, is_correct, \
             response_time_ms, difficulty_at_answer, answered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (session_id, content_id) DO NOTHING RETURNING id",
        )
        .bind(answer.id)
        .bind(answer.session_id)
        .bind(answer.content_id)
        .bind(answer.user_id)
        .bind(&answer.selected_text)
        .bind(answer.is_correct)
        .bind(answer.response_time_ms as i32)
        .bind(answer.difficulty_at_answer)
        .bind(answer.answered_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if inserted.is_none() {
            let record = sqlx::query_as::<_, AnswerRecord>(&select_existing)
                .bind(answer.session_id)
                .bind(answer.content_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
            return Ok(RecordOutcome::Duplicate(record.to_domain()));
        }

        sqlx::query(
            "UPDATE question_contents SET times_served = times_served + 1, \
             times_correct = times_correct + CASE WHEN $2 THEN 1 ELSE 0 END WHERE id = $1",
        )
        .bind(answer.content_id)
        .bind(answer.is_correct)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let update = format!(
            "UPDATE quiz_sessions SET total_answered = total_answered + 1, \
             total_correct = total_correct + CASE WHEN $2 THEN 1 ELSE 0 END, \
             streak = CASE WHEN $2 THEN streak + 1 ELSE 0 END \
             WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        );
        let record = sqlx::query_as::<_, SessionRecord>(&update)
            .bind(answer.session_id)
            .bind(answer.is_correct)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(RecordOutcome::Recorded(record.to_domain()?))
    }

    async fn recent_outcomes(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<bool>> {
        let outcomes: Vec<bool> = sqlx::query_scalar(
            "SELECT is_correct FROM ( \
                SELECT is_correct, answered_at FROM answers WHERE session_id = $1 \
                ORDER BY answered_at DESC LIMIT $2 \
             ) recent ORDER BY answered_at ASC",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(outcomes)
    }

    async fn rollback_session(&self, session_id: Uuid) -> PortResult<RollbackReport> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM quiz_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }

        sqlx::query(
            "UPDATE question_contents c SET \
             times_served = GREATEST(c.times_served - 1, 0), \
             times_correct = GREATEST(c.times_correct - CASE WHEN a.is_correct THEN 1 ELSE 0 END, 0) \
             FROM answers a WHERE a.content_id = c.id AND a.session_id = $1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let answers_deleted = sqlx::query("DELETE FROM answers WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        let content_ids: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM session_question_links WHERE session_id = $1 RETURNING content_id")
                .bind(session_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err)?;

        sqlx::query("DELETE FROM quiz_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(RollbackReport {
            answers_deleted: answers_deleted as u32,
            links_deleted: content_ids.len() as u32,
            content_ids,
        })
    }
}
