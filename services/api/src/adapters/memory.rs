//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Every operation
//! runs under a single mutex, which gives it the same atomicity the Postgres
//! adapter gets from transactions and unique constraints. Used when no
//! `DATABASE_URL` is configured and throughout the test suite.

use async_trait::async_trait;
use chrono::Utc;
use quiz_supply_core::domain::{
    Answer, LinkOutcome, NewSession, QuestionCandidate, QuestionContent, RecordOutcome,
    RollbackReport, Session, SessionPhase, SessionQuestionLink, Tier,
};
use quiz_supply_core::ports::{DatabaseService, PortError, PortResult};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, Session>,
    contents: HashMap<Uuid, QuestionContent>,
    by_fingerprint: HashMap<String, Uuid>,
    links: Vec<SessionQuestionLink>,
    next_order: HashMap<Uuid, u32>,
    answers: Vec<Answer>,
}

impl Tables {
    fn session(&self, session_id: Uuid) -> PortResult<&Session> {
        self.sessions
            .get(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    fn is_answered(&self, session_id: Uuid, content_id: Uuid) -> bool {
        self.answers
            .iter()
            .any(|a| a.session_id == session_id && a.content_id == content_id)
    }

    fn is_orphan(&self, content_id: Uuid) -> bool {
        let answered = self.answers.iter().any(|a| a.content_id == content_id);
        let linked_open = self.links.iter().any(|l| {
            l.content_id == content_id
                && self
                    .sessions
                    .get(&l.session_id)
                    .is_some_and(|s| !s.phase.is_terminal())
        });
        !answered && !linked_open
    }

    fn remove_content(&mut self, content_id: Uuid) {
        if let Some(content) = self.contents.remove(&content_id) {
            self.by_fingerprint.remove(&content.fingerprint);
        }
        self.links.retain(|l| l.content_id != content_id);
    }

    fn unanswered<'a>(
        &'a self,
        session_id: Uuid,
        tier: Option<Tier>,
    ) -> impl Iterator<Item = &'a SessionQuestionLink> + 'a {
        self.links.iter().filter(move |l| {
            l.session_id == session_id
                && !self.is_answered(session_id, l.content_id)
                && tier.map_or(true, |t| {
                    self.contents.get(&l.content_id).is_some_and(|c| c.tier == t)
                })
        })
    }

    fn linked_contents(&self, session_id: Uuid) -> Vec<(&SessionQuestionLink, &QuestionContent)> {
        let mut rows: Vec<_> = self
            .links
            .iter()
            .filter(|l| l.session_id == session_id)
            .filter_map(|l| self.contents.get(&l.content_id).map(|c| (l, c)))
            .collect();
        rows.sort_by_key(|(l, _)| l.order);
        rows
    }
}

/// A database adapter that keeps every table in memory.
#[derive(Default)]
pub struct InMemoryDb {
    tables: Mutex<Tables>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of content rows in the global corpus.
    pub async fn content_count(&self) -> usize {
        self.tables.lock().await.contents.len()
    }

    pub async fn content_exists(&self, content_id: Uuid) -> bool {
        self.tables.lock().await.contents.contains_key(&content_id)
    }

    pub async fn answer_count(&self, session_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables.answers.iter().filter(|a| a.session_id == session_id).count()
    }

    /// Links content into a session without any quota or phase checks.
    /// Only meant for arranging fixtures.
    pub async fn force_link(&self, session_id: Uuid, content_id: Uuid) {
        let mut tables = self.tables.lock().await;
        let order = {
            let next = tables.next_order.entry(session_id).or_insert(0);
            *next += 1;
            *next
        };
        tables.links.push(SessionQuestionLink {
            session_id,
            content_id,
            order,
            shown_at: None,
        });
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_session(&self, new_session: &NewSession, initial_score: f64) -> PortResult<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new_session.user_id,
            topic: new_session.topic.clone(),
            subtopic: new_session.subtopic.clone(),
            knowledge_level: new_session.knowledge_level,
            target_count: new_session.target_count,
            seconds_per_question: new_session.seconds_per_question,
            adaptive: new_session.adaptive,
            difficulty_score: initial_score,
            streak: 0,
            total_answered: 0,
            total_correct: 0,
            generated_count: 0,
            phase: SessionPhase::Seeding,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.lock().await;
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let tables = self.tables.lock().await;
        tables.session(session_id).cloned()
    }

    async fn update_session_state(
        &self,
        session_id: Uuid,
        difficulty_score: f64,
        phase: SessionPhase,
    ) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        if session.phase.is_terminal() {
            return Ok(false);
        }
        session.difficulty_score = difficulty_score;
        session.phase = phase;
        Ok(true)
    }

    async fn find_or_create_content(
        &self,
        candidate: &QuestionCandidate,
    ) -> PortResult<(QuestionContent, bool)> {
        let mut tables = self.tables.lock().await;
        if let Some(id) = tables.by_fingerprint.get(&candidate.fingerprint) {
            if let Some(existing) = tables.contents.get(id) {
                return Ok((existing.clone(), false));
            }
        }
        let content = QuestionContent {
            id: Uuid::new_v4(),
            text: candidate.text.clone(),
            correct_answer: candidate.correct_answer.clone(),
            wrong_answers: candidate.wrong_answers.clone(),
            explanation: candidate.explanation.clone(),
            topic: candidate.topic.clone(),
            tier: candidate.tier,
            fingerprint: candidate.fingerprint.clone(),
            times_served: 0,
            times_correct: 0,
            created_at: Utc::now(),
        };
        tables.by_fingerprint.insert(content.fingerprint.clone(), content.id);
        tables.contents.insert(content.id, content.clone());
        Ok((content, true))
    }

    async fn get_content(&self, content_id: Uuid) -> PortResult<QuestionContent> {
        let tables = self.tables.lock().await;
        tables
            .contents
            .get(&content_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Content {} not found", content_id)))
    }

    async fn delete_content_if_orphaned(&self, content_id: Uuid) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.contents.contains_key(&content_id) || !tables.is_orphan(content_id) {
            return Ok(false);
        }
        tables.remove_content(content_id);
        Ok(true)
    }

    async fn sweep_orphaned_contents(&self) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let orphans: Vec<Uuid> = tables
            .contents
            .keys()
            .copied()
            .filter(|id| tables.is_orphan(*id))
            .collect();
        for id in &orphans {
            tables.remove_content(*id);
        }
        Ok(orphans.len() as u64)
    }

    async fn link_content(&self, session_id: Uuid, content_id: Uuid) -> PortResult<LinkOutcome> {
        let mut tables = self.tables.lock().await;
        let target = match tables.sessions.get(&session_id) {
            Some(s) if s.phase.accepts_generation() => s.target_count,
            _ => return Ok(LinkOutcome::SessionClosed),
        };
        if !tables.contents.contains_key(&content_id) {
            return Err(PortError::NotFound(format!("Content {} not found", content_id)));
        }
        let mut linked = 0u32;
        for l in tables.links.iter().filter(|l| l.session_id == session_id) {
            if l.content_id == content_id {
                return Ok(LinkOutcome::AlreadyLinked);
            }
            linked += 1;
        }
        if linked >= target {
            return Ok(LinkOutcome::QuotaFull);
        }
        let order = {
            let next = tables.next_order.entry(session_id).or_insert(0);
            *next += 1;
            *next
        };
        let link = SessionQuestionLink {
            session_id,
            content_id,
            order,
            shown_at: None,
        };
        tables.links.push(link.clone());
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.generated_count += 1;
        }
        Ok(LinkOutcome::Linked(link))
    }

    async fn count_links(&self, session_id: Uuid) -> PortResult<u32> {
        let tables = self.tables.lock().await;
        Ok(tables.links.iter().filter(|l| l.session_id == session_id).count() as u32)
    }

    async fn count_unanswered(&self, session_id: Uuid, tier: Option<Tier>) -> PortResult<u32> {
        let tables = self.tables.lock().await;
        Ok(tables.unanswered(session_id, tier).count() as u32)
    }

    async fn unanswered_links(
        &self,
        session_id: Uuid,
    ) -> PortResult<Vec<(SessionQuestionLink, QuestionContent)>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .linked_contents(session_id)
            .into_iter()
            .filter(|(l, _)| !tables.is_answered(session_id, l.content_id))
            .map(|(l, c)| (l.clone(), c.clone()))
            .collect())
    }

    async fn delete_unanswered_links(&self, session_id: Uuid, tier: Option<Tier>) -> PortResult<Vec<Uuid>> {
        let mut tables = self.tables.lock().await;
        let doomed: HashSet<Uuid> = tables
            .unanswered(session_id, tier)
            .map(|l| l.content_id)
            .collect();
        tables
            .links
            .retain(|l| !(l.session_id == session_id && doomed.contains(&l.content_id)));
        Ok(doomed.into_iter().collect())
    }

    async fn mark_shown(&self, session_id: Uuid, content_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(link) = tables
            .links
            .iter_mut()
            .find(|l| l.session_id == session_id && l.content_id == content_id)
        {
            link.shown_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn linked_fingerprints(&self, session_id: Uuid) -> PortResult<HashSet<String>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .linked_contents(session_id)
            .into_iter()
            .map(|(_, c)| c.fingerprint.clone())
            .collect())
    }

    async fn answered_fingerprints(&self, session_id: Uuid) -> PortResult<HashSet<String>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .filter_map(|a| tables.contents.get(&a.content_id))
            .map(|c| c.fingerprint.clone())
            .collect())
    }

    async fn session_contents(&self, session_id: Uuid) -> PortResult<Vec<QuestionContent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .linked_contents(session_id)
            .into_iter()
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn recent_question_texts(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<String>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .linked_contents(session_id)
            .into_iter()
            .rev()
            .take(limit)
            .map(|(_, c)| c.text.clone())
            .collect())
    }

    async fn record_answer(&self, answer: &Answer) -> PortResult<RecordOutcome> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .answers
            .iter()
            .find(|a| a.session_id == answer.session_id && a.content_id == answer.content_id)
        {
            return Ok(RecordOutcome::Duplicate(existing.clone()));
        }
        let session = tables.session(answer.session_id)?;
        if session.phase.is_terminal() || session.total_answered >= session.target_count {
            return Ok(RecordOutcome::SessionClosed);
        }
        let linked = tables
            .links
            .iter()
            .any(|l| l.session_id == answer.session_id && l.content_id == answer.content_id);
        if !linked {
            return Err(PortError::NotFound(format!(
                "Content {} is not queued in session {}",
                answer.content_id, answer.session_id
            )));
        }

        tables.answers.push(answer.clone());
        if let Some(content) = tables.contents.get_mut(&answer.content_id) {
            content.times_served += 1;
            if answer.is_correct {
                content.times_correct += 1;
            }
        }
        let session = tables
            .sessions
            .get_mut(&answer.session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", answer.session_id)))?;
        session.total_answered += 1;
        if answer.is_correct {
            session.total_correct += 1;
            session.streak += 1;
        } else {
            session.streak = 0;
        }
        Ok(RecordOutcome::Recorded(session.clone()))
    }

    async fn recent_outcomes(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<bool>> {
        let tables = self.tables.lock().await;
        let mut answers: Vec<&Answer> = tables
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .collect();
        answers.sort_by_key(|a| a.answered_at);
        let skip = answers.len().saturating_sub(limit);
        Ok(answers.into_iter().skip(skip).map(|a| a.is_correct).collect())
    }

    async fn rollback_session(&self, session_id: Uuid) -> PortResult<RollbackReport> {
        let mut tables = self.tables.lock().await;
        tables.session(session_id)?;

        let (removed, kept): (Vec<Answer>, Vec<Answer>) = std::mem::take(&mut tables.answers)
            .into_iter()
            .partition(|a| a.session_id == session_id);
        tables.answers = kept;
        for answer in &removed {
            if let Some(content) = tables.contents.get_mut(&answer.content_id) {
                content.times_served = content.times_served.saturating_sub(1);
                if answer.is_correct {
                    content.times_correct = content.times_correct.saturating_sub(1);
                }
            }
        }

        let mut content_ids = Vec::new();
        let mut links_deleted = 0u32;
        tables.links.retain(|l| {
            if l.session_id == session_id {
                content_ids.push(l.content_id);
                links_deleted += 1;
                false
            } else {
                true
            }
        });
        tables.next_order.remove(&session_id);
        tables.sessions.remove(&session_id);

        Ok(RollbackReport {
            answers_deleted: removed.len() as u32,
            links_deleted,
            content_ids,
        })
    }
}
