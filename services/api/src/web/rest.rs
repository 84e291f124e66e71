//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! The handlers only translate between JSON and the `QuizService`; internal
//! errors are logged here and reach the player as generic messages.

use crate::supply::SubmitAnswer;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use quiz_supply_core::{
    domain::{AnswerOutcome, Delivery, KnowledgeLevel, NewSession, QuestionPayload, Session, SessionStats},
    ports::PortError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

const DEFAULT_SECONDS_PER_QUESTION: u32 = 30;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        next_question_handler,
        submit_answer_handler,
        session_stats_handler,
        end_session_handler,
        cancel_session_handler,
    ),
    components(
        schemas(
            CreateSessionRequest,
            SessionResponse,
            QuestionResponse,
            SubmitAnswerRequest,
            AnswerResponse,
            StatsResponse,
        )
    ),
    tags(
        (name = "Adaptive Quiz API", description = "Adaptive quiz sessions backed by a generated question supply.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub topic: String,
    pub subtopic: Option<String>,
    /// One of `beginner`, `intermediate` or `advanced`.
    pub knowledge_level: String,
    pub target_count: u32,
    pub seconds_per_question: Option<u32>,
    pub adaptive: Option<bool>,
}

/// The response payload sent after successfully creating a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    session_id: Uuid,
    user_id: Uuid,
    topic: String,
    target_count: u32,
    difficulty_score: f64,
    phase: String,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.id,
            user_id: s.user_id,
            topic: s.topic,
            target_count: s.target_count,
            difficulty_score: s.difficulty_score,
            phase: s.phase.to_string(),
        }
    }
}

/// A question as shown to the player. The correct answer is never included.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionResponse {
    content_id: Uuid,
    text: String,
    options: Vec<String>,
    tier: String,
    seconds_per_question: u32,
    question_number: u32,
    total_questions: u32,
}

impl From<QuestionPayload> for QuestionResponse {
    fn from(p: QuestionPayload) -> Self {
        Self {
            content_id: p.content_id,
            text: p.text,
            options: p.options,
            tier: p.tier.to_string(),
            seconds_per_question: p.seconds_per_question,
            question_number: p.question_number,
            total_questions: p.total_questions,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub content_id: Uuid,
    pub selected: String,
    #[serde(default)]
    pub response_time_ms: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    session_id: Uuid,
    total_answered: u32,
    total_correct: u32,
    target_count: u32,
    streak: u32,
    difficulty_score: f64,
    tier: String,
    phase: String,
}

impl From<SessionStats> for StatsResponse {
    fn from(s: SessionStats) -> Self {
        Self {
            session_id: s.session_id,
            total_answered: s.total_answered,
            total_correct: s.total_correct,
            target_count: s.target_count,
            streak: s.streak,
            difficulty_score: s.difficulty_score,
            tier: s.tier.to_string(),
            phase: s.phase.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    is_correct: bool,
    correct_answer: String,
    explanation: String,
    tier_changed: bool,
    already_answered: bool,
    stats: StatsResponse,
}

impl From<AnswerOutcome> for AnswerResponse {
    fn from(o: AnswerOutcome) -> Self {
        Self {
            is_correct: o.is_correct,
            correct_answer: o.correct_answer,
            explanation: o.explanation,
            tier_changed: o.tier_changed,
            already_answered: o.already_answered,
            stats: o.stats.into(),
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

type HandlerError = (StatusCode, String);

fn user_id_from(headers: &HeaderMap) -> Result<Uuid, HandlerError> {
    let user_id_str = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "x-user-id header is required".to_string()))?;
    Uuid::parse_str(user_id_str)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid x-user-id format".to_string()))
}

/// Maps a port failure onto a status code without leaking internals.
pub fn port_error(context: &str, e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Session or question not found".to_string()),
        PortError::Conflict(message) => (StatusCode::CONFLICT, message),
        PortError::Unexpected(message) => {
            error!("{}: {}", context, message);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

fn new_session_from(
    user_id: Uuid,
    request: CreateSessionRequest,
    max_target_count: u32,
) -> Result<NewSession, HandlerError> {
    let topic = request.topic.trim().to_string();
    if topic.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "topic must not be empty".to_string()));
    }
    if request.target_count == 0 || request.target_count > max_target_count {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("target_count must be between 1 and {}", max_target_count),
        ));
    }
    let knowledge_level = request
        .knowledge_level
        .parse::<KnowledgeLevel>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(NewSession {
        user_id,
        topic,
        subtopic: request
            .subtopic
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        knowledge_level,
        target_count: request.target_count,
        seconds_per_question: request
            .seconds_per_question
            .unwrap_or(DEFAULT_SECONDS_PER_QUESTION),
        adaptive: request.adaptive.unwrap_or(true),
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start a new quiz session.
///
/// The first questions are generated before this call returns; the rest are
/// produced in the background.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 400, description = "Bad request (e.g., missing header or invalid level)"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let user_id = user_id_from(&headers)?;
    let new_session = new_session_from(user_id, request, app_state.config.max_target_count)?;
    let session = app_state
        .quiz
        .start_session(new_session)
        .await
        .map_err(|e| port_error("Failed to create session", e))?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// Fetch the next question of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/next",
    responses(
        (status = 200, description = "The next question", body = QuestionResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "The session is finished"),
        (status = 503, description = "No question is available yet; retry shortly")
    ),
    params(
        ("id" = Uuid, Path, description = "The session ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn next_question_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<QuestionResponse>, HandlerError> {
    let user_id = user_id_from(&headers)?;
    let delivery = app_state
        .quiz
        .get_next_question(session_id, user_id)
        .await
        .map_err(|e| port_error("Failed to load the next question", e))?;
    match delivery {
        Delivery::Ready(payload) => Ok(Json(payload.into())),
        Delivery::Finished => Err((StatusCode::CONFLICT, "The session is finished".to_string())),
        Delivery::Unavailable => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "No question is available yet, please retry".to_string(),
        )),
    }
}

/// Submit an answer. Resubmitting the same question returns the original result.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "The graded answer", body = AnswerResponse),
        (status = 404, description = "Session or question not found"),
        (status = 409, description = "The session no longer accepts answers")
    ),
    params(
        ("id" = Uuid, Path, description = "The session ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn submit_answer_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, HandlerError> {
    let user_id = user_id_from(&headers)?;
    let outcome = app_state
        .quiz
        .submit_answer(SubmitAnswer {
            session_id,
            content_id: request.content_id,
            user_id,
            selected: request.selected,
            response_time_ms: request.response_time_ms,
        })
        .await
        .map_err(|e| port_error("Failed to record the answer", e))?;
    Ok(Json(outcome.into()))
}

/// Progress of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session progress", body = StatsResponse),
        (status = 404, description = "Session not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The session ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn session_stats_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<StatsResponse>, HandlerError> {
    let user_id = user_id_from(&headers)?;
    let stats = app_state
        .quiz
        .session_stats(session_id, user_id)
        .await
        .map_err(|e| port_error("Failed to load the session", e))?;
    Ok(Json(stats.into()))
}

/// End a session early, keeping its answers.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    responses(
        (status = 200, description = "Final session statistics", body = StatsResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "The session was cancelled")
    ),
    params(
        ("id" = Uuid, Path, description = "The session ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<StatsResponse>, HandlerError> {
    let user_id = user_id_from(&headers)?;
    let stats = app_state
        .quiz
        .end_session(session_id, user_id)
        .await
        .map_err(|e| port_error("Failed to end the session", e))?;
    Ok(Json(stats.into()))
}

/// Cancel a session, deleting it and everything it recorded.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "The session is already completed")
    ),
    params(
        ("id" = Uuid, Path, description = "The session ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn cancel_session_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    let user_id = user_id_from(&headers)?;
    app_state
        .quiz
        .cancel_session(session_id, user_id)
        .await
        .map_err(|e| port_error("Failed to cancel the session", e))?;
    Ok(StatusCode::NO_CONTENT)
}
