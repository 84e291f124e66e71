pub mod rest;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use rest::{
    cancel_session_handler, create_session_handler, end_session_handler, next_question_handler,
    session_stats_handler, submit_answer_handler,
};
pub use state::AppState;

/// The quiz API routes, ready to be merged with documentation and layers.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/{id}",
            get(session_stats_handler).delete(cancel_session_handler),
        )
        .route("/sessions/{id}/next", get(next_question_handler))
        .route("/sessions/{id}/answers", post(submit_answer_handler))
        .route("/sessions/{id}/end", post(end_session_handler))
        .with_state(app_state)
}
