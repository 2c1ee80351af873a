// libs/chat-session-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use appointment_cell::services::HospitalAppointmentBackend;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::SessionRegistry;

#[derive(Clone)]
pub struct ChatState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
}

impl ChatState {
    /// Registry wired to the real hospital backend.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let backend = Arc::new(HospitalAppointmentBackend::new(&config));
        let registry = Arc::new(SessionRegistry::new(&config, backend));
        Self { config, registry }
    }
}

pub fn chat_session_routes(state: ChatState) -> Router {
    Router::new()
        .route("/", post(handlers::start_session))
        .route(
            "/{session_id}",
            get(handlers::get_session).delete(handlers::close_session),
        )
        .route("/{session_id}/slots", get(handlers::list_slots))
        .route("/{session_id}/slots/refresh", post(handlers::refresh_slots))
        .route("/{session_id}/reservations", post(handlers::reserve))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
