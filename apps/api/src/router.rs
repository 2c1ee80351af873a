use std::sync::Arc;

use axum::{
    Router,
    middleware,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use chat_session_cell::{chat_session_routes, ChatState};
use shared_config::AppConfig;

use crate::security::security_headers;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Hospital booking API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/chat/sessions", chat_session_routes(ChatState::from_config(state)))
        .layer(middleware::from_fn(security_headers))
}
