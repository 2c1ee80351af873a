// libs/chat-session-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use appointment_cell::models::{BookingAttempt, ConflictOutcome, SlotQuery};
use appointment_cell::services::{map_patient_type, parse_slot_date_time, slot_query_from_params};
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{SessionReservationRequest, SlotWindowRequest, StartSessionRequest};
use crate::router::ChatState;
use crate::services::ChatSession;

fn slot_window(
    state: &ChatState,
    specialty_id: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<SlotQuery, AppError> {
    Ok(slot_query_from_params(
        specialty_id,
        from,
        to,
        Utc::now().date_naive(),
        state.config.slot_search_days,
    )?)
}

/// Looks the session up and checks the caller may use it, in any timer state.
async fn owned_session(
    state: &ChatState,
    session_id: Uuid,
    user: &User,
) -> Result<Arc<ChatSession>, AppError> {
    let session = state.registry.get(session_id).await?;
    session.ensure_access(user)?;
    Ok(session)
}

/// Like [`owned_session`], but the session must still be counting down.
async fn owned_active_session(
    state: &ChatState,
    session_id: Uuid,
    user: &User,
) -> Result<Arc<ChatSession>, AppError> {
    owned_session(state, session_id, user).await?;
    state.registry.get_active(session_id).await
}

// ==============================================================================
// SESSION LIFECYCLE
// ==============================================================================

#[axum::debug_handler]
pub async fn start_session(
    State(state): State<ChatState>,
    Extension(user): Extension<User>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient_id = request.patient_id.unwrap_or_else(|| user.id.clone());

    // Only the patient themself or an admin can open a booking session for a patient
    let is_patient = patient_id.trim() == user.id;
    let is_admin = user.role.as_deref() == Some("admin");
    if !is_patient && !is_admin {
        warn!("User {} tried to open a chat session for patient {}", user.id, patient_id);
        return Err(AppError::Auth("Not authorized to book appointments for this patient".to_string()));
    }

    let patient_type = map_patient_type(request.patient_type.as_deref());
    let session = state
        .registry
        .start_session(&user.id, &patient_id, patient_type)
        .await?;
    debug!("User {} opened chat session {}", user.id, session.id);

    Ok((StatusCode::CREATED, Json(json!(session.view().await))))
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<ChatState>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = owned_session(&state, session_id, &user).await?;
    Ok(Json(json!(session.view().await)))
}

#[axum::debug_handler]
pub async fn close_session(
    State(state): State<ChatState>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    owned_session(&state, session_id, &user).await?;
    let session = state.registry.close_session(session_id).await?;
    Ok(Json(json!(session.view().await)))
}

// ==============================================================================
// SLOTS & RESERVATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<ChatState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<SlotWindowRequest>,
) -> Result<Json<Value>, AppError> {
    let session = owned_active_session(&state, session_id, &user).await?;
    let query = slot_window(&state, &params.specialty_id, params.from.as_deref(), params.to.as_deref())?;

    let slots = session
        .booking()
        .choose_specialty(&session.patient_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "session_id": session_id,
        "query": query,
        "total": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn refresh_slots(
    State(state): State<ChatState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SlotWindowRequest>,
) -> Result<Json<Value>, AppError> {
    let session = owned_active_session(&state, session_id, &user).await?;
    let query = slot_window(&state, &request.specialty_id, request.from.as_deref(), request.to.as_deref())?;

    let slots = session.booking().refresh_slots(&query, auth.token()).await?;

    Ok(Json(json!({
        "session_id": session_id,
        "query": query,
        "total": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn reserve(
    State(state): State<ChatState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SessionReservationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let session = owned_active_session(&state, session_id, &user).await?;

    let attempt = BookingAttempt {
        specialty_id: request.specialty_id.clone(),
        patient_id: session.patient_id.clone(),
        slot_date_time: parse_slot_date_time(&request.date, &request.time)?,
        patient_type: session.patient_type,
    };
    let listing_start = request.from.as_deref().unwrap_or(&request.date);
    let listing = slot_window(&state, &request.specialty_id, Some(listing_start), request.to.as_deref())?;

    let outcome = session.booking().reserve(&attempt, &listing, auth.token()).await?;

    let (status, next_action) = match &outcome {
        ConflictOutcome::Success { .. } => (StatusCode::CREATED, "done"),
        ConflictOutcome::SlotAlreadyTaken { .. } => (StatusCode::CONFLICT, "choose_another_slot"),
        ConflictOutcome::DuplicatePatientAppointment { .. } => {
            (StatusCode::CONFLICT, "choose_another_specialty")
        }
    };

    let mut body = json!(outcome);
    body["next_action"] = json!(next_action);
    body["session_id"] = json!(session_id);

    Ok((status, Json(body)))
}
