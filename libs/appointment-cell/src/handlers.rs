// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::services::{
    AppointmentBackend, HospitalAppointmentBackend, shift_from_time, slot_query_from_params,
};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotSearchQuery {
    pub specialty_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShiftQuery {
    pub time: Option<String>,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn search_slots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(params): Query<SlotSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let query = slot_query_from_params(
        &params.specialty_id,
        params.from.as_deref(),
        params.to.as_deref(),
        Utc::now().date_naive(),
        config.slot_search_days,
    )?;

    let backend = HospitalAppointmentBackend::new(&config);
    let slots = backend.available_slots(&query, auth.token()).await?;

    let slots: Vec<Value> = slots
        .into_iter()
        .map(|slot| {
            let turn = slot.turn();
            json!({
                "specialty_id": slot.specialty_id,
                "date": slot.date,
                "time": slot.time,
                "doctor_name": slot.doctor_name,
                "turn": turn,
            })
        })
        .collect();

    Ok(Json(json!({
        "specialty_id": query.specialty_id,
        "from": query.from,
        "to": query.to,
        "total": slots.len(),
        "slots": slots,
    })))
}

pub async fn get_shift(Query(params): Query<ShiftQuery>) -> Json<Value> {
    let turn = shift_from_time(params.time.as_deref());
    Json(json!({
        "time": params.time,
        "turn": turn,
    }))
}
