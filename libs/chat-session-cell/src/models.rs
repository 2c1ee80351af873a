// libs/chat-session-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::PatientType;
use session_cell::models::{TimerSnapshot, TimerState};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    /// Defaults to the authenticated user.
    pub patient_id: Option<String>,
    pub patient_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotWindowRequest {
    pub specialty_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Reservation from inside a chat session. `from`/`to` describe the listing the slot was picked
/// from and default to a window starting on the slot's date.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionReservationRequest {
    pub specialty_id: String,
    pub date: String,
    pub time: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

// ==============================================================================
// STATE & RESPONSE MODELS
// ==============================================================================

/// Timer state mirrored out of the timer task for readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: TimerState,
    pub remaining_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub patient_id: String,
    pub patient_type: PatientType,
    pub started_at: DateTime<Utc>,
    pub timer: TimerSnapshot,
    pub blocked_specialties: Vec<String>,
}
