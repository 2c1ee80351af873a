// libs/appointment-cell/src/models.rs
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared_models::error::AppError;

/// First hour (24h clock) classified as afternoon.
pub const AFTERNOON_START_HOUR: u32 = 14;

// ==============================================================================
// PATIENT & SHIFT
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatientType {
    Sis,
    Soat,
    #[default]
    Pagante,
}

impl PatientType {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            PatientType::Sis => "SIS",
            PatientType::Soat => "SOAT",
            PatientType::Pagante => "PAGANTE",
        }
    }
}

impl fmt::Display for PatientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// Half-day classification of a slot, sent to the backend as `M` / `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shift {
    #[serde(rename = "M")]
    Morning,
    #[serde(rename = "T")]
    Afternoon,
}

impl Shift {
    pub fn from_hour(hour: u32) -> Self {
        if hour < AFTERNOON_START_HOUR {
            Shift::Morning
        } else {
            Shift::Afternoon
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Shift::Morning => "M",
            Shift::Afternoon => "T",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ==============================================================================
// DATE INPUT
// ==============================================================================

/// Date values accepted from clients before they are normalised to `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::Text(value)
    }
}

impl From<NaiveDate> for DateInput {
    fn from(value: NaiveDate) -> Self {
        DateInput::Date(value)
    }
}

impl From<NaiveDateTime> for DateInput {
    fn from(value: NaiveDateTime) -> Self {
        DateInput::DateTime(value)
    }
}

// ==============================================================================
// BOOKING MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BookingAttempt {
    pub specialty_id: String,
    pub patient_id: String,
    pub slot_date_time: NaiveDateTime,
    pub patient_type: PatientType,
}

impl BookingAttempt {
    pub fn turn(&self) -> Shift {
        Shift::from_hour(self.slot_date_time.hour())
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if self.specialty_id.trim().is_empty() {
            return Err(BookingError::Validation("specialty_id is required".to_string()));
        }
        if self.patient_id.trim().is_empty() {
            return Err(BookingError::Validation("patient_id is required".to_string()));
        }
        Ok(())
    }

    pub fn to_request(&self) -> ReservationRequest {
        ReservationRequest {
            specialty_id: self.specialty_id.trim().to_string(),
            patient_id: self.patient_id.trim().to_string(),
            date: self.slot_date_time.format("%Y-%m-%d").to_string(),
            time: self.slot_date_time.format("%H:%M").to_string(),
            turn: self.turn(),
            patient_type: self.patient_type,
        }
    }
}

/// Body of the backend reservation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub specialty_id: String,
    pub patient_id: String,
    pub date: String,
    pub time: String,
    pub turn: Shift,
    pub patient_type: PatientType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationConfirmation {
    pub appointment_id: String,
    #[serde(default)]
    pub specialty_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub turn: Option<Shift>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub specialty_id: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub doctor_name: Option<String>,
}

impl AvailableSlot {
    pub fn turn(&self) -> Shift {
        crate::services::formatting::shift_from_time(Some(&self.time))
    }
}

/// Specialty plus date window. Also the key of the cached slot list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotQuery {
    pub specialty_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl SlotQuery {
    pub fn new(specialty_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Self, BookingError> {
        let specialty_id = specialty_id.trim();
        if specialty_id.is_empty() {
            return Err(BookingError::Validation("specialty_id is required".to_string()));
        }
        if to < from {
            return Err(BookingError::Validation(format!(
                "date range end {} is before start {}",
                to, from
            )));
        }
        Ok(Self {
            specialty_id: specialty_id.to_string(),
            from,
            to,
        })
    }

    /// Window starting at `from` and spanning `days` days.
    pub fn starting_at(specialty_id: &str, from: NaiveDate, days: i64) -> Result<Self, BookingError> {
        let to = Duration::try_days(days.max(0))
            .and_then(|span| from.checked_add_signed(span))
            .ok_or_else(|| {
                BookingError::Validation(format!("date window of {} days from {} is out of range", days, from))
            })?;
        Self::new(specialty_id, from, to)
    }
}

/// Raw classification of a backend reservation response.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationResult {
    Confirmed(ReservationConfirmation),
    SlotTaken { message: String },
    DuplicateAppointment { message: String },
}

/// What the booking flow should do next after a reservation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConflictOutcome {
    Success {
        confirmation: ReservationConfirmation,
    },
    /// `refreshed_slots` is empty and `refresh_error` set when the re-fetch failed; the listing
    /// stays uncached so the next read goes to the backend.
    SlotAlreadyTaken {
        message: String,
        refreshed_slots: Vec<AvailableSlot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_error: Option<String>,
    },
    DuplicatePatientAppointment {
        message: String,
        specialty_id: String,
    },
}

impl ConflictOutcome {
    pub fn is_conflict(&self) -> bool {
        !matches!(self, ConflictOutcome::Success { .. })
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A reservation is already in progress for this session")]
    ReservationInFlight,

    #[error("Patient already holds an appointment for specialty {specialty_id}; choose a different specialty")]
    SpecialtyBlocked { specialty_id: String },

    #[error("Booking service error: {0}")]
    GenericFailure(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::ReservationInFlight | BookingError::SpecialtyBlocked { .. } => {
                AppError::Conflict(err.to_string())
            }
            BookingError::GenericFailure(msg) => AppError::ExternalService(msg),
        }
    }
}
