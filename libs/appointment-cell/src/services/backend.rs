use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use shared_backend::{HospitalApiClient, HospitalApiError};
use shared_config::AppConfig;

use crate::models::{
    AvailableSlot, BookingError, ReservationConfirmation, ReservationRequest, ReservationResult,
    SlotQuery,
};

pub const SLOT_TAKEN_CODE: &str = "SLOT_TAKEN";
pub const DUPLICATE_APPOINTMENT_CODE: &str = "DUPLICATE_APPOINTMENT";

/// Port to the hospital booking endpoint.
#[async_trait]
pub trait AppointmentBackend: Send + Sync {
    async fn reserve(
        &self,
        request: &ReservationRequest,
        auth_token: &str,
    ) -> Result<ReservationResult, BookingError>;

    async fn available_slots(
        &self,
        query: &SlotQuery,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError>;
}

#[derive(Debug, Default, Deserialize)]
struct ConflictBody {
    code: Option<String>,
    message: Option<String>,
}

pub struct HospitalAppointmentBackend {
    client: HospitalApiClient,
}

impl HospitalAppointmentBackend {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: HospitalApiClient::new(config),
        }
    }

    fn classify_conflict(body: &str) -> ReservationResult {
        let parsed: ConflictBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed.message.unwrap_or_else(|| body.to_string());

        match parsed.code.as_deref() {
            Some(DUPLICATE_APPOINTMENT_CODE) => ReservationResult::DuplicateAppointment { message },
            Some(SLOT_TAKEN_CODE) => ReservationResult::SlotTaken { message },
            other => {
                warn!("Unrecognised conflict code {:?}, treating as slot taken", other);
                ReservationResult::SlotTaken { message }
            }
        }
    }
}

#[async_trait]
impl AppointmentBackend for HospitalAppointmentBackend {
    async fn reserve(
        &self,
        request: &ReservationRequest,
        auth_token: &str,
    ) -> Result<ReservationResult, BookingError> {
        debug!(
            "Reserving {} {} ({}) in specialty {} for patient {}",
            request.date, request.time, request.turn, request.specialty_id, request.patient_id
        );

        let result = self.client.request::<ReservationConfirmation, _>(
            Method::POST,
            "/appointments/reservations",
            &[],
            Some(auth_token),
            Some(request),
        ).await;

        match result {
            Ok(confirmation) => Ok(ReservationResult::Confirmed(confirmation)),
            Err(HospitalApiError::Status { status, body }) if status == StatusCode::CONFLICT => {
                Ok(Self::classify_conflict(&body))
            }
            Err(e) => Err(BookingError::GenericFailure(e.to_string())),
        }
    }

    async fn available_slots(
        &self,
        query: &SlotQuery,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        debug!(
            "Fetching slots for specialty {} between {} and {}",
            query.specialty_id, query.from, query.to
        );

        let params = [
            ("specialty_id", query.specialty_id.clone()),
            ("from", query.from.format("%Y-%m-%d").to_string()),
            ("to", query.to.format("%Y-%m-%d").to_string()),
        ];

        self.client
            .request::<Vec<AvailableSlot>, ()>(
                Method::GET,
                "/appointments/slots",
                &params,
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| BookingError::GenericFailure(e.to_string()))
    }
}
