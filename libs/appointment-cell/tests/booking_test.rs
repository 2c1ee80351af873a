use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use appointment_cell::*;

const TOKEN: &str = "patient-token";

/// Scripted backend that records every call it receives.
#[derive(Default)]
struct FakeBackend {
    reserve_results: Mutex<VecDeque<Result<ReservationResult, BookingError>>>,
    slot_lists: Mutex<VecDeque<Vec<AvailableSlot>>>,
    reserve_requests: Mutex<Vec<ReservationRequest>>,
    slot_calls: AtomicUsize,
    slot_error: Mutex<Option<BookingError>>,
    gate: Option<Arc<Notify>>,
}

impl FakeBackend {
    fn with_reserve_results(results: Vec<Result<ReservationResult, BookingError>>) -> Self {
        Self {
            reserve_results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    fn push_slots(&self, slots: Vec<AvailableSlot>) {
        self.slot_lists.lock().unwrap().push_back(slots);
    }

    fn reserve_calls(&self) -> usize {
        self.reserve_requests.lock().unwrap().len()
    }

    fn slot_calls(&self) -> usize {
        self.slot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentBackend for FakeBackend {
    async fn reserve(
        &self,
        request: &ReservationRequest,
        _auth_token: &str,
    ) -> Result<ReservationResult, BookingError> {
        self.reserve_requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reserve_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ReservationResult::Confirmed(confirmation("APT-DEFAULT"))))
    }

    async fn available_slots(
        &self,
        query: &SlotQuery,
        _auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        self.slot_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.slot_error.lock().unwrap().take() {
            return Err(err);
        }
        let slots = self.slot_lists.lock().unwrap().pop_front().unwrap_or_default();
        Ok(slots
            .into_iter()
            .map(|mut slot| {
                slot.specialty_id = query.specialty_id.clone();
                slot
            })
            .collect())
    }
}

fn confirmation(id: &str) -> ReservationConfirmation {
    ReservationConfirmation {
        appointment_id: id.to_string(),
        specialty_id: None,
        date: None,
        time: None,
        turn: None,
    }
}

fn slot(date: &str, time: &str) -> AvailableSlot {
    AvailableSlot {
        specialty_id: String::new(),
        date: date.to_string(),
        time: time.to_string(),
        doctor_name: None,
    }
}

fn attempt(specialty: &str, time: &str) -> BookingAttempt {
    BookingAttempt {
        specialty_id: specialty.to_string(),
        patient_id: "70112233".to_string(),
        slot_date_time: parse_slot_date_time("25/12/2024", time).unwrap(),
        patient_type: map_patient_type(Some("sis")),
    }
}

fn listing(specialty: &str) -> SlotQuery {
    SlotQuery::new(
        specialty,
        NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_success_returns_confirmation_and_sends_formatted_request() {
    let backend = Arc::new(FakeBackend::with_reserve_results(vec![Ok(
        ReservationResult::Confirmed(confirmation("APT-1")),
    )]));
    let handler = BookingConflictHandler::new(backend.clone());

    let outcome = handler.reserve(&attempt("CARD", "15:30"), &listing("CARD"), TOKEN).await.unwrap();

    assert_matches!(outcome, ConflictOutcome::Success { confirmation } if confirmation.appointment_id == "APT-1");

    let requests = backend.reserve_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].date, "2024-12-25");
    assert_eq!(requests[0].time, "15:30");
    assert_eq!(requests[0].turn, Shift::Afternoon);
    assert_eq!(requests[0].patient_type, PatientType::Sis);
}

#[tokio::test]
async fn test_slot_taken_refetches_slots_without_resubmitting() {
    let backend = Arc::new(FakeBackend::with_reserve_results(vec![Ok(
        ReservationResult::SlotTaken { message: "cupo ocupado".to_string() },
    )]));
    backend.push_slots(vec![slot("2024-12-25", "09:00"), slot("2024-12-25", "15:30")]);
    backend.push_slots(vec![slot("2024-12-25", "09:00")]);
    let handler = BookingConflictHandler::new(backend.clone());
    let query = listing("CARD");

    let cached = handler.available_slots(&query, TOKEN).await.unwrap();
    assert_eq!(cached.len(), 2);

    let outcome = handler.reserve(&attempt("CARD", "15:30"), &query, TOKEN).await.unwrap();

    assert_matches!(
        &outcome,
        ConflictOutcome::SlotAlreadyTaken { refreshed_slots, refresh_error: None, .. }
            if refreshed_slots.len() == 1
    );
    assert!(outcome.is_conflict());
    assert_eq!(backend.reserve_calls(), 1, "conflict must not be retried");
    assert_eq!(backend.slot_calls(), 2, "listing must be fetched again after the conflict");

    // The refreshed listing replaced the stale cache.
    let after = handler.available_slots(&query, TOKEN).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(backend.slot_calls(), 2);
}

#[tokio::test]
async fn test_slot_taken_survives_failed_refresh() {
    let backend = Arc::new(FakeBackend::with_reserve_results(vec![Ok(
        ReservationResult::SlotTaken { message: "cupo ocupado".to_string() },
    )]));
    backend.push_slots(vec![slot("2024-12-25", "09:00"), slot("2024-12-25", "15:30")]);
    let handler = BookingConflictHandler::new(backend.clone());
    let query = listing("CARD");

    handler.available_slots(&query, TOKEN).await.unwrap();
    *backend.slot_error.lock().unwrap() =
        Some(BookingError::GenericFailure("Hospital API error (503)".to_string()));

    let outcome = handler.reserve(&attempt("CARD", "15:30"), &query, TOKEN).await.unwrap();

    assert_matches!(
        &outcome,
        ConflictOutcome::SlotAlreadyTaken { message, refreshed_slots, refresh_error: Some(_) }
            if message == "cupo ocupado" && refreshed_slots.is_empty()
    );
    assert_eq!(backend.reserve_calls(), 1);
    assert!(!handler.is_in_flight());

    // The stale listing was dropped, so the next read goes back to the backend.
    backend.push_slots(vec![slot("2024-12-25", "09:00")]);
    let after = handler.available_slots(&query, TOKEN).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(backend.slot_calls(), 3);
}

#[tokio::test]
async fn test_duplicate_appointment_blocks_same_specialty() {
    let backend = Arc::new(FakeBackend::with_reserve_results(vec![Ok(
        ReservationResult::DuplicateAppointment { message: "ya tiene una cita".to_string() },
    )]));
    let handler = BookingConflictHandler::new(backend.clone());

    let outcome = handler.reserve(&attempt("CARD", "09:00"), &listing("CARD"), TOKEN).await.unwrap();
    assert_matches!(
        outcome,
        ConflictOutcome::DuplicatePatientAppointment { specialty_id, .. } if specialty_id == "CARD"
    );

    let retry = handler.reserve(&attempt("CARD", "10:00"), &listing("CARD"), TOKEN).await;
    assert_matches!(retry, Err(BookingError::SpecialtyBlocked { specialty_id }) if specialty_id == "CARD");
    assert_eq!(backend.reserve_calls(), 1, "blocked specialty must not reach the backend");

    assert_matches!(
        handler.choose_specialty("70112233", &listing("CARD"), TOKEN).await,
        Err(BookingError::SpecialtyBlocked { .. })
    );
    assert_eq!(handler.blocked_specialties("70112233").await, vec!["CARD".to_string()]);
    assert!(handler.blocked_specialties("other-patient").await.is_empty());
}

#[tokio::test]
async fn test_different_specialty_allowed_after_duplicate() {
    let backend = Arc::new(FakeBackend::with_reserve_results(vec![
        Ok(ReservationResult::DuplicateAppointment { message: "duplicada".to_string() }),
        Ok(ReservationResult::Confirmed(confirmation("APT-2"))),
    ]));
    backend.push_slots(vec![slot("2024-12-26", "08:00")]);
    let handler = BookingConflictHandler::new(backend.clone());

    handler.reserve(&attempt("CARD", "09:00"), &listing("CARD"), TOKEN).await.unwrap();

    let alternatives = handler.choose_specialty("70112233", &listing("DERM"), TOKEN).await.unwrap();
    assert_eq!(alternatives.len(), 1);
    assert_eq!(alternatives[0].specialty_id, "DERM");

    let outcome = handler.reserve(&attempt("DERM", "08:00"), &listing("DERM"), TOKEN).await.unwrap();
    assert_matches!(outcome, ConflictOutcome::Success { .. });
    assert_eq!(backend.reserve_calls(), 2);
}

#[tokio::test]
async fn test_second_reservation_refused_while_first_in_flight() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(FakeBackend {
        gate: Some(gate.clone()),
        ..FakeBackend::default()
    });
    let handler = Arc::new(BookingConflictHandler::new(backend.clone()));

    let first = {
        let handler = handler.clone();
        tokio::spawn(async move {
            handler.reserve(&attempt("CARD", "09:00"), &listing("CARD"), TOKEN).await
        })
    };

    while !handler.is_in_flight() {
        tokio::task::yield_now().await;
    }

    let second = handler.reserve(&attempt("CARD", "10:00"), &listing("CARD"), TOKEN).await;
    assert_matches!(second, Err(BookingError::ReservationInFlight));

    gate.notify_one();
    let first = first.await.unwrap();
    assert_matches!(first, Ok(ConflictOutcome::Success { .. }));
    assert!(!handler.is_in_flight());
    assert_eq!(backend.reserve_calls(), 1);
}

#[tokio::test]
async fn test_generic_failure_releases_guard() {
    let backend = Arc::new(FakeBackend::with_reserve_results(vec![
        Err(BookingError::GenericFailure("connection refused".to_string())),
        Ok(ReservationResult::Confirmed(confirmation("APT-3"))),
    ]));
    let handler = BookingConflictHandler::new(backend.clone());

    let failed = handler.reserve(&attempt("CARD", "09:00"), &listing("CARD"), TOKEN).await;
    assert_matches!(failed, Err(BookingError::GenericFailure(_)));
    assert!(!handler.is_in_flight());

    let retried = handler.reserve(&attempt("CARD", "09:00"), &listing("CARD"), TOKEN).await;
    assert_matches!(retried, Ok(ConflictOutcome::Success { .. }));
}

#[tokio::test]
async fn test_validation_short_circuits_backend() {
    let backend = Arc::new(FakeBackend::default());
    let handler = BookingConflictHandler::new(backend.clone());

    let mut blank_patient = attempt("CARD", "09:00");
    blank_patient.patient_id = "  ".to_string();
    assert_matches!(
        handler.reserve(&blank_patient, &listing("CARD"), TOKEN).await,
        Err(BookingError::Validation(_))
    );

    assert_matches!(
        handler.reserve(&attempt("CARD", "09:00"), &listing("DERM"), TOKEN).await,
        Err(BookingError::Validation(_))
    );
    assert_eq!(backend.reserve_calls(), 0);
}
