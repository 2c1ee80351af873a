use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{
    AvailableSlot, BookingAttempt, BookingError, ConflictOutcome, ReservationResult, SlotQuery,
};
use crate::services::backend::AppointmentBackend;

/// Drives reservation attempts for one booking session and turns backend conflicts into
/// recovery states.
///
/// Conflicts are never retried here. A lost race refreshes the slot list before returning, and a
/// duplicate appointment blocks that specialty for the patient until a different one is chosen.
pub struct BookingConflictHandler {
    backend: Arc<dyn AppointmentBackend>,
    in_flight: AtomicBool,
    slot_cache: RwLock<HashMap<SlotQuery, Vec<AvailableSlot>>>,
    blocked_specialties: RwLock<HashSet<(String, String)>>,
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl BookingConflictHandler {
    pub fn new(backend: Arc<dyn AppointmentBackend>) -> Self {
        Self {
            backend,
            in_flight: AtomicBool::new(false),
            slot_cache: RwLock::new(HashMap::new()),
            blocked_specialties: RwLock::new(HashSet::new()),
        }
    }

    /// Attempts a reservation. `listing` is the slot window the patient picked from; it is what
    /// gets re-fetched when the slot turns out to be taken.
    pub async fn reserve(
        &self,
        attempt: &BookingAttempt,
        listing: &SlotQuery,
        auth_token: &str,
    ) -> Result<ConflictOutcome, BookingError> {
        attempt.validate()?;

        if listing.specialty_id != attempt.specialty_id.trim() {
            return Err(BookingError::Validation(format!(
                "slot listing is for specialty {}, attempt is for {}",
                listing.specialty_id, attempt.specialty_id
            )));
        }

        if self.is_blocked(&attempt.patient_id, &attempt.specialty_id).await {
            return Err(BookingError::SpecialtyBlocked {
                specialty_id: attempt.specialty_id.trim().to_string(),
            });
        }

        let _guard = InFlightGuard::acquire(&self.in_flight)
            .ok_or(BookingError::ReservationInFlight)?;

        let request = attempt.to_request();
        match self.backend.reserve(&request, auth_token).await? {
            ReservationResult::Confirmed(confirmation) => {
                info!(
                    "Appointment {} confirmed for patient {} in specialty {}",
                    confirmation.appointment_id, request.patient_id, request.specialty_id
                );
                // The booked slot is gone from every listing of this specialty.
                self.invalidate_specialty(&request.specialty_id).await;
                Ok(ConflictOutcome::Success { confirmation })
            }
            ReservationResult::SlotTaken { message } => {
                warn!(
                    "Slot {} {} in specialty {} was taken, refreshing listing",
                    request.date, request.time, request.specialty_id
                );
                self.invalidate(listing).await;
                let (refreshed_slots, refresh_error) =
                    match self.refresh_slots(listing, auth_token).await {
                        Ok(slots) => (slots, None),
                        Err(e) => {
                            warn!("Could not refresh slots for specialty {}: {}", listing.specialty_id, e);
                            (Vec::new(), Some(e.to_string()))
                        }
                    };
                Ok(ConflictOutcome::SlotAlreadyTaken {
                    message,
                    refreshed_slots,
                    refresh_error,
                })
            }
            ReservationResult::DuplicateAppointment { message } => {
                warn!(
                    "Patient {} already holds an appointment in specialty {}",
                    request.patient_id, request.specialty_id
                );
                self.blocked_specialties
                    .write()
                    .await
                    .insert((request.patient_id.clone(), request.specialty_id.clone()));
                Ok(ConflictOutcome::DuplicatePatientAppointment {
                    message,
                    specialty_id: request.specialty_id,
                })
            }
        }
    }

    /// Cached listing for `query`, fetched on first use.
    pub async fn available_slots(
        &self,
        query: &SlotQuery,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        if let Some(slots) = self.slot_cache.read().await.get(query) {
            debug!("Serving cached slots for specialty {}", query.specialty_id);
            return Ok(slots.clone());
        }
        self.refresh_slots(query, auth_token).await
    }

    /// Always hits the backend and replaces the cached listing.
    pub async fn refresh_slots(
        &self,
        query: &SlotQuery,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        let slots = self.backend.available_slots(query, auth_token).await?;
        debug!("Fetched {} slots for specialty {}", slots.len(), query.specialty_id);
        self.slot_cache.write().await.insert(query.clone(), slots.clone());
        Ok(slots)
    }

    /// Recovery path after a duplicate appointment: list slots for another specialty.
    pub async fn choose_specialty(
        &self,
        patient_id: &str,
        query: &SlotQuery,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        if self.is_blocked(patient_id, &query.specialty_id).await {
            return Err(BookingError::SpecialtyBlocked {
                specialty_id: query.specialty_id.clone(),
            });
        }
        self.available_slots(query, auth_token).await
    }

    pub async fn blocked_specialties(&self, patient_id: &str) -> Vec<String> {
        let patient_id = patient_id.trim();
        let mut specialties: Vec<String> = self.blocked_specialties
            .read()
            .await
            .iter()
            .filter(|(patient, _)| patient == patient_id)
            .map(|(_, specialty)| specialty.clone())
            .collect();
        specialties.sort();
        specialties
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn is_blocked(&self, patient_id: &str, specialty_id: &str) -> bool {
        self.blocked_specialties
            .read()
            .await
            .contains(&(patient_id.trim().to_string(), specialty_id.trim().to_string()))
    }

    async fn invalidate(&self, query: &SlotQuery) {
        self.slot_cache.write().await.remove(query);
    }

    async fn invalidate_specialty(&self, specialty_id: &str) {
        self.slot_cache
            .write()
            .await
            .retain(|query, _| query.specialty_id != specialty_id);
    }
}
