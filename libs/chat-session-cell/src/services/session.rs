use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::info;
use uuid::Uuid;

use appointment_cell::models::PatientType;
use shared_models::auth::User;
use shared_models::error::AppError;
use appointment_cell::services::{AppointmentBackend, BookingConflictHandler};
use session_cell::models::{TimerSnapshot, TimerState};
use session_cell::services::{spawn_session_timer, Clock, IntervalTicks, SessionTimer, SessionTimerHandle};

use crate::models::{SessionStatus, SessionView};

/// One patient's chat-assisted booking session.
///
/// Owns the countdown that bounds the conversation and the conflict handler used for its
/// reservations. The two do not talk to each other; callers check [`ChatSession::is_active`]
/// before booking.
pub struct ChatSession {
    pub id: Uuid,
    /// Authenticated user that opened the session.
    pub owner_id: String,
    pub patient_id: String,
    pub patient_type: PatientType,
    pub started_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    duration_seconds: u64,
    status: watch::Receiver<SessionStatus>,
    timer: Mutex<Option<SessionTimerHandle>>,
    booking: BookingConflictHandler,
}

impl ChatSession {
    pub fn start(
        owner_id: &str,
        patient_id: &str,
        patient_type: PatientType,
        duration_seconds: u64,
        tick_period: Duration,
        clock: Arc<dyn Clock>,
        backend: Arc<dyn AppointmentBackend>,
    ) -> Self {
        let id = Uuid::new_v4();
        let started_at = clock.now();
        let mut timer = SessionTimer::start(duration_seconds, clock);
        let ends_at = timer.ends_at();

        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: TimerState::Running,
            remaining_seconds: duration_seconds,
        });
        let status_tx = Arc::new(status_tx);

        let on_tick = status_tx.clone();
        let on_expire = status_tx.clone();
        let on_close = status_tx;
        timer
            .on_tick(move |remaining| {
                on_tick.send_modify(|status| status.remaining_seconds = remaining);
            })
            .on_expire(move || {
                info!("Chat session {} expired", id);
                on_expire.send_replace(SessionStatus {
                    state: TimerState::Expired,
                    remaining_seconds: 0,
                });
            })
            .on_close(move || {
                info!("Chat session {} closed", id);
                on_close.send_modify(|status| status.state = TimerState::Closed);
            });

        let handle = spawn_session_timer(timer, IntervalTicks::new(tick_period));
        info!("Chat session {} started for patient {}, {}s budget", id, patient_id, duration_seconds);

        Self {
            id,
            owner_id: owner_id.to_string(),
            patient_id: patient_id.trim().to_string(),
            patient_type,
            started_at,
            ends_at,
            duration_seconds,
            status: status_rx,
            timer: Mutex::new(Some(handle)),
            booking: BookingConflictHandler::new(backend),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.status().state == TimerState::Running
    }

    /// Only the owner, or an admin, may read or act on a session.
    pub fn ensure_access(&self, user: &User) -> Result<(), AppError> {
        let is_owner = user.id == self.owner_id;
        let is_admin = user.role.as_deref() == Some("admin");

        if !is_owner && !is_admin {
            return Err(AppError::Auth("Not authorized to access this chat session".to_string()));
        }
        Ok(())
    }

    pub fn booking(&self) -> &BookingConflictHandler {
        &self.booking
    }

    /// Stops the countdown through the close path. Returns `false` if it had already stopped.
    pub async fn close(&self) -> bool {
        let handle = self.timer.lock().await.take();
        match handle {
            Some(handle) if self.is_active() => {
                handle.close().await;
                self.status().state == TimerState::Closed
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let status = self.status();
        TimerSnapshot {
            state: status.state,
            remaining_seconds: status.remaining_seconds,
            duration_seconds: self.duration_seconds,
            ends_at: self.ends_at,
        }
    }

    pub async fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            patient_id: self.patient_id.clone(),
            patient_type: self.patient_type,
            started_at: self.started_at,
            timer: self.snapshot(),
            blocked_specialties: self.booking.blocked_specialties(&self.patient_id).await,
        }
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("patient_id", &self.patient_id)
            .field("patient_type", &self.patient_type)
            .field("started_at", &self.started_at)
            .field("ends_at", &self.ends_at)
            .field("duration_seconds", &self.duration_seconds)
            .finish_non_exhaustive()
    }
}
