use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use appointment_cell::models::PatientType;
use appointment_cell::services::AppointmentBackend;
use session_cell::models::TimerState;
use session_cell::services::{Clock, SystemClock};
use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::services::session::ChatSession;

/// Live chat sessions by id. Sessions are independent; the map is the only shared piece.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<ChatSession>>>,
    backend: Arc<dyn AppointmentBackend>,
    clock: Arc<dyn Clock>,
    duration_seconds: u64,
    tick_period: Duration,
}

impl SessionRegistry {
    pub fn new(config: &AppConfig, backend: Arc<dyn AppointmentBackend>) -> Self {
        Self::with_clock(config, backend, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &AppConfig,
        backend: Arc<dyn AppointmentBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            backend,
            clock,
            duration_seconds: config.session_duration_seconds,
            tick_period: Duration::from_millis(config.session_tick_millis.max(1)),
        }
    }

    pub async fn start_session(
        &self,
        owner_id: &str,
        patient_id: &str,
        patient_type: PatientType,
    ) -> Result<Arc<ChatSession>, AppError> {
        if patient_id.trim().is_empty() {
            return Err(AppError::ValidationError("patient_id is required".to_string()));
        }

        let purged = self.purge_finished().await;
        if purged > 0 {
            debug!("Purged {} finished chat sessions", purged);
        }

        let session = Arc::new(ChatSession::start(
            owner_id,
            patient_id,
            patient_type,
            self.duration_seconds,
            self.tick_period,
            self.clock.clone(),
            self.backend.clone(),
        ));

        self.sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    /// Session that can still take booking calls. Expired sessions are dropped on lookup.
    pub async fn get_active(&self, session_id: Uuid) -> Result<Arc<ChatSession>, AppError> {
        let session = self.get(session_id).await?;

        match session.status().state {
            TimerState::Running => Ok(session),
            TimerState::Expired => {
                self.sessions.write().await.remove(&session_id);
                debug!("Removed expired chat session {}", session_id);
                Err(AppError::Gone(format!("Chat session {} has expired", session_id)))
            }
            TimerState::Closed => {
                self.sessions.write().await.remove(&session_id);
                Err(AppError::NotFound(format!("Chat session {} not found", session_id)))
            }
        }
    }

    /// Session in any state, for status reads.
    pub async fn get(&self, session_id: Uuid) -> Result<Arc<ChatSession>, AppError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Chat session {} not found", session_id)))
    }

    pub async fn close_session(&self, session_id: Uuid) -> Result<Arc<ChatSession>, AppError> {
        let session = self.get_active(session_id).await?;
        session.close().await;
        self.sessions.write().await.remove(&session_id);
        info!("Chat session {} closed by patient", session_id);
        Ok(session)
    }

    /// Drops every session whose timer has stopped.
    pub async fn purge_finished(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_active());
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.is_active())
            .count()
    }
}
