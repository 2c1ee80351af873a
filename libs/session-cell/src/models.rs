// libs/session-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Running,
    Expired,
    Closed,
}

impl TimerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TimerState::Running)
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerState::Running => write!(f, "running"),
            TimerState::Expired => write!(f, "expired"),
            TimerState::Closed => write!(f, "closed"),
        }
    }
}

/// What the driver should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue { remaining_seconds: u64 },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub remaining_seconds: u64,
    pub duration_seconds: u64,
    pub ends_at: DateTime<Utc>,
}
