use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::models::{TickOutcome, TimerSnapshot, TimerState};
use crate::services::clock::Clock;

type TickCallback = Box<dyn FnMut(u64) + Send>;
type TerminalCallback = Box<dyn FnOnce() + Send>;

/// Countdown against an absolute deadline.
///
/// Remaining time is recomputed from `ends_at` on every tick instead of decrementing a counter,
/// so slow or skipped ticks never accumulate drift. Once the timer reaches
/// [`TimerState::Expired`] or [`TimerState::Closed`] it stays there.
pub struct SessionTimer {
    duration_seconds: u64,
    ends_at: DateTime<Utc>,
    remaining_seconds: u64,
    state: TimerState,
    clock: Arc<dyn Clock>,
    tick_listeners: Vec<TickCallback>,
    on_expire: Option<TerminalCallback>,
    on_close: Option<TerminalCallback>,
}

impl SessionTimer {
    pub fn start(duration_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let ends_at = i64::try_from(duration_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!("Session timer started for {}s, ends at {}", duration_seconds, ends_at);

        Self {
            duration_seconds,
            ends_at,
            remaining_seconds: duration_seconds,
            state: TimerState::Running,
            clock,
            tick_listeners: Vec::new(),
            on_expire: None,
            on_close: None,
        }
    }

    /// Registers a listener for remaining-time updates. Called only when the value changes.
    pub fn on_tick<F>(&mut self, listener: F) -> &mut Self
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.tick_listeners.push(Box::new(listener));
        self
    }

    pub fn on_expire<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_expire = Some(Box::new(callback));
        self
    }

    pub fn on_close<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(Box::new(callback));
        self
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state.is_terminal() {
            return TickOutcome::Stop;
        }

        // Clamp so a wall clock stepping backwards never makes the countdown go up.
        let remaining = self.compute_remaining().min(self.remaining_seconds);

        if remaining > 0 {
            if remaining != self.remaining_seconds {
                self.remaining_seconds = remaining;
                for listener in self.tick_listeners.iter_mut() {
                    listener(remaining);
                }
            }
            return TickOutcome::Continue { remaining_seconds: remaining };
        }

        self.remaining_seconds = 0;
        self.state = TimerState::Expired;
        info!("Session timer expired after {}s", self.duration_seconds);

        if let Some(callback) = self.on_expire.take() {
            callback();
        }
        self.on_close = None;

        TickOutcome::Stop
    }

    /// Stops a running timer without signalling expiry. Returns `false` if it had already stopped.
    pub fn close(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        self.state = TimerState::Closed;
        debug!("Session timer closed with {}s remaining", self.remaining_seconds);

        if let Some(callback) = self.on_close.take() {
            callback();
        }
        self.on_expire = None;

        true
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Last published remaining value.
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            state: self.state,
            remaining_seconds: self.remaining_seconds,
            duration_seconds: self.duration_seconds,
            ends_at: self.ends_at,
        }
    }

    fn compute_remaining(&self) -> u64 {
        let millis = (self.ends_at - self.clock.now()).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            // ceil(millis / 1000)
            ((millis + 999) / 1000) as u64
        }
    }
}

impl std::fmt::Debug for SessionTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTimer")
            .field("duration_seconds", &self.duration_seconds)
            .field("ends_at", &self.ends_at)
            .field("remaining_seconds", &self.remaining_seconds)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::services::clock::ManualClock;

    fn manual_timer(duration: u64) -> (Arc<ManualClock>, SessionTimer) {
        let clock = Arc::new(ManualClock::default());
        let timer = SessionTimer::start(duration, clock.clone());
        (clock, timer)
    }

    #[test]
    fn test_expires_exactly_once_after_full_duration() {
        let (clock, mut timer) = manual_timer(600);
        let expirations = Arc::new(AtomicUsize::new(0));
        let counter = expirations.clone();
        timer.on_expire(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        clock.advance(Duration::seconds(599));
        assert_eq!(timer.tick(), TickOutcome::Continue { remaining_seconds: 1 });

        clock.advance(Duration::seconds(1));
        assert_eq!(timer.tick(), TickOutcome::Stop);
        assert!(timer.is_expired());

        clock.advance(Duration::seconds(30));
        assert_eq!(timer.tick(), TickOutcome::Stop);
        assert_eq!(expirations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_updates_after_expiry() {
        let (clock, mut timer) = manual_timer(3);
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        timer.on_tick(move |remaining| sink.lock().unwrap().push(remaining));

        for _ in 0..6 {
            clock.advance(Duration::seconds(1));
            timer.tick();
        }

        assert_eq!(*published.lock().unwrap(), vec![2, 1]);
        assert_eq!(timer.remaining_seconds(), 0);
    }

    #[test]
    fn test_remaining_rounds_up_partial_seconds() {
        let (clock, mut timer) = manual_timer(10);

        clock.advance(Duration::milliseconds(100));
        assert_eq!(timer.tick(), TickOutcome::Continue { remaining_seconds: 10 });

        clock.advance(Duration::milliseconds(900));
        assert_eq!(timer.tick(), TickOutcome::Continue { remaining_seconds: 9 });

        clock.advance(Duration::milliseconds(8_999));
        assert_eq!(timer.tick(), TickOutcome::Continue { remaining_seconds: 1 });
    }

    #[test]
    fn test_remaining_is_monotonic_when_clock_steps_back() {
        let (clock, mut timer) = manual_timer(60);
        let start = clock.now();

        clock.advance(Duration::seconds(30));
        assert_eq!(timer.tick(), TickOutcome::Continue { remaining_seconds: 30 });

        clock.set(start);
        assert_eq!(timer.tick(), TickOutcome::Continue { remaining_seconds: 30 });
        assert_eq!(timer.remaining_seconds(), 30);
    }

    #[test]
    fn test_huge_duration_saturates_deadline() {
        let (clock, mut timer) = manual_timer(u64::MAX);
        assert_eq!(timer.ends_at(), DateTime::<Utc>::MAX_UTC);

        clock.advance(Duration::days(365));
        assert_matches!(timer.tick(), TickOutcome::Continue { .. });
        assert_eq!(timer.state(), TimerState::Running);
        assert_eq!(timer.snapshot().duration_seconds, u64::MAX);
    }

    #[test]
    fn test_large_jump_expires_in_one_tick() {
        let (clock, mut timer) = manual_timer(600);

        clock.advance(Duration::hours(3));
        assert_eq!(timer.tick(), TickOutcome::Stop);
        assert_eq!(timer.state(), TimerState::Expired);
    }

    #[test]
    fn test_close_runs_close_callback_not_expiry() {
        let (clock, mut timer) = manual_timer(5);
        let events = Arc::new(Mutex::new(Vec::new()));
        let on_close = events.clone();
        let on_expire = events.clone();
        timer
            .on_close(move || on_close.lock().unwrap().push("closed"))
            .on_expire(move || on_expire.lock().unwrap().push("expired"));

        assert!(timer.close());
        assert!(!timer.close());

        clock.advance(Duration::seconds(10));
        assert_eq!(timer.tick(), TickOutcome::Stop);

        assert_eq!(*events.lock().unwrap(), vec!["closed"]);
        assert_eq!(timer.state(), TimerState::Closed);
    }

    #[test]
    fn test_close_after_expiry_is_noop() {
        let (clock, mut timer) = manual_timer(1);
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        timer.on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        clock.advance(Duration::seconds(1));
        timer.tick();

        assert!(!timer.close());
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        assert_matches!(timer.state(), TimerState::Expired);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let (clock, mut timer) = manual_timer(120);
        clock.advance(Duration::seconds(20));
        timer.tick();

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.state, TimerState::Running);
        assert_eq!(snapshot.remaining_seconds, 100);
        assert_eq!(snapshot.duration_seconds, 120);
        assert_eq!(snapshot.ends_at, timer.ends_at());
    }
}
