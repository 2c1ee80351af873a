use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::TickOutcome;
use crate::services::ticks::TickSource;
use crate::services::timer::SessionTimer;

/// Owner-side handle of a running timer task.
///
/// Dropping the handle tears the timer down: the task stops at its next suspension point and no
/// expiry or close callback runs afterwards.
#[derive(Debug)]
pub struct SessionTimerHandle {
    close_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl SessionTimerHandle {
    /// Closes the timer, running its close callback, and waits for the task to finish.
    pub async fn close(self) {
        let Self { close_tx, join } = self;
        if close_tx.send(()).is_err() {
            debug!("Session timer already stopped before close");
        }
        if let Err(e) = join.await {
            debug!("Session timer task ended abnormally: {}", e);
        }
    }

    /// Waits until the timer stops on its own (expiry).
    pub async fn join(self) {
        let Self { close_tx, join } = self;
        if let Err(e) = join.await {
            debug!("Session timer task ended abnormally: {}", e);
        }
        drop(close_tx);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs `timer` on a tokio task, re-evaluating it on every tick of `ticks`.
pub fn spawn_session_timer<T>(timer: SessionTimer, ticks: T) -> SessionTimerHandle
where
    T: TickSource + 'static,
{
    let (close_tx, close_rx) = oneshot::channel();
    let join = tokio::spawn(drive(timer, ticks, close_rx));
    SessionTimerHandle { close_tx, join }
}

async fn drive<T: TickSource>(
    mut timer: SessionTimer,
    mut ticks: T,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        match close_rx.try_recv() {
            Ok(()) => {
                timer.close();
                break;
            }
            Err(TryRecvError::Closed) => {
                debug!("Session timer owner dropped, tearing down");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        if let TickOutcome::Stop = timer.tick() {
            break;
        }

        tokio::select! {
            biased;
            signal = &mut close_rx => {
                match signal {
                    Ok(()) => {
                        timer.close();
                    }
                    Err(_) => debug!("Session timer owner dropped, tearing down"),
                }
                break;
            }
            _ = ticks.next_tick() => {}
        }
    }
}
