use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::model::UnixTimeMs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Error,
}

/// Single-slot notification. The newest toast replaces any pending one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub text: String,
    pub kind: ToastKind,
    pub shown_at: UnixTimeMs,
    pub expires_at: UnixTimeMs,
}

impl Toast {
    #[must_use]
    pub fn new(text: impl Into<String>, kind: ToastKind, duration: Duration) -> Self {
        let shown_at = UnixTimeMs::now();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            text: text.into(),
            kind,
            shown_at,
            expires_at: shown_at.saturating_add_ms(duration_ms),
        }
    }
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// Auto-clear timer for the toast slot. Restarting aborts the pending clear,
/// so only the last toast's timer ever fires.
#[derive(Default)]
pub(crate) struct ToastTimer {
    slot: Mutex<TimerSlot>,
}

impl ToastTimer {
    /// Schedules `on_expire(generation)` after `delay`. Returns the generation
    /// of the new timer.
    pub(crate) fn restart<F>(&self, delay: Duration, on_expire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        let generation = slot.generation;

        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                slot.pending = Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    on_expire(generation);
                }));
            }
            Err(_) => warn!("no async runtime; toast will stay until replaced or dismissed"),
        }
        generation
    }

    /// Runs `clear` if `generation` is still the newest timer. The slot stays
    /// locked meanwhile, so a concurrent `restart` either waits for the clear
    /// or makes this generation stale first.
    pub(crate) fn expire_if_current(&self, generation: u64, clear: impl FnOnce()) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            return false;
        }
        slot.pending = None;
        clear();
        true
    }

    /// Aborts the pending clear, if any.
    pub(crate) fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        if let Some(pending) = slot.pending.take() {
            pending.abort();
        }
    }
}
