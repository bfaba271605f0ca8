//! Deadline timers for live operations
//!
//! One spawned sleep task per armed operation. Each timer is tagged with the
//! generation of the start it belongs to; the firing path re-checks that tag
//! against the registry under the coordinator lock before acting, so an abort
//! issued by `stop_loading` and a fire that is already in flight cannot both
//! take effect.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Timer {
    generation: u64,
    handle: AbortHandle,
}

/// Schedules and cancels per-operation deadlines
///
/// Holds operations by name only; a timer never keeps an operation alive.
#[derive(Default)]
pub struct TimeoutSupervisor {
    timers: HashMap<String, Timer>,
}

impl TimeoutSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot deadline for `name`, replacing any existing one
    ///
    /// Outside a tokio runtime nothing is armed and a warning is logged.
    pub fn schedule<F>(&mut self, name: &str, generation: u64, timeout: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        debug!(%name, generation, ?timeout, "TimeoutSupervisor::schedule: called");
        self.cancel(name);

        let Ok(runtime) = Handle::try_current() else {
            warn!(%name, "No tokio runtime, deadline not armed");
            return;
        };

        // Deadline is fixed now, not at the task's first poll
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            warn!(%name, ?timeout, "Deadline out of range, not armed");
            return;
        };
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire();
        });

        self.timers.insert(
            name.to_string(),
            Timer {
                generation,
                handle: task.abort_handle(),
            },
        );
    }

    /// Disarm the timer for `name`; idempotent
    pub fn cancel(&mut self, name: &str) -> bool {
        match self.timers.remove(name) {
            Some(timer) => {
                debug!(%name, generation = timer.generation, "TimeoutSupervisor::cancel: aborting timer");
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the timer for `name` from inside its own firing path
    ///
    /// Only removes the entry when it belongs to `generation`; a timer armed
    /// by a later start is left in place.
    pub fn disarm(&mut self, name: &str, generation: u64) -> bool {
        match self.timers.get(name) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Disarm every outstanding timer, returning how many were armed
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        debug!(count, "TimeoutSupervisor::cancel_all: called");
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        count
    }

    pub fn is_armed(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.timers.len()
    }
}
