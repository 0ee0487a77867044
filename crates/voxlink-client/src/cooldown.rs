//! Reconnect cooldown
//!
//! Tracks failed connect attempts and a single armed timer that suppresses
//! reconnect attempts for a fixed interval. Nothing here reconnects on its
//! own; the owner polls [`ReconnectCooldown::is_armed`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct CooldownState {
    armed: bool,
    retry_count: u32,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

pub struct ReconnectCooldown {
    state: Arc<Mutex<CooldownState>>,
    max_retries: u32,
    interval: Duration,
}

impl ReconnectCooldown {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CooldownState::default())),
            max_retries,
            interval,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_count(&self) -> u32 {
        self.state.lock().retry_count
    }

    /// Count one failed attempt and return the new total
    pub fn record_failure(&self) -> u32 {
        let mut state = self.state.lock();
        state.retry_count += 1;
        state.retry_count
    }

    pub fn reset_retries(&self) {
        self.state.lock().retry_count = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    /// Arm the timer unless it is already armed or retries are exhausted.
    ///
    /// Returns whether a new timer was started.
    pub fn schedule(&self) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("Cannot schedule reconnect outside a runtime");
                return false;
            }
        };

        let mut state = self.state.lock();
        if state.armed {
            debug!("Reconnect already scheduled");
            return false;
        }
        if state.retry_count >= self.max_retries {
            debug!(
                "Retry budget spent ({}/{}), not scheduling",
                state.retry_count, self.max_retries
            );
            return false;
        }

        state.armed = true;
        state.generation += 1;
        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let interval = self.interval;
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            let mut state = shared.lock();
            // A cancel and re-arm may have raced the wakeup
            if state.generation != generation {
                return;
            }
            state.armed = false;
            state.timer = None;
            debug!("Reconnect cooldown elapsed");
        }));

        info!("Reconnect scheduled in {:?}", interval);
        true
    }

    /// Stop a pending timer and disarm
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.armed = false;
        state.generation += 1;
    }
}

impl Drop for ReconnectCooldown {
    fn drop(&mut self) {
        self.cancel();
    }
}
