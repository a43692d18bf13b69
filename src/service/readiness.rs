use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ChatBackend;

/// Statuses from here up mean the backend is up but broken; anything below
/// (including 404) proves it is reachable.
const SERVER_ERROR: u16 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessState {
    /// One-way latch.
    pub ready: bool,
    pub busy: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

/// Polls the health paths until one answers, then stays ready for good.
pub struct ReadinessMonitor {
    backend: Arc<dyn ChatBackend>,
    health_paths: Vec<String>,
    interval: Duration,
    state: Mutex<ReadinessState>,
    token: CancellationToken,
}

impl ReadinessMonitor {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        health_paths: Vec<String>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            backend,
            health_paths,
            interval,
            state: Mutex::new(ReadinessState::default()),
            token,
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Runs one probe round unless already ready, already probing, or torn down.
    pub async fn check_now(&self) -> ReadinessState {
        {
            let mut state = self.state.lock();
            if state.ready || state.busy || self.token.is_cancelled() {
                return state.clone();
            }
            state.busy = true;
        }
        let _busy = BusyRelease(&self.state);

        let mut reachable = false;
        let mut last_error = None;
        for path in &self.health_paths {
            match self.backend.probe(path).await {
                Ok(status) if status < SERVER_ERROR => {
                    debug!(path = %path, status, "Backend reachable");
                    reachable = true;
                    break;
                }
                Ok(status) => last_error = Some(format!("Health check {path} returned {status}")),
                Err(e) => last_error = Some(format!("Health check {path} failed: {e}")),
            }
        }

        let mut state = self.state.lock();
        if self.token.is_cancelled() {
            state.busy = false;
            return state.clone();
        }
        if reachable {
            state.ready = true;
            state.last_error = None;
            state.retry_count = 0;
            info!("Backend is ready");
        } else {
            state.retry_count += 1;
            state.last_error =
                Some(last_error.unwrap_or_else(|| "No health paths configured".to_string()));
            warn!(
                retry = state.retry_count,
                error = state.last_error.as_deref().unwrap_or_default(),
                "Backend not reachable yet"
            );
        }
        state.busy = false;
        state.clone()
    }

    /// Re-checks on a fixed interval until ready (true) or torn down (false).
    pub async fn run(&self) -> bool {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return false,
                _ = ticker.tick() => {}
            }
            if self.check_now().await.ready {
                return true;
            }
        }
    }
}

/// Clears `busy` even if the probing future is dropped mid-flight.
struct BusyRelease<'a>(&'a Mutex<ReadinessState>);

impl Drop for BusyRelease<'_> {
    fn drop(&mut self) {
        self.0.lock().busy = false;
    }
}
