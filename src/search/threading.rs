//! Shared control state for parallel MCTS workers.
//!
//! Workers draw simulations from a common step budget, honour a wall-clock
//! budget per search step and stop as soon as any of them raises the stop
//! flag (budget exhausted or fatal error).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Cores left free for the evaluator and the rest of the process.
const RESERVED_CORES: usize = 4;

/// Worker count to use when the configuration does not name one.
pub fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(RESERVED_CORES)
        .max(1)
}

#[derive(Debug)]
pub struct SearchState {
    stop: AtomicBool,
    started: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
    step_budget: AtomicU64,    // 0 means unlimited
    time_budget_ms: AtomicU64, // 0 means unlimited
    started_at: Mutex<Option<Instant>>,
}

impl SearchState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: AtomicBool::new(false),
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            step_budget: AtomicU64::new(0),
            time_budget_ms: AtomicU64::new(0),
            started_at: Mutex::new(None),
        })
    }

    #[inline]
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_step_budget(&self, budget: Option<u64>) {
        self.step_budget.store(budget.unwrap_or(0), Ordering::Relaxed);
    }

    #[inline]
    pub fn set_time_budget_ms(&self, budget_ms: Option<u64>) {
        self.time_budget_ms
            .store(budget_ms.unwrap_or(0), Ordering::Relaxed);
    }

    /// Clears counters and the stop flag and restarts the clock.
    pub fn reset_accounting(&self) {
        self.started.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.abandoned.store(0, Ordering::Relaxed);
        self.stop.store(false, Ordering::Relaxed);
        *self.started_at.lock() = Some(Instant::now());
    }

    /// Reserves one simulation; false once any budget is exhausted.
    pub fn try_begin_simulation(&self) -> bool {
        if self.should_stop() || self.time_budget_exceeded() {
            self.request_stop();
            return false;
        }
        let begun = self.started.fetch_add(1, Ordering::Relaxed) + 1;
        let limit = self.step_budget.load(Ordering::Relaxed);
        if limit != 0 && begun > limit {
            self.started.fetch_sub(1, Ordering::Relaxed);
            self.request_stop();
            return false;
        }
        true
    }

    #[inline]
    pub fn finish_simulation(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn abandon_simulation(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    pub fn elapsed_ms(&self) -> u64 {
        let started = *self.started_at.lock();
        started.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0)
    }

    pub fn time_budget_exceeded(&self) -> bool {
        let budget_ms = self.time_budget_ms.load(Ordering::Relaxed);
        if budget_ms == 0 {
            return false;
        }
        self.elapsed_ms() >= budget_ms
    }
}
