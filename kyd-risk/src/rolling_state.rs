use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Process-local, mutex-protected counters backing the global circuit
/// breaker and per-sender cool-off (§5, §9). Advisory: lost on restart and
/// never the source of truth, which is why neither is persisted.
pub struct RollingState {
    inner: Mutex<Inner>,
}

struct Inner {
    circuit: CircuitCounters,
    cool_off: HashMap<Uuid, ColdOffEntry>,
}

#[derive(Default)]
struct CircuitCounters {
    total: u32,
    failures: u32,
    opened_at: Option<Instant>,
}

struct ColdOffEntry {
    flagged_count: u32,
    window_start: Instant,
}

impl Default for RollingState {
    fn default() -> Self {
        RollingState {
            inner: Mutex::new(Inner {
                circuit: CircuitCounters::default(),
                cool_off: HashMap::new(),
            }),
        }
    }
}

impl RollingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the orchestrator after every attempt so the breaker can
    /// track the rolling failure rate.
    pub fn record_outcome(&self, succeeded: bool) {
        let mut inner = self.inner.lock().expect("rolling state mutex poisoned");
        inner.circuit.total += 1;
        if !succeeded {
            inner.circuit.failures += 1;
        }
    }

    /// True if the breaker is currently open (tripped and not yet cooled
    /// down). Resets counters once the cooldown elapses.
    pub fn circuit_open(&self, failure_rate_threshold: f64, min_samples: u32, cooldown: Duration) -> bool {
        let mut inner = self.inner.lock().expect("rolling state mutex poisoned");

        if let Some(opened_at) = inner.circuit.opened_at {
            if opened_at.elapsed() >= cooldown {
                inner.circuit.opened_at = None;
                inner.circuit.total = 0;
                inner.circuit.failures = 0;
                return false;
            }
            return true;
        }

        if inner.circuit.total >= min_samples {
            let rate = inner.circuit.failures as f64 / inner.circuit.total as f64;
            if rate > failure_rate_threshold {
                inner.circuit.opened_at = Some(Instant::now());
                return true;
            }
        }

        false
    }

    /// Records a flagged (failed/blocked) evaluation for `sender_id`,
    /// resetting the count if the prior cool-off window has expired.
    pub fn record_flag(&self, sender_id: Uuid, window: Duration) {
        let mut inner = self.inner.lock().expect("rolling state mutex poisoned");
        let entry = inner.cool_off.entry(sender_id).or_insert_with(|| ColdOffEntry {
            flagged_count: 0,
            window_start: Instant::now(),
        });

        if entry.window_start.elapsed() >= window {
            entry.flagged_count = 0;
            entry.window_start = Instant::now();
        }
        entry.flagged_count += 1;
    }

    /// True if `sender_id` is within an active cool-off (has accumulated
    /// `threshold` or more flags inside the window).
    pub fn in_cool_off(&self, sender_id: Uuid, threshold: u32, window: Duration) -> bool {
        let inner = self.inner.lock().expect("rolling state mutex poisoned");
        match inner.cool_off.get(&sender_id) {
            Some(entry) => entry.window_start.elapsed() < window && entry.flagged_count >= threshold,
            None => false,
        }
    }
}
