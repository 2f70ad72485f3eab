use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use super::{RequestKey, SimulationOutcome, SimulationRequest, Simulator};
use crate::error::SimulationError;

/// Memoizes outcomes per [`RequestKey`] for the lifetime of one run.
///
/// Concurrent callers asking for the same key wait on a single computation
/// instead of running the engine twice. Failures are cached too: the same
/// request fails the same way.
pub struct CachedSimulator<S> {
    inner: S,
    entries: Mutex<HashMap<RequestKey, Arc<OnceLock<SimulationOutcome>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<S: Simulator> CachedSimulator<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Outcome for `request`, computing it at most once.
    pub fn outcome(&self, request: &SimulationRequest) -> SimulationOutcome {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(entries.entry(request.key()).or_default())
        };

        let mut computed = false;
        let outcome = cell.get_or_init(|| {
            computed = true;
            self.inner.invoke(request)
        });
        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit: {request}");
        }
        outcome.clone()
    }

    /// `(hits, misses)` so far.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl<S: Simulator> Simulator for CachedSimulator<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    /// Uncached pass-through to the wrapped engine.
    fn simulate(&self, request: &SimulationRequest) -> Result<f64, SimulationError> {
        self.inner.simulate(request)
    }

    fn invoke(&self, request: &SimulationRequest) -> SimulationOutcome {
        self.outcome(request)
    }
}
