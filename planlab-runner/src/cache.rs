//! Simulation cache with single-flight deduplication.
//!
//! At most one computation runs per [`SimulationKey`]. The computation lives
//! on a thread owned by its flight, not by any caller, so a caller that gives
//! up waiting does not stop it: the flight finishes and fills the cache for
//! everyone else. Results are kept for the configured TTL; past that they are
//! stale and only served to callers that ask for [`Freshness::AllowStale`].
//! Errors reach every waiter of the flight and are never cached.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use thiserror::Error;

use planlab_core::config::CacheConfig;
use planlab_core::{PlanId, SimulationError, SimulationKey, SimulationResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("gave up waiting for in-flight simulation after {waited:?}")]
    TimedOut { waited: Duration },

    #[error("simulation flight failed: {0}")]
    FlightFailed(String),
}

/// How a caller trades freshness for latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Never serve an entry older than the TTL; wait for a recompute.
    #[default]
    Fresh,
    /// Serve a stale entry immediately (flagged) and refresh in the background.
    AllowStale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedResult {
    pub result: SimulationResult,
    /// True when served past its TTL.
    pub stale: bool,
    pub computed_at: DateTime<Utc>,
    /// Age of the entry when it was served.
    pub age: Duration,
}

#[derive(Debug, Clone)]
struct Computed {
    result: SimulationResult,
    computed_at: DateTime<Utc>,
    finished: Instant,
}

impl Computed {
    fn serve(&self, stale: bool, now: Instant) -> CachedResult {
        CachedResult {
            result: self.result.clone(),
            stale,
            computed_at: self.computed_at,
            age: now.saturating_duration_since(self.finished),
        }
    }
}

type Outcome = Result<Computed, CacheError>;

// ─── Flight ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl Flight {
    fn wait(&self, timeout: Option<Duration>) -> Outcome {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(done) = outcome.as_ref() {
                return done.clone();
            }
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut outcome, deadline).timed_out() {
                        return match outcome.as_ref() {
                            Some(done) => done.clone(),
                            None => Err(CacheError::TimedOut {
                                waited: started.elapsed(),
                            }),
                        };
                    }
                }
                None => self.done.wait(&mut outcome),
            }
        }
    }

    fn complete(&self, outcome: Outcome) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }
}

// ─── Shared state ────────────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    entries: HashMap<SimulationKey, Computed>,
    flights: HashMap<SimulationKey, Arc<Flight>>,
    /// Bumped by `invalidate_plan`; flights started under an older
    /// generation do not write back.
    generations: HashMap<PlanId, u64>,
}

impl Shared {
    fn generation(&self, plan: &PlanId) -> u64 {
        self.generations.get(plan).copied().unwrap_or(0)
    }

    fn insert(&mut self, key: SimulationKey, computed: Computed, max_entries: usize) {
        self.entries.insert(key, computed);
        while self.entries.len() > max_entries.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, c)| c.finished)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    self.entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

// ─── Cache ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SimulationCache {
    config: CacheConfig,
    shared: Arc<Mutex<Shared>>,
}

impl SimulationCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached result for `key`, or run `compute` once for all
    /// concurrent callers of the same key.
    pub fn get_or_compute<F>(
        &self,
        key: SimulationKey,
        freshness: Freshness,
        compute: F,
    ) -> Result<CachedResult, CacheError>
    where
        F: FnOnce() -> Result<SimulationResult, SimulationError> + Send + 'static,
    {
        let ttl = self.config.ttl();
        let flight = {
            let mut shared = self.shared.lock();
            let now = Instant::now();

            if let Some(entry) = shared.entries.get(&key) {
                let age = now.saturating_duration_since(entry.finished);
                if age < ttl {
                    tracing::debug!(plan = %key.plan_id, ?age, "simulation cache hit");
                    return Ok(entry.serve(false, now));
                }
                if freshness == Freshness::AllowStale {
                    let served = entry.serve(true, now);
                    if !shared.flights.contains_key(&key) {
                        self.start_flight(&mut shared, key.clone(), compute)?;
                    }
                    tracing::debug!(plan = %key.plan_id, ?age, "serving stale simulation");
                    return Ok(served);
                }
            }

            match shared.flights.get(&key) {
                Some(flight) => {
                    tracing::debug!(plan = %key.plan_id, "joining in-flight simulation");
                    Arc::clone(flight)
                }
                None => {
                    tracing::debug!(plan = %key.plan_id, "simulation cache miss");
                    self.start_flight(&mut shared, key, compute)?
                }
            }
        };

        let computed = flight.wait(self.config.wait_timeout())?;
        Ok(computed.serve(false, Instant::now()))
    }

    fn start_flight<F>(
        &self,
        shared: &mut Shared,
        key: SimulationKey,
        compute: F,
    ) -> Result<Arc<Flight>, CacheError>
    where
        F: FnOnce() -> Result<SimulationResult, SimulationError> + Send + 'static,
    {
        let flight = Arc::new(Flight::default());
        let generation = shared.generation(&key.plan_id);
        let max_entries = self.config.max_entries;

        let state = Arc::clone(&self.shared);
        let mine = Arc::clone(&flight);
        let flight_key = key.clone();
        std::thread::Builder::new()
            .name("planlab-cache-flight".into())
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(compute)) {
                    Ok(Ok(result)) => Ok(Computed {
                        result,
                        computed_at: Utc::now(),
                        finished: Instant::now(),
                    }),
                    Ok(Err(e)) => Err(CacheError::Simulation(e)),
                    Err(_) => Err(CacheError::FlightFailed("simulation panicked".into())),
                };

                {
                    let mut shared = state.lock();
                    if shared
                        .flights
                        .get(&flight_key)
                        .is_some_and(|f| Arc::ptr_eq(f, &mine))
                    {
                        shared.flights.remove(&flight_key);
                    }
                    match &outcome {
                        Ok(computed) if shared.generation(&flight_key.plan_id) == generation => {
                            shared.insert(flight_key.clone(), computed.clone(), max_entries);
                        }
                        Ok(_) => {
                            tracing::debug!(plan = %flight_key.plan_id, "plan invalidated mid-flight; result not cached");
                        }
                        Err(e) => {
                            tracing::warn!(plan = %flight_key.plan_id, error = %e, "simulation flight failed");
                        }
                    }
                }
                mine.complete(outcome);
            })
            .map_err(|e| CacheError::FlightFailed(format!("spawn flight thread: {e}")))?;

        shared.flights.insert(key, Arc::clone(&flight));
        Ok(flight)
    }

    /// Drop every entry for a plan and detach its in-flight computations.
    pub fn invalidate_plan(&self, plan_id: &PlanId) {
        let mut shared = self.shared.lock();
        *shared.generations.entry(plan_id.clone()).or_insert(0) += 1;
        shared.entries.retain(|k, _| &k.plan_id != plan_id);
        shared.flights.retain(|k, _| &k.plan_id != plan_id);
        tracing::debug!(plan = %plan_id, "simulation cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.shared.lock().flights.len()
    }

    pub fn clear(&self) {
        self.shared.lock().entries.clear();
    }
}

impl std::fmt::Debug for SimulationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("SimulationCache")
            .field("config", &self.config)
            .field("entries", &shared.entries.len())
            .field("in_flight", &shared.flights.len())
            .finish()
    }
}
