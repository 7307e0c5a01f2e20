//! Drift-based rebalancing.
//!
//! Each check fetches observed market weights (bounded retries with
//! exponential backoff), measures per-asset drift against the plan's target
//! allocation, and resets the allocation when the largest drift exceeds the
//! threshold. The decide-and-save step runs under the plan's write lock so
//! readers never see a half-applied allocation. Anything short of a complete
//! market observation aborts the check with nothing written.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use planlab_core::config::RebalanceConfig;
use planlab_core::{AssetAllocation, InvestmentPlan, PlanId};

use crate::locks::PlanLocks;
use crate::market::{check_complete, MarketData, PriceFeedError};
use crate::store::{PlanStore, StoreError};
use crate::workflow::{RebalanceStatus, WorkflowError};

#[derive(Debug, Clone, Error)]
pub enum RebalanceError {
    #[error("price feed unavailable for plan {plan_id} after {attempts} attempt(s): {source}")]
    PriceFeedUnavailable {
        plan_id: PlanId,
        attempts: u32,
        #[source]
        source: PriceFeedError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceDecision {
    pub plan_id: PlanId,
    /// `|current − target|` per asset, over the union of both allocations.
    pub drifts: BTreeMap<String, f64>,
    pub max_drift: f64,
    pub should_rebalance: bool,
    /// The plan's configured weights, present only when rebalancing.
    pub target_allocation: Option<AssetAllocation>,
    pub status: RebalanceStatus,
    pub evaluated_at: DateTime<Utc>,
}

/// Absolute drift per asset. Assets missing on one side count as weight 0.
pub fn measure_drift(target: &AssetAllocation, current: &AssetAllocation) -> BTreeMap<String, f64> {
    let assets: BTreeSet<&String> = target.keys().chain(current.keys()).collect();
    assets
        .into_iter()
        .map(|asset| {
            let t = target.get(asset).copied().unwrap_or(0.0);
            let c = current.get(asset).copied().unwrap_or(0.0);
            (asset.clone(), (c - t).abs())
        })
        .collect()
}

/// Pure drift decision. The returned status is still `Pending`; the
/// scheduler resolves it once the outcome is persisted.
pub fn decide(
    plan: &InvestmentPlan,
    current: &AssetAllocation,
    threshold: f64,
    evaluated_at: DateTime<Utc>,
) -> RebalanceDecision {
    let drifts = measure_drift(&plan.asset_allocation, current);
    let max_drift = drifts.values().copied().fold(0.0, f64::max);
    let should_rebalance = max_drift > threshold;
    RebalanceDecision {
        plan_id: plan.id.clone(),
        drifts,
        max_drift,
        should_rebalance,
        target_allocation: should_rebalance.then(|| plan.asset_allocation.clone()),
        status: RebalanceStatus::Pending,
        evaluated_at,
    }
}

// ─── Ledger ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub last_checked: DateTime<Utc>,
    pub status: RebalanceStatus,
    /// Market observation the last approved rebalance corrected. Seeing it
    /// again means the holdings already sit at target.
    pub corrected: Option<AssetAllocation>,
}

/// Result of one plan's check within a cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    pub plan_id: PlanId,
    pub result: Result<RebalanceDecision, RebalanceError>,
}

impl CycleOutcome {
    pub fn status(&self) -> RebalanceStatus {
        match &self.result {
            Ok(decision) => decision.status,
            Err(_) => RebalanceStatus::Deferred,
        }
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────

pub struct RebalancingScheduler {
    config: RebalanceConfig,
    store: Arc<dyn PlanStore>,
    market: Arc<dyn MarketData>,
    locks: Arc<PlanLocks>,
    ledger: Mutex<HashMap<PlanId, LedgerEntry>>,
}

impl RebalancingScheduler {
    pub fn new(
        config: RebalanceConfig,
        store: Arc<dyn PlanStore>,
        market: Arc<dyn MarketData>,
        locks: Arc<PlanLocks>,
    ) -> Self {
        Self {
            config,
            store,
            market,
            locks,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    pub fn ledger_entry(&self, plan_id: &PlanId) -> Option<LedgerEntry> {
        self.ledger.lock().get(plan_id).cloned()
    }

    pub fn check_and_rebalance(
        &self,
        plan_id: &PlanId,
    ) -> Result<RebalanceDecision, RebalanceError> {
        self.check_at(plan_id, Utc::now())
    }

    /// Run one check as of `now`.
    ///
    /// The feed is polled outside the plan's lock. Everything that reads or
    /// writes the ledger or the stored allocation happens under the write
    /// lock, so overlapping checks of one plan see each other's outcome.
    pub fn check_at(
        &self,
        plan_id: &PlanId,
        now: DateTime<Utc>,
    ) -> Result<RebalanceDecision, RebalanceError> {
        let lock = self.locks.handle(plan_id);
        let snapshot = {
            let _guard = lock.read();
            self.store.load_plan(plan_id)?
        };
        let fetched = self.fetch_weights(&snapshot);

        let _guard = lock.write();
        let previous = self.ledger_entry(plan_id);
        let mut status = RebalanceStatus::Pending;
        if let Some(entry) = &previous {
            if entry.status == RebalanceStatus::Deferred {
                status = RebalanceStatus::Deferred.transition(RebalanceStatus::Pending)?;
                tracing::info!(plan = %plan_id, "reopening deferred rebalance");
            }
        }
        let corrected = previous.and_then(|e| e.corrected);

        let observed = match fetched {
            Ok(weights) => weights,
            Err(e) => {
                self.defer(plan_id, now, status)?;
                tracing::warn!(plan = %plan_id, error = %e, "rebalance deferred to next cycle");
                return Err(e);
            }
        };

        let plan = self.store.load_plan(plan_id)?;
        let effective = match &corrected {
            Some(seen) if allocations_match(seen, &observed) => plan.asset_allocation.clone(),
            _ => observed.clone(),
        };

        let mut decision = decide(&plan, &effective, self.config.drift_threshold, now);
        match decision.target_allocation.clone() {
            Some(target) => {
                if let Err(e) = self.store.save_allocation(plan_id, target) {
                    self.defer(plan_id, now, status)?;
                    tracing::warn!(plan = %plan_id, error = %e, "allocation write failed; rebalance deferred");
                    return Err(e.into());
                }
                decision.status = status.transition(RebalanceStatus::Approved)?;
                self.record(plan_id, now, decision.status, Some(observed));
                tracing::info!(
                    plan = %plan_id,
                    max_drift = decision.max_drift,
                    threshold = self.config.drift_threshold,
                    "rebalance applied; allocation reset to target"
                );
            }
            None => {
                decision.status = status.transition(RebalanceStatus::Rejected)?;
                self.record(plan_id, now, decision.status, corrected);
                tracing::debug!(plan = %plan_id, max_drift = decision.max_drift, "drift within threshold");
            }
        }
        Ok(decision)
    }

    /// Active plans whose rebalance period has elapsed since their last
    /// check. Never-checked and deferred plans are always due.
    pub fn due_plans(&self, now: DateTime<Utc>) -> Result<Vec<PlanId>, StoreError> {
        let plans = self.store.list_plans()?;
        let ledger = self.ledger.lock();
        Ok(plans
            .into_iter()
            .filter(|plan| plan.is_active)
            .filter(|plan| match ledger.get(&plan.id) {
                None => true,
                Some(entry) if entry.status == RebalanceStatus::Deferred => true,
                Some(entry) => entry
                    .last_checked
                    .checked_add_months(Months::new(plan.rebalance_frequency.months()))
                    .map_or(true, |next| next <= now),
            })
            .map(|plan| plan.id)
            .collect())
    }

    /// Check every due plan concurrently.
    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<Vec<CycleOutcome>, StoreError> {
        let due = self.due_plans(now)?;
        tracing::info!(due = due.len(), "starting rebalance cycle");

        let outcomes: Vec<CycleOutcome> = due
            .par_iter()
            .map(|plan_id| CycleOutcome {
                plan_id: plan_id.clone(),
                result: self.check_at(plan_id, now),
            })
            .collect();

        let approved = outcomes
            .iter()
            .filter(|o| o.status() == RebalanceStatus::Approved)
            .count();
        let deferred = outcomes
            .iter()
            .filter(|o| o.status() == RebalanceStatus::Deferred)
            .count();
        tracing::info!(checked = outcomes.len(), approved, deferred, "rebalance cycle complete");
        Ok(outcomes)
    }

    /// Fetch a complete observation, retrying with backoff.
    fn fetch_weights(&self, plan: &InvestmentPlan) -> Result<AssetAllocation, RebalanceError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = PriceFeedError::NoData(plan.id.clone());

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff(attempt);
                tracing::debug!(plan = %plan.id, attempt = attempt + 1, ?delay, "retrying price feed");
                std::thread::sleep(delay);
            }

            let observed = self
                .market
                .current_weights(plan)
                .and_then(|w| check_complete(plan, &w, self.config.weight_tolerance).map(|()| w));
            match observed {
                Ok(weights) => return Ok(weights),
                Err(e) => {
                    tracing::warn!(plan = %plan.id, attempt = attempt + 1, error = %e, "price feed unavailable");
                    last_error = e;
                }
            }
        }

        Err(RebalanceError::PriceFeedUnavailable {
            plan_id: plan.id.clone(),
            attempts,
            source: last_error,
        })
    }

    /// Mark the plan deferred. The last corrected observation is kept.
    fn defer(
        &self,
        plan_id: &PlanId,
        now: DateTime<Utc>,
        status: RebalanceStatus,
    ) -> Result<(), WorkflowError> {
        let deferred = status.transition(RebalanceStatus::Deferred)?;
        let mut ledger = self.ledger.lock();
        let corrected = ledger.get(plan_id).and_then(|e| e.corrected.clone());
        ledger.insert(
            plan_id.clone(),
            LedgerEntry {
                last_checked: now,
                status: deferred,
                corrected,
            },
        );
        Ok(())
    }

    fn record(
        &self,
        plan_id: &PlanId,
        now: DateTime<Utc>,
        status: RebalanceStatus,
        corrected: Option<AssetAllocation>,
    ) {
        self.ledger.lock().insert(
            plan_id.clone(),
            LedgerEntry {
                last_checked: now,
                status,
                corrected,
            },
        );
    }
}

impl std::fmt::Debug for RebalancingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebalancingScheduler")
            .field("config", &self.config)
            .field("tracked_plans", &self.ledger.lock().len())
            .finish()
    }
}

fn allocations_match(a: &AssetAllocation, b: &AssetAllocation) -> bool {
    const EPS: f64 = 1e-12;
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, wa), (kb, wb))| ka == kb && (wa - wb).abs() <= EPS)
}
