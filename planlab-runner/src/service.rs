//! `PlanService`, the engine's outward face.
//!
//! Owns the validator, simulator, cache, scheduler and recommender, and wires
//! them to the plan store and market-data collaborators. Plan reads for
//! simulation and recommendation take the plan's read lock; the rebalancer
//! holds the write lock while it swaps the allocation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use planlab_core::{
    AllocationValidator, ConfigError, EngineConfig, InvestmentPlan, MonteCarloSimulator, PlanId,
    RiskLevel, SimulationError, SimulationKey, SimulationResult, ValidatedPlan, ValidationError,
};

use crate::advice::{advise, PlanAdvice};
use crate::cache::{CacheError, CachedResult, Freshness, SimulationCache};
use crate::locks::PlanLocks;
use crate::market::MarketData;
use crate::rebalance::{CycleOutcome, RebalanceDecision, RebalanceError, RebalancingScheduler};
use crate::recommend::{Recommendation, RecommendationEngine};
use crate::store::{PlanStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("plan {plan_id} failed validation: {}", summarize(.errors))]
    InvalidPlan {
        plan_id: PlanId,
        errors: Vec<ValidationError>,
    },

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Cache(CacheError),

    #[error(transparent)]
    Rebalance(#[from] RebalanceError),
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Simulation(e) => ServiceError::Simulation(e),
            other => ServiceError::Cache(other),
        }
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct PlanService {
    config: EngineConfig,
    validator: AllocationValidator,
    simulator: Arc<MonteCarloSimulator>,
    cache: SimulationCache,
    scheduler: RebalancingScheduler,
    recommender: RecommendationEngine,
    store: Arc<dyn PlanStore>,
    locks: Arc<PlanLocks>,
}

impl PlanService {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PlanStore>,
        market: Arc<dyn MarketData>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let validator = AllocationValidator::from_config(&config);
        let simulator = Arc::new(MonteCarloSimulator::new(config.simulation.clone())?);
        let locks = Arc::new(PlanLocks::new());
        let scheduler = RebalancingScheduler::new(
            config.rebalance.clone(),
            Arc::clone(&store),
            market,
            Arc::clone(&locks),
        );
        let recommender = RecommendationEngine::new(config.recommend.clone(), validator.clone());

        tracing::info!(
            min_paths = config.simulation.min_paths,
            ttl_secs = config.cache.ttl_secs,
            drift_threshold = config.rebalance.drift_threshold,
            "plan service ready"
        );

        Ok(Self {
            cache: SimulationCache::new(config.cache.clone()),
            config,
            validator,
            simulator,
            scheduler,
            recommender,
            store,
            locks,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &SimulationCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &RebalancingScheduler {
        &self.scheduler
    }

    pub fn locks(&self) -> &PlanLocks {
        &self.locks
    }

    // ─── Validation ─────────────────────────────────────────────────

    pub fn load_plan(&self, plan_id: &PlanId) -> Result<InvestmentPlan, ServiceError> {
        Ok(self.store.load_plan(plan_id)?)
    }

    pub fn list_plans(&self) -> Result<Vec<InvestmentPlan>, ServiceError> {
        Ok(self.store.list_plans()?)
    }

    pub fn validate_plan(
        &self,
        plan: &InvestmentPlan,
    ) -> Result<ValidatedPlan, Vec<ValidationError>> {
        self.validator.validate(plan)
    }

    /// Load a plan under its read lock and validate it.
    pub fn load_validated(&self, plan_id: &PlanId) -> Result<ValidatedPlan, ServiceError> {
        let plan = {
            let lock = self.locks.handle(plan_id);
            let _guard = lock.read();
            self.store.load_plan(plan_id)?
        };
        self.validator
            .validate(&plan)
            .map_err(|errors| ServiceError::InvalidPlan {
                plan_id: plan_id.clone(),
                errors,
            })
    }

    // ─── Simulation ─────────────────────────────────────────────────

    pub fn simulate(
        &self,
        plan_id: &PlanId,
        amount: f64,
        horizon_years: u32,
        num_paths: usize,
    ) -> Result<SimulationResult, ServiceError> {
        self.simulate_with(plan_id, amount, horizon_years, num_paths, Freshness::Fresh)
            .map(|cached| cached.result)
    }

    pub fn simulate_with(
        &self,
        plan_id: &PlanId,
        amount: f64,
        horizon_years: u32,
        num_paths: usize,
        freshness: Freshness,
    ) -> Result<CachedResult, ServiceError> {
        let plan = self.load_validated(plan_id)?;
        self.simulate_validated(plan, amount, horizon_years, num_paths, freshness)
    }

    fn simulate_validated(
        &self,
        plan: ValidatedPlan,
        amount: f64,
        horizon_years: u32,
        num_paths: usize,
        freshness: Freshness,
    ) -> Result<CachedResult, ServiceError> {
        let key = SimulationKey::new(plan.id.clone(), amount, horizon_years, num_paths);
        let simulator = Arc::clone(&self.simulator);
        let cached = self.cache.get_or_compute(key, freshness, move || {
            simulator.simulate(&plan, amount, horizon_years, num_paths)
        })?;
        Ok(cached)
    }

    /// For the plan-authoring collaborator after it edits a plan's parameters.
    pub fn invalidate_plan(&self, plan_id: &PlanId) {
        self.cache.invalidate_plan(plan_id);
    }

    // ─── Rebalancing ────────────────────────────────────────────────

    pub fn check_and_rebalance(
        &self,
        plan_id: &PlanId,
    ) -> Result<RebalanceDecision, RebalanceError> {
        self.scheduler.check_and_rebalance(plan_id)
    }

    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<Vec<CycleOutcome>, ServiceError> {
        Ok(self.scheduler.run_cycle(now)?)
    }

    // ─── Recommendation ─────────────────────────────────────────────

    /// Ranked plans for a profile. Each candidate is simulated over its own
    /// recommended horizon through the cache, one candidate at a time: a
    /// rayon worker must never block on a cache flight that needs the pool.
    pub fn recommend(
        &self,
        profile: RiskLevel,
        amount: f64,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        let catalog = self.locked_catalog()?;
        let num_paths = self.recommender.config().num_paths;
        let recommendations = self.recommender.recommend_with(&catalog, profile, amount, |plan| {
            self.simulate_validated(
                plan.clone(),
                amount,
                plan.horizon_years,
                num_paths,
                Freshness::Fresh,
            )
            .map(|cached| cached.result)
        })?;
        tracing::info!(%profile, amount, results = recommendations.len(), "recommendation complete");
        Ok(recommendations)
    }

    /// Every listed plan, each re-read under its read lock. Plans removed
    /// since the listing are skipped.
    fn locked_catalog(&self) -> Result<Vec<InvestmentPlan>, ServiceError> {
        let mut catalog = Vec::new();
        for listed in self.store.list_plans()? {
            let lock = self.locks.handle(&listed.id);
            let _guard = lock.read();
            match self.store.load_plan(&listed.id) {
                Ok(plan) => catalog.push(plan),
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(catalog)
    }

    pub fn advise(&self, plan_id: &PlanId) -> Result<PlanAdvice, ServiceError> {
        Ok(advise(&self.load_plan(plan_id)?))
    }
}

impl std::fmt::Debug for PlanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanService")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
