//! Monte Carlo performance simulation: request/result types and errors.

pub mod monte_carlo;
pub mod stats;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PlanId;
use crate::rng::SeedHierarchy;

pub use monte_carlo::{simulate_path, GbmParams, MonteCarloSimulator};
pub use stats::PercentileLadder;

/// Months per simulated year; each step is `dt = 1/12`.
pub const STEPS_PER_YEAR: u32 = 12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("{requested} paths requested, at least {minimum} required")]
    InsufficientPaths { requested: usize, minimum: usize },

    #[error("plan parameters are not simulatable: expected_return {expected_return}, volatility {volatility}")]
    NonFinitePlanParameters { expected_return: f64, volatility: f64 },

    #[error("investment amount must be finite and positive (got {amount})")]
    InvalidAmount { amount: f64 },

    #[error("simulation horizon of {horizon_years} years is out of range")]
    InvalidHorizon { horizon_years: u32 },

    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

/// Identity of a simulation for caching and deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationKey {
    pub plan_id: PlanId,
    amount_bits: u64,
    pub horizon_years: u32,
    pub num_paths: usize,
}

impl SimulationKey {
    pub fn new(plan_id: PlanId, amount: f64, horizon_years: u32, num_paths: usize) -> Self {
        Self {
            plan_id,
            amount_bits: amount.to_bits(),
            horizon_years,
            num_paths,
        }
    }

    pub fn amount(&self) -> f64 {
        f64::from_bits(self.amount_bits)
    }
}

/// A fully specified simulation, seed included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub plan_id: PlanId,
    pub investment_amount: f64,
    pub horizon_years: u32,
    pub num_paths: usize,
    pub seed: u64,
}

impl SimulationRequest {
    pub fn new(
        plan_id: PlanId,
        investment_amount: f64,
        horizon_years: u32,
        num_paths: usize,
        seeds: &SeedHierarchy,
    ) -> Self {
        let seed = seeds.request_seed(&plan_id, investment_amount, horizon_years, num_paths);
        Self {
            plan_id,
            investment_amount,
            horizon_years,
            num_paths,
            seed,
        }
    }

    pub fn key(&self) -> SimulationKey {
        SimulationKey::new(
            self.plan_id.clone(),
            self.investment_amount,
            self.horizon_years,
            self.num_paths,
        )
    }

    /// Monthly steps over the horizon; `None` if the count overflows.
    pub fn steps(&self) -> Option<u32> {
        self.horizon_years.checked_mul(STEPS_PER_YEAR)
    }
}

/// Statistical summary of the final-value distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub plan_id: PlanId,
    pub investment_amount: f64,
    pub horizon_years: u32,
    pub num_paths: usize,
    pub seed: u64,
    pub mean_final_value: f64,
    pub median_final_value: f64,
    pub min_final_value: f64,
    pub max_final_value: f64,
    /// Fraction of paths ending at or above `success_threshold`.
    pub success_probability: f64,
    pub success_threshold: f64,
    /// Loss (amount − final value) at the 5th percentile of final values.
    /// Negative when even the 5th percentile path gained money.
    pub value_at_risk_95: f64,
    pub percentiles: PercentileLadder,
}
