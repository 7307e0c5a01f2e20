//! Geometric Brownian motion Monte Carlo over monthly steps.
//!
//! Each path evolves `V_{t+1} = V_t · exp((μ − σ²/2)·dt + σ·√dt·Z)` from its
//! own seeded stream. Paths fan out over rayon and are collected in path-index
//! order, so the summary is bit-for-bit identical for any thread count.

use std::sync::Arc;

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use super::stats::{self, PercentileLadder};
use super::{SimulationError, SimulationRequest, SimulationResult, STEPS_PER_YEAR};
use crate::config::SimulationConfig;
use crate::domain::InvestmentPlan;
use crate::rng::SeedHierarchy;
use crate::validation::ValidatedPlan;

/// Drift and volatility of the return process (annualized).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GbmParams {
    pub expected_return: f64,
    pub volatility: f64,
}

impl GbmParams {
    pub fn from_plan(plan: &InvestmentPlan) -> Self {
        Self {
            expected_return: plan.expected_return,
            volatility: plan.volatility,
        }
    }

    fn is_simulatable(&self) -> bool {
        self.expected_return.is_finite() && self.volatility.is_finite() && self.volatility >= 0.0
    }
}

/// Final value of a single path.
pub fn simulate_path(
    params: GbmParams,
    amount: f64,
    steps: u32,
    request_seed: u64,
    path: u64,
) -> f64 {
    let dt = 1.0 / STEPS_PER_YEAR as f64;
    let drift = (params.expected_return - 0.5 * params.volatility * params.volatility) * dt;
    let diffusion = params.volatility * dt.sqrt();

    let mut rng = SeedHierarchy::rng_for_path(request_seed, path);
    let mut value = amount;
    for _ in 0..steps {
        let z: f64 = rng.sample(StandardNormal);
        value *= (drift + diffusion * z).exp();
    }
    value
}

#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    config: SimulationConfig,
    seeds: SeedHierarchy,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl MonteCarloSimulator {
    /// Build a simulator. A non-zero `worker_threads` gets a private pool
    /// instead of the global rayon pool.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let pool = if config.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|i| format!("planlab-sim-{i}"))
                .build()
                .map_err(|e| SimulationError::WorkerPool(e.to_string()))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self {
            seeds: SeedHierarchy::new(config.master_seed),
            config,
            pool,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn request(
        &self,
        plan: &ValidatedPlan,
        amount: f64,
        horizon_years: u32,
        num_paths: usize,
    ) -> SimulationRequest {
        SimulationRequest::new(plan.id.clone(), amount, horizon_years, num_paths, &self.seeds)
    }

    /// Simulate a validated plan.
    pub fn simulate(
        &self,
        plan: &ValidatedPlan,
        amount: f64,
        horizon_years: u32,
        num_paths: usize,
    ) -> Result<SimulationResult, SimulationError> {
        let request = self.request(plan, amount, horizon_years, num_paths);
        self.run(&request, GbmParams::from_plan(plan))
    }

    /// Run a prepared request against explicit process parameters.
    pub fn run(
        &self,
        request: &SimulationRequest,
        params: GbmParams,
    ) -> Result<SimulationResult, SimulationError> {
        tracing::debug!(
            plan = %request.plan_id,
            paths = request.num_paths,
            horizon_years = request.horizon_years,
            seed = request.seed,
            "starting Monte Carlo simulation"
        );
        let final_values = self.final_values(request, params)?;
        let threshold = self
            .config
            .success
            .threshold(request.investment_amount, request.horizon_years);
        let result = summarize(request, final_values, threshold);
        tracing::debug!(
            plan = %request.plan_id,
            mean = result.mean_final_value,
            success_probability = result.success_probability,
            var_95 = result.value_at_risk_95,
            "simulation complete"
        );
        Ok(result)
    }

    /// Final value of every path, indexed by path number.
    pub fn final_values(
        &self,
        request: &SimulationRequest,
        params: GbmParams,
    ) -> Result<Vec<f64>, SimulationError> {
        self.check(request, params)?;

        let amount = request.investment_amount;
        let steps = request.steps().ok_or(SimulationError::InvalidHorizon {
            horizon_years: request.horizon_years,
        })?;
        let seed = request.seed;
        let num_paths = request.num_paths;
        let job = move || -> Vec<f64> {
            (0..num_paths)
                .into_par_iter()
                .map(|i| simulate_path(params, amount, steps, seed, i as u64))
                .collect()
        };

        Ok(match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        })
    }

    fn check(&self, request: &SimulationRequest, params: GbmParams) -> Result<(), SimulationError> {
        if request.num_paths < self.config.min_paths {
            return Err(SimulationError::InsufficientPaths {
                requested: request.num_paths,
                minimum: self.config.min_paths,
            });
        }
        if !params.is_simulatable() {
            return Err(SimulationError::NonFinitePlanParameters {
                expected_return: params.expected_return,
                volatility: params.volatility,
            });
        }
        if !(request.investment_amount.is_finite() && request.investment_amount > 0.0) {
            return Err(SimulationError::InvalidAmount {
                amount: request.investment_amount,
            });
        }
        if request.horizon_years == 0 || request.steps().is_none() {
            return Err(SimulationError::InvalidHorizon {
                horizon_years: request.horizon_years,
            });
        }
        Ok(())
    }
}

/// Aggregate after the join: mean in path order, percentiles from a sorted copy.
fn summarize(
    request: &SimulationRequest,
    mut values: Vec<f64>,
    threshold: f64,
) -> SimulationResult {
    let n = values.len();
    let mean_final_value = stats::mean(&values);
    let successes = values.iter().filter(|&&v| v >= threshold).count();

    values.sort_by(|a, b| a.total_cmp(b));
    let percentiles = PercentileLadder::from_sorted(&values);

    SimulationResult {
        plan_id: request.plan_id.clone(),
        investment_amount: request.investment_amount,
        horizon_years: request.horizon_years,
        num_paths: n,
        seed: request.seed,
        mean_final_value,
        median_final_value: percentiles.p50,
        min_final_value: values.first().copied().unwrap_or(0.0),
        max_final_value: values.last().copied().unwrap_or(0.0),
        success_probability: if n == 0 { 0.0 } else { successes as f64 / n as f64 },
        success_threshold: threshold,
        value_at_risk_95: request.investment_amount - percentiles.p5,
        percentiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuccessCriterion;
    use crate::domain::PlanId;

    fn request(paths: usize, amount: f64, horizon: u32) -> SimulationRequest {
        SimulationRequest::new(
            PlanId::new("mc-test"),
            amount,
            horizon,
            paths,
            &SeedHierarchy::new(0),
        )
    }

    fn params() -> GbmParams {
        GbmParams {
            expected_return: 0.06,
            volatility: 0.12,
        }
    }

    #[test]
    fn zero_volatility_compounds_continuously() {
        let v = simulate_path(
            GbmParams {
                expected_return: 0.05,
                volatility: 0.0,
            },
            1_000.0,
            5 * STEPS_PER_YEAR,
            1,
            0,
        );
        assert!((v - 1_000.0 * (0.05_f64 * 5.0).exp()).abs() < 1e-6);
    }

    #[test]
    fn identical_requests_identical_results() {
        let sim = MonteCarloSimulator::new(SimulationConfig::default()).unwrap();
        let req = request(1000, 5_000.0, 5);
        let a = sim.run(&req, params()).unwrap();
        let b = sim.run(&req, params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let single = MonteCarloSimulator::new(SimulationConfig {
            worker_threads: 1,
            ..SimulationConfig::default()
        })
        .unwrap();
        let many = MonteCarloSimulator::new(SimulationConfig {
            worker_threads: 4,
            ..SimulationConfig::default()
        })
        .unwrap();
        let req = request(1500, 10_000.0, 3);
        assert_eq!(
            single.run(&req, params()).unwrap(),
            many.run(&req, params()).unwrap()
        );
    }

    #[test]
    fn rejects_too_few_paths() {
        let sim = MonteCarloSimulator::new(SimulationConfig::default()).unwrap();
        let err = sim.run(&request(999, 5_000.0, 5), params()).unwrap_err();
        assert_eq!(
            err,
            SimulationError::InsufficientPaths {
                requested: 999,
                minimum: 1000
            }
        );
    }

    #[test]
    fn rejects_non_finite_or_negative_volatility() {
        let sim = MonteCarloSimulator::new(SimulationConfig::default()).unwrap();
        let req = request(1000, 5_000.0, 5);
        for bad in [
            GbmParams { expected_return: f64::NAN, volatility: 0.1 },
            GbmParams { expected_return: 0.05, volatility: f64::INFINITY },
            GbmParams { expected_return: 0.05, volatility: -0.1 },
        ] {
            assert!(matches!(
                sim.run(&req, bad),
                Err(SimulationError::NonFinitePlanParameters { .. })
            ));
        }
    }

    #[test]
    fn rejects_bad_amount_and_horizon() {
        let sim = MonteCarloSimulator::new(SimulationConfig::default()).unwrap();
        assert!(matches!(
            sim.run(&request(1000, 0.0, 5), params()),
            Err(SimulationError::InvalidAmount { .. })
        ));
        assert!(matches!(
            sim.run(&request(1000, 1_000.0, 0), params()),
            Err(SimulationError::InvalidHorizon { .. })
        ));
        assert!(matches!(
            sim.run(&request(1000, 1_000.0, u32::MAX), params()),
            Err(SimulationError::InvalidHorizon { horizon_years: u32::MAX })
        ));
    }

    #[test]
    fn summary_is_internally_consistent() {
        let sim = MonteCarloSimulator::new(SimulationConfig::default()).unwrap();
        let r = sim.run(&request(2000, 5_000.0, 5), params()).unwrap();
        assert_eq!(r.num_paths, 2000);
        assert!(r.min_final_value <= r.percentiles.p5);
        assert!(r.percentiles.p95 <= r.max_final_value);
        assert_eq!(r.median_final_value, r.percentiles.p50);
        assert!((r.value_at_risk_95 - (5_000.0 - r.percentiles.p5)).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&r.success_probability));
        // E[V_T] = V_0·exp(μT) for GBM; 2000 paths land well within 3%.
        let expected_mean = 5_000.0 * (0.06_f64 * 5.0).exp();
        assert!((r.mean_final_value / expected_mean - 1.0).abs() < 0.03);
    }

    #[test]
    fn target_return_is_harder_than_principal() {
        let principal = MonteCarloSimulator::new(SimulationConfig::default()).unwrap();
        let target = MonteCarloSimulator::new(SimulationConfig {
            success: SuccessCriterion::TargetReturn { annual_rate: 0.05 },
            ..SimulationConfig::default()
        })
        .unwrap();
        let req = request(1000, 5_000.0, 5);
        let p = principal.run(&req, params()).unwrap();
        let t = target.run(&req, params()).unwrap();
        assert!(t.success_threshold > p.success_threshold);
        assert!(t.success_probability <= p.success_probability);
    }
}
