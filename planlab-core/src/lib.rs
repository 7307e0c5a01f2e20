//! PlanLab Core — investment plan model, allocation validation, Monte Carlo
//! performance simulation.
//!
//! This crate is pure computation:
//! - Domain types (plans, risk levels, allocations)
//! - Engine configuration (risk-return bands, simulation and scheduling knobs)
//! - Allocation validator that gates plans before simulation
//! - Deterministic seed hierarchy
//! - GBM Monte Carlo simulator with order-independent aggregation

pub mod config;
pub mod domain;
pub mod rng;
pub mod simulation;
pub mod validation;

pub use config::{ConfigError, EngineConfig, SuccessCriterion};
pub use domain::{AssetAllocation, InvestmentPlan, PlanId, RebalanceFrequency, RiskLevel};
pub use simulation::{
    MonteCarloSimulator, PercentileLadder, SimulationError, SimulationKey, SimulationRequest,
    SimulationResult,
};
pub use validation::{AllocationValidator, ValidatedPlan, ValidationError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with the runner's worker threads are
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<InvestmentPlan>();
        require_sync::<InvestmentPlan>();
        require_send::<ValidatedPlan>();
        require_sync::<ValidatedPlan>();
        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();
        require_send::<MonteCarloSimulator>();
        require_sync::<MonteCarloSimulator>();
        require_send::<SimulationResult>();
        require_sync::<SimulationResult>();
        require_send::<SimulationError>();
        require_sync::<SimulationError>();
        require_send::<SimulationKey>();
        require_sync::<SimulationKey>();
        require_send::<AllocationValidator>();
        require_sync::<AllocationValidator>();
        require_send::<rng::SeedHierarchy>();
        require_sync::<rng::SeedHierarchy>();
    }

    /// Compile-time check: the simulator only accepts validated plans.
    #[allow(dead_code)]
    fn simulator_requires_validated_plan(
        sim: &MonteCarloSimulator,
        plan: &ValidatedPlan,
    ) -> Result<SimulationResult, SimulationError> {
        sim.simulate(plan, 1_000.0, 1, 1000)
    }
}
