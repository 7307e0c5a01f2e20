//! Plan recommendation for an investor risk profile.
//!
//! Candidates are active, validated plans whose investment range contains
//! the amount and whose risk level matches the profile. Adjacent levels are
//! used only when the catalog has no valid plan at the exact level. Each
//! candidate is scored on its own simulation:
//!
//! `score = success_probability − λ · VaR95 / amount`
//!
//! Ranking: score descending, then volatility ascending, then plan id.

use std::cmp::Ordering;

use serde::Serialize;

use planlab_core::config::RecommendConfig;
use planlab_core::{
    AllocationValidator, InvestmentPlan, RiskLevel, SimulationResult, ValidatedPlan,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub plan: ValidatedPlan,
    pub score: f64,
    pub simulation: SimulationResult,
}

#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    config: RecommendConfig,
    validator: AllocationValidator,
}

impl RecommendationEngine {
    pub fn new(config: RecommendConfig, validator: AllocationValidator) -> Self {
        Self { config, validator }
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    /// Plans eligible for `(profile, amount)`. Plans failing validation never
    /// appear, not even as adjacency fallbacks.
    pub fn candidates(
        &self,
        catalog: &[InvestmentPlan],
        profile: RiskLevel,
        amount: f64,
    ) -> Vec<ValidatedPlan> {
        if !(amount.is_finite() && amount > 0.0) {
            return Vec::new();
        }

        let valid: Vec<ValidatedPlan> = catalog
            .iter()
            .filter(|plan| plan.is_active)
            .filter_map(|plan| self.validator.validate(plan).ok())
            .collect();

        let levels: &[RiskLevel] = if valid.iter().any(|p| p.risk_level == profile) {
            std::slice::from_ref(&profile)
        } else {
            tracing::debug!(%profile, "no plan at exact risk level; using adjacent levels");
            self.config.adjacency.neighbors(profile)
        };

        valid
            .into_iter()
            .filter(|plan| levels.contains(&plan.risk_level) && plan.accepts_amount(amount))
            .collect()
    }

    pub fn score(&self, simulation: &SimulationResult) -> f64 {
        simulation.success_probability
            - self.config.risk_aversion * simulation.value_at_risk_95 / simulation.investment_amount
    }

    /// Score and order simulated candidates.
    pub fn rank(&self, scored: Vec<(ValidatedPlan, SimulationResult)>) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = scored
            .into_iter()
            .map(|(plan, simulation)| Recommendation {
                score: self.score(&simulation),
                plan,
                simulation,
            })
            .collect();
        recommendations.sort_by(compare);
        recommendations
    }

    /// Full pipeline with a caller-supplied simulation for each candidate.
    pub fn recommend_with<F, E>(
        &self,
        catalog: &[InvestmentPlan],
        profile: RiskLevel,
        amount: f64,
        mut simulate: F,
    ) -> Result<Vec<Recommendation>, E>
    where
        F: FnMut(&ValidatedPlan) -> Result<SimulationResult, E>,
    {
        let candidates = self.candidates(catalog, profile, amount);
        tracing::debug!(%profile, amount, candidates = candidates.len(), "scoring candidates");

        let mut scored = Vec::with_capacity(candidates.len());
        for plan in candidates {
            let simulation = simulate(&plan)?;
            scored.push((plan, simulation));
        }
        Ok(self.rank(scored))
    }
}

fn compare(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.plan.volatility.total_cmp(&b.plan.volatility))
        .then_with(|| a.plan.id.cmp(&b.plan.id))
}
