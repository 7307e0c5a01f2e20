//! Market-data seam: current observed weights of a plan's holdings.
//!
//! The provider is opaque to the engine. A response counts as usable only if
//! it covers every asset of the plan with finite, non-negative weights that
//! sum to one; anything else is treated as the feed being unavailable.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use thiserror::Error;

use planlab_core::{AssetAllocation, InvestmentPlan, PlanId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PriceFeedError {
    #[error("no market data for plan {0}")]
    NoData(PlanId),

    #[error("prices unavailable for assets: {}", .0.join(", "))]
    MissingAssets(Vec<String>),

    #[error("market weights sum to {total:.6}, expected 1.0")]
    BadTotal { total: f64 },

    #[error("non-finite or negative weight for asset '{0}'")]
    BadWeight(String),

    #[error("price feed unreachable: {0}")]
    Unreachable(String),
}

pub trait MarketData: Send + Sync {
    fn current_weights(&self, plan: &InvestmentPlan) -> Result<AssetAllocation, PriceFeedError>;
}

/// Reject observations that would lead to a partial rebalance.
pub fn check_complete(
    plan: &InvestmentPlan,
    weights: &AssetAllocation,
    tolerance: f64,
) -> Result<(), PriceFeedError> {
    let missing: Vec<String> = plan
        .asset_allocation
        .keys()
        .filter(|asset| !weights.contains_key(*asset))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PriceFeedError::MissingAssets(missing));
    }
    if let Some((asset, _)) = weights.iter().find(|(_, w)| !(w.is_finite() && **w >= 0.0)) {
        return Err(PriceFeedError::BadWeight(asset.clone()));
    }
    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > tolerance {
        return Err(PriceFeedError::BadTotal { total });
    }
    Ok(())
}

/// In-memory snapshot of observed weights per plan.
#[derive(Debug, Default)]
pub struct MemoryMarketData {
    weights: RwLock<BTreeMap<PlanId, AssetAllocation>>,
    halted: RwLock<BTreeSet<String>>,
}

impl MemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: impl IntoIterator<Item = (PlanId, AssetAllocation)>) -> Self {
        Self {
            weights: RwLock::new(snapshot.into_iter().collect()),
            halted: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn set_weights(&self, plan_id: PlanId, weights: AssetAllocation) {
        self.weights.write().insert(plan_id, weights);
    }

    /// Stop quoting an asset; plans holding it cannot be priced.
    pub fn halt(&self, asset: &str) {
        self.halted.write().insert(asset.to_string());
    }

    pub fn resume(&self, asset: &str) {
        self.halted.write().remove(asset);
    }
}

impl MarketData for MemoryMarketData {
    fn current_weights(&self, plan: &InvestmentPlan) -> Result<AssetAllocation, PriceFeedError> {
        let halted = self.halted.read();
        let weights = self
            .weights
            .read()
            .get(&plan.id)
            .cloned()
            .ok_or_else(|| PriceFeedError::NoData(plan.id.clone()))?;
        Ok(weights
            .into_iter()
            .filter(|(asset, _)| !halted.contains(asset))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{RebalanceFrequency, RiskLevel};

    fn alloc(pairs: &[(&str, f64)]) -> AssetAllocation {
        pairs.iter().map(|(a, w)| (a.to_string(), *w)).collect()
    }

    fn plan() -> InvestmentPlan {
        InvestmentPlan {
            id: PlanId::new("p"),
            name: "Plan".into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            min_investment: 0.0,
            max_investment: 1e6,
            asset_allocation: alloc(&[("bonds", 0.6), ("stocks", 0.4)]),
            expected_return: 0.03,
            volatility: 0.04,
            horizon_years: 3,
            rebalance_frequency: RebalanceFrequency::Quarterly,
            is_active: true,
        }
    }

    #[test]
    fn complete_observation_passes() {
        assert!(check_complete(&plan(), &alloc(&[("bonds", 0.55), ("stocks", 0.45)]), 1e-3).is_ok());
    }

    #[test]
    fn missing_asset_detected() {
        let err = check_complete(&plan(), &alloc(&[("bonds", 1.0)]), 1e-3).unwrap_err();
        assert_eq!(err, PriceFeedError::MissingAssets(vec!["stocks".into()]));
    }

    #[test]
    fn bad_total_detected() {
        let err = check_complete(&plan(), &alloc(&[("bonds", 0.5), ("stocks", 0.3)]), 1e-3).unwrap_err();
        assert!(matches!(err, PriceFeedError::BadTotal { .. }));
    }

    #[test]
    fn nan_weight_detected() {
        let err = check_complete(&plan(), &alloc(&[("bonds", f64::NAN), ("stocks", 0.4)]), 1e-3)
            .unwrap_err();
        assert_eq!(err, PriceFeedError::BadWeight("bonds".into()));
    }

    #[test]
    fn halted_asset_disappears_from_quotes() {
        let market = MemoryMarketData::new();
        market.set_weights(PlanId::new("p"), alloc(&[("bonds", 0.6), ("stocks", 0.4)]));
        market.halt("stocks");
        let quoted = market.current_weights(&plan()).unwrap();
        assert!(!quoted.contains_key("stocks"));
        market.resume("stocks");
        assert!(market.current_weights(&plan()).unwrap().contains_key("stocks"));
    }
}
