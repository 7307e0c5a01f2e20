//! Plan persistence seam.
//!
//! The plan store is an external collaborator; the engine only needs to load
//! plans, list the catalog, and write back a rebalanced allocation.
//! `MemoryPlanStore` backs tests and the CLI.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use thiserror::Error;

use planlab_core::{AssetAllocation, InvestmentPlan, PlanId};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("investment plan {0} not found")]
    NotFound(PlanId),

    #[error("plan store unavailable: {0}")]
    Unavailable(String),
}

pub trait PlanStore: Send + Sync {
    fn load_plan(&self, id: &PlanId) -> Result<InvestmentPlan, StoreError>;

    /// Replace a plan's allocation in one step.
    fn save_allocation(&self, id: &PlanId, allocation: AssetAllocation) -> Result<(), StoreError>;

    /// Every plan in the catalog, active or not.
    fn list_plans(&self) -> Result<Vec<InvestmentPlan>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: RwLock<BTreeMap<PlanId, InvestmentPlan>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plans(plans: impl IntoIterator<Item = InvestmentPlan>) -> Self {
        let plans = plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            plans: RwLock::new(plans),
        }
    }

    /// Insert or replace a plan (the plan-authoring path).
    pub fn upsert(&self, plan: InvestmentPlan) {
        self.plans.write().insert(plan.id.clone(), plan);
    }

    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }
}

impl PlanStore for MemoryPlanStore {
    fn load_plan(&self, id: &PlanId) -> Result<InvestmentPlan, StoreError> {
        self.plans
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn save_allocation(&self, id: &PlanId, allocation: AssetAllocation) -> Result<(), StoreError> {
        let mut plans = self.plans.write();
        let plan = plans.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        plan.asset_allocation = allocation;
        Ok(())
    }

    fn list_plans(&self) -> Result<Vec<InvestmentPlan>, StoreError> {
        Ok(self.plans.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{RebalanceFrequency, RiskLevel};

    fn plan(id: &str) -> InvestmentPlan {
        InvestmentPlan {
            id: PlanId::new(id),
            name: format!("Plan {id}"),
            description: String::new(),
            risk_level: RiskLevel::Low,
            min_investment: 0.0,
            max_investment: 1e6,
            asset_allocation: [("bonds".to_string(), 1.0)].into_iter().collect(),
            expected_return: 0.03,
            volatility: 0.04,
            horizon_years: 3,
            rebalance_frequency: RebalanceFrequency::Quarterly,
            is_active: true,
        }
    }

    #[test]
    fn load_missing_plan() {
        let store = MemoryPlanStore::new();
        assert!(matches!(
            store.load_plan(&PlanId::new("nope")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn save_allocation_replaces_whole_map() {
        let store = MemoryPlanStore::from_plans([plan("a")]);
        let new_alloc: AssetAllocation = [("cash".to_string(), 0.5), ("stocks".to_string(), 0.5)]
            .into_iter()
            .collect();
        store.save_allocation(&PlanId::new("a"), new_alloc.clone()).unwrap();
        assert_eq!(store.load_plan(&PlanId::new("a")).unwrap().asset_allocation, new_alloc);
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = MemoryPlanStore::from_plans([plan("b"), plan("a")]);
        let ids: Vec<String> = store.list_plans().unwrap().into_iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }
}
