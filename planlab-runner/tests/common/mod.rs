#![allow(dead_code)]

use std::sync::Arc;

use planlab_core::{AssetAllocation, EngineConfig, InvestmentPlan, PlanId, RebalanceFrequency, RiskLevel};
use planlab_runner::{MemoryMarketData, MemoryPlanStore, PlanService};

pub fn alloc(pairs: &[(&str, f64)]) -> AssetAllocation {
    pairs.iter().map(|(a, w)| (a.to_string(), *w)).collect()
}

pub fn conservative() -> InvestmentPlan {
    InvestmentPlan {
        id: PlanId::new("conservative"),
        name: "Conservative Income".into(),
        description: "Capital preservation with modest growth".into(),
        risk_level: RiskLevel::Low,
        min_investment: 1_000.0,
        max_investment: 100_000.0,
        asset_allocation: alloc(&[("bonds", 0.55), ("cash", 0.25), ("stocks", 0.20)]),
        expected_return: 0.04,
        volatility: 0.05,
        horizon_years: 5,
        rebalance_frequency: RebalanceFrequency::Quarterly,
        is_active: true,
    }
}

pub fn balanced() -> InvestmentPlan {
    InvestmentPlan {
        id: PlanId::new("balanced"),
        name: "Balanced Growth".into(),
        description: String::new(),
        risk_level: RiskLevel::Medium,
        min_investment: 5_000.0,
        max_investment: 250_000.0,
        asset_allocation: alloc(&[("bonds", 0.30), ("cash", 0.10), ("stocks", 0.60)]),
        expected_return: 0.07,
        volatility: 0.12,
        horizon_years: 7,
        rebalance_frequency: RebalanceFrequency::Quarterly,
        is_active: true,
    }
}

pub fn growth() -> InvestmentPlan {
    InvestmentPlan {
        id: PlanId::new("growth"),
        name: "Aggressive Growth".into(),
        description: String::new(),
        risk_level: RiskLevel::High,
        min_investment: 10_000.0,
        max_investment: 1_000_000.0,
        asset_allocation: alloc(&[("cash", 0.05), ("crypto", 0.15), ("stocks", 0.80)]),
        expected_return: 0.12,
        volatility: 0.22,
        horizon_years: 10,
        rebalance_frequency: RebalanceFrequency::Annually,
        is_active: true,
    }
}

pub fn catalog() -> Vec<InvestmentPlan> {
    vec![conservative(), balanced(), growth()]
}

/// Engine config with instant retries so feed-failure tests stay fast.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.rebalance.initial_backoff_ms = 0;
    config.recommend.num_paths = 1000;
    config
}

pub struct Harness {
    pub store: Arc<MemoryPlanStore>,
    pub market: Arc<MemoryMarketData>,
    pub service: PlanService,
}

pub fn harness(plans: Vec<InvestmentPlan>) -> Harness {
    let store = Arc::new(MemoryPlanStore::from_plans(plans));
    let market = Arc::new(MemoryMarketData::new());
    let service = PlanService::new(fast_config(), store.clone(), market.clone())
        .expect("default config is valid");
    Harness {
        store,
        market,
        service,
    }
}
