//! Catalog file: the plans to serve plus a market-weight snapshot.
//!
//! ```toml
//! [[plans]]
//! id = "conservative"
//! name = "Conservative Income"
//! risk_level = "low"
//! min_investment = 1000.0
//! max_investment = 100000.0
//! expected_return = 0.04
//! volatility = 0.05
//! horizon_years = 5
//! asset_allocation = { bonds = 0.55, cash = 0.25, stocks = 0.20 }
//!
//! [market.conservative]
//! bonds = 0.50
//! cash = 0.23
//! stocks = 0.27
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use planlab_core::{AssetAllocation, InvestmentPlan, PlanId};
use planlab_runner::{MemoryMarketData, MemoryPlanStore};

#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub plans: Vec<InvestmentPlan>,
    #[serde(default)]
    pub market: BTreeMap<PlanId, AssetAllocation>,
}

impl Catalog {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse catalog TOML")
    }

    pub fn into_collaborators(self) -> (MemoryPlanStore, MemoryMarketData) {
        (
            MemoryPlanStore::from_plans(self.plans),
            MemoryMarketData::from_snapshot(self.market),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{AllocationValidator, EngineConfig, RebalanceFrequency, RiskLevel};
    use planlab_runner::{MarketData, PlanStore};

    const SAMPLE: &str = r#"
        [[plans]]
        id = "conservative"
        name = "Conservative Income"
        risk_level = "low"
        min_investment = 1000.0
        max_investment = 100000.0
        expected_return = 0.04
        volatility = 0.05
        horizon_years = 5
        asset_allocation = { bonds = 0.55, cash = 0.25, stocks = 0.20 }

        [[plans]]
        id = "growth"
        name = "Aggressive Growth"
        risk_level = "high"
        min_investment = 10000.0
        max_investment = 1000000.0
        expected_return = 0.12
        volatility = 0.22
        horizon_years = 10
        rebalance_frequency = "annually"
        asset_allocation = { stocks = 0.80, crypto = 0.15, cash = 0.05 }

        [market.conservative]
        bonds = 0.50
        cash = 0.23
        stocks = 0.27
    "#;

    #[test]
    fn parses_plans_and_market() {
        let catalog = Catalog::from_toml(SAMPLE).unwrap();
        assert_eq!(catalog.plans.len(), 2);
        assert_eq!(catalog.plans[0].risk_level, RiskLevel::Low);
        assert_eq!(catalog.plans[0].rebalance_frequency, RebalanceFrequency::Quarterly);
        assert!(catalog.plans[0].is_active);
        assert_eq!(catalog.plans[1].rebalance_frequency, RebalanceFrequency::Annually);
        assert_eq!(catalog.market.len(), 1);
    }

    #[test]
    fn collaborators_serve_catalog_contents() {
        let (store, market) = Catalog::from_toml(SAMPLE).unwrap().into_collaborators();
        let plan = store.load_plan(&PlanId::new("conservative")).unwrap();
        let weights = market.current_weights(&plan).unwrap();
        assert_eq!(weights["stocks"], 0.27);
        assert!(market
            .current_weights(&store.load_plan(&PlanId::new("growth")).unwrap())
            .is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Catalog::from_file(&path).unwrap().plans.len(), 2);
    }

    #[test]
    fn demo_files_are_valid() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos");
        let catalog = Catalog::from_file(&demos.join("catalog.toml")).unwrap();
        let validator = AllocationValidator::default();
        for plan in &catalog.plans {
            assert!(validator.validate(plan).is_ok(), "{}", plan.id);
        }
        EngineConfig::from_file(&demos.join("engine.toml")).unwrap();
    }

    #[test]
    fn missing_file_has_context() {
        let err = Catalog::from_file(Path::new("/nonexistent/catalog.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read catalog"));
    }
}
