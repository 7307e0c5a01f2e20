//! Investment plan model: risk classification, target allocation, and the
//! return/volatility assumptions the simulator runs on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ids::PlanId;

/// Asset-class name → weight.
///
/// `BTreeMap` keeps iteration order stable, which keeps drift reports and
/// serialized plans deterministic.
pub type AssetAllocation = BTreeMap<String, f64>;

/// Risk classification of a plan (and of an investor's risk profile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown risk level '{other}' (expected low, medium or high)")),
        }
    }
}

/// How often the rebalancing scheduler re-checks a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    Monthly,
    #[default]
    Quarterly,
    Annually,
}

impl RebalanceFrequency {
    /// Length of one scheduling period in calendar months.
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Annually => 12,
        }
    }
}

/// An investment plan as held by the plan store.
///
/// The core only reads plans, except `asset_allocation`, which the
/// rebalancing scheduler overwrites after a successful rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPlan {
    pub id: PlanId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk_level: RiskLevel,
    pub min_investment: f64,
    pub max_investment: f64,
    pub asset_allocation: AssetAllocation,
    /// Annualized fractional return (0.05 = 5%).
    pub expected_return: f64,
    /// Annualized standard deviation of returns.
    pub volatility: f64,
    /// Recommended holding period.
    pub horizon_years: u32,
    #[serde(default)]
    pub rebalance_frequency: RebalanceFrequency,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl InvestmentPlan {
    /// Sum of all allocation weights.
    pub fn allocation_total(&self) -> f64 {
        self.asset_allocation.values().sum()
    }

    /// True when `amount` lies inside `[min_investment, max_investment]`.
    pub fn accepts_amount(&self, amount: f64) -> bool {
        amount >= self.min_investment && amount <= self.max_investment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> InvestmentPlan {
        InvestmentPlan {
            id: PlanId::new("p1"),
            name: "Income".into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            min_investment: 1_000.0,
            max_investment: 50_000.0,
            asset_allocation: [("bonds".to_string(), 0.7), ("cash".to_string(), 0.3)]
                .into_iter()
                .collect(),
            expected_return: 0.04,
            volatility: 0.05,
            horizon_years: 5,
            rebalance_frequency: RebalanceFrequency::Quarterly,
            is_active: true,
        }
    }

    #[test]
    fn accepts_amount_is_inclusive() {
        let p = plan();
        assert!(p.accepts_amount(1_000.0));
        assert!(p.accepts_amount(50_000.0));
        assert!(!p.accepts_amount(999.99));
        assert!(!p.accepts_amount(50_000.01));
    }

    #[test]
    fn risk_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!(" low ".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
        assert!("extreme".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn frequency_months() {
        assert_eq!(RebalanceFrequency::Monthly.months(), 1);
        assert_eq!(RebalanceFrequency::default().months(), 3);
        assert_eq!(RebalanceFrequency::Annually.months(), 12);
    }

    #[test]
    fn plan_json_defaults_optional_fields() {
        let json = r#"{
            "id": "p2", "name": "Growth", "risk_level": "high",
            "min_investment": 10000.0, "max_investment": 100000.0,
            "asset_allocation": {"stocks": 1.0},
            "expected_return": 0.12, "volatility": 0.25, "horizon_years": 10
        }"#;
        let p: InvestmentPlan = serde_json::from_str(json).unwrap();
        assert_eq!(p.rebalance_frequency, RebalanceFrequency::Quarterly);
        assert!(p.is_active);
        assert!(p.description.is_empty());
    }
}
