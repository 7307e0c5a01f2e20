//! Plan adjustment advice: compare a plan against the model allocation of
//! its risk level and flag risk parameters that sit oddly with that level.

use serde::Serialize;

use planlab_core::{AssetAllocation, InvestmentPlan, PlanId, RiskLevel};

/// Model weights deviating by more than this are reported.
pub const DEVIATION_THRESHOLD: f64 = 0.10;

const HIGH_VOLATILITY_FOR_LOW_RISK: f64 = 0.25;
const LOW_RETURN_FOR_HIGH_RISK: f64 = 0.03;

/// Reference allocation per risk level.
pub fn model_allocation(level: RiskLevel) -> AssetAllocation {
    let weights: &[(&str, f64)] = match level {
        RiskLevel::Low => &[("stocks", 0.4), ("bonds", 0.5), ("cash", 0.1)],
        RiskLevel::Medium => &[("stocks", 0.6), ("bonds", 0.3), ("cash", 0.1)],
        RiskLevel::High => &[("stocks", 0.8), ("crypto", 0.15), ("cash", 0.05)],
    };
    weights.iter().map(|(a, w)| (a.to_string(), *w)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationDeviation {
    pub asset: String,
    pub current_weight: f64,
    pub recommended_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskNote {
    /// Volatile parameters on a plan sold as low risk.
    HighVolatility { volatility: f64 },
    /// A high-risk plan whose expected return does not pay for the risk.
    LowExpectedReturn { expected_return: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanAdvice {
    pub plan_id: PlanId,
    pub risk_level: RiskLevel,
    pub deviations: Vec<AllocationDeviation>,
    pub notes: Vec<RiskNote>,
}

impl PlanAdvice {
    pub fn is_clean(&self) -> bool {
        self.deviations.is_empty() && self.notes.is_empty()
    }
}

/// Assets absent from the plan count as weight 0. Assets the model does not
/// hold are not reported.
pub fn advise(plan: &InvestmentPlan) -> PlanAdvice {
    let deviations = model_allocation(plan.risk_level)
        .into_iter()
        .filter_map(|(asset, recommended_weight)| {
            let current_weight = plan.asset_allocation.get(&asset).copied().unwrap_or(0.0);
            ((current_weight - recommended_weight).abs() > DEVIATION_THRESHOLD).then_some(
                AllocationDeviation {
                    asset,
                    current_weight,
                    recommended_weight,
                },
            )
        })
        .collect();

    let mut notes = Vec::new();
    if plan.risk_level == RiskLevel::Low && plan.volatility > HIGH_VOLATILITY_FOR_LOW_RISK {
        notes.push(RiskNote::HighVolatility {
            volatility: plan.volatility,
        });
    }
    if plan.risk_level == RiskLevel::High && plan.expected_return < LOW_RETURN_FOR_HIGH_RISK {
        notes.push(RiskNote::LowExpectedReturn {
            expected_return: plan.expected_return,
        });
    }

    PlanAdvice {
        plan_id: plan.id.clone(),
        risk_level: plan.risk_level,
        deviations,
        notes,
    }
}
