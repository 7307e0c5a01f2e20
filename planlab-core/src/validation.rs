//! Allocation validation: structural and risk-return checks that gate a plan
//! before it can be simulated or recommended.
//!
//! All checks run and every violation is reported; nothing short-circuits.
//! The only way to obtain a [`ValidatedPlan`] is through
//! [`AllocationValidator::validate`].

use std::ops::Deref;

use serde::Serialize;
use thiserror::Error;

use crate::config::{EngineConfig, RiskBands};
use crate::domain::{InvestmentPlan, RiskLevel};

/// Shortest accepted plan name.
pub const MIN_NAME_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("asset allocation must sum to 1.0 (got {total:.6})")]
    AllocationSum { total: f64 },

    #[error("asset '{asset}' has negative weight {weight}")]
    NegativeWeight { asset: String, weight: f64 },

    #[error("investment range invalid: min {min} / max {max}")]
    InvestmentRange { min: f64, max: f64 },

    #[error(
        "expected return {expected_return} / volatility {volatility} outside the {risk_level} risk band"
    )]
    RiskReturnMismatch {
        risk_level: RiskLevel,
        expected_return: f64,
        volatility: f64,
    },

    #[error("plan name '{name}' must be at least {MIN_NAME_LEN} characters")]
    NameTooShort { name: String },

    #[error("recommended horizon must be at least one year (got {horizon_years})")]
    InvalidHorizon { horizon_years: u32 },
}

/// A plan that passed every validation check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedPlan(InvestmentPlan);

impl ValidatedPlan {
    pub fn plan(&self) -> &InvestmentPlan {
        &self.0
    }

    pub fn into_inner(self) -> InvestmentPlan {
        self.0
    }
}

impl Deref for ValidatedPlan {
    type Target = InvestmentPlan;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct AllocationValidator {
    bands: RiskBands,
    tolerance: f64,
}

impl AllocationValidator {
    pub fn new(bands: RiskBands, tolerance: f64) -> Self {
        Self { bands, tolerance }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.bands, config.allocation_tolerance)
    }

    /// Validate a candidate plan. Pure: the plan is cloned on success.
    pub fn validate(&self, plan: &InvestmentPlan) -> Result<ValidatedPlan, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let total = plan.allocation_total();
        if !((total - 1.0).abs() <= self.tolerance) {
            errors.push(ValidationError::AllocationSum { total });
        }

        for (asset, &weight) in &plan.asset_allocation {
            if weight < 0.0 {
                errors.push(ValidationError::NegativeWeight {
                    asset: asset.clone(),
                    weight,
                });
            }
        }

        let range_ok = plan.min_investment.is_finite()
            && plan.max_investment.is_finite()
            && plan.min_investment >= 0.0
            && plan.min_investment <= plan.max_investment;
        if !range_ok {
            errors.push(ValidationError::InvestmentRange {
                min: plan.min_investment,
                max: plan.max_investment,
            });
        }

        if !self.risk_return_coherent(plan) {
            errors.push(ValidationError::RiskReturnMismatch {
                risk_level: plan.risk_level,
                expected_return: plan.expected_return,
                volatility: plan.volatility,
            });
        }

        if plan.name.trim().chars().count() < MIN_NAME_LEN {
            errors.push(ValidationError::NameTooShort {
                name: plan.name.clone(),
            });
        }

        if plan.horizon_years == 0 {
            errors.push(ValidationError::InvalidHorizon {
                horizon_years: plan.horizon_years,
            });
        }

        if errors.is_empty() {
            Ok(ValidatedPlan(plan.clone()))
        } else {
            tracing::debug!(plan = %plan.id, violations = errors.len(), "plan failed validation");
            Err(errors)
        }
    }

    /// Absolute sanity bounds plus the configured band for the plan's risk level.
    fn risk_return_coherent(&self, plan: &InvestmentPlan) -> bool {
        let er = plan.expected_return;
        let vol = plan.volatility;
        let sane = er.is_finite()
            && vol.is_finite()
            && (-1.0..=1.0).contains(&er)
            && (0.0..=1.0).contains(&vol);
        sane && self.bands.for_level(plan.risk_level).admits(er, vol)
    }
}

impl Default for AllocationValidator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
