//! Domain types for investment plans.

pub mod ids;
pub mod plan;

pub use ids::PlanId;
pub use plan::{AssetAllocation, InvestmentPlan, RebalanceFrequency, RiskLevel};
