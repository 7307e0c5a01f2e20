//! PlanLab Runner — the concurrent services around `planlab-core`.
//!
//! This crate builds on `planlab-core` to provide:
//! - Single-flight simulation cache with TTL and stale serving
//! - Drift-based rebalancing scheduler with retry, deferral and an explicit
//!   approval workflow
//! - Plan recommendation by simulated risk-adjusted score
//! - Plan adjustment advice against model allocations
//! - Plan-store and market-data seams with in-memory implementations
//! - `PlanService` facade and CSV export

pub mod advice;
pub mod cache;
pub mod export;
pub mod locks;
pub mod market;
pub mod rebalance;
pub mod recommend;
pub mod service;
pub mod store;
pub mod workflow;

pub use advice::{advise, AllocationDeviation, PlanAdvice, RiskNote};
pub use cache::{CacheError, CachedResult, Freshness, SimulationCache};
pub use locks::PlanLocks;
pub use market::{MarketData, MemoryMarketData, PriceFeedError};
pub use rebalance::{
    decide, CycleOutcome, LedgerEntry, RebalanceDecision, RebalanceError, RebalancingScheduler,
};
pub use recommend::{Recommendation, RecommendationEngine};
pub use service::{PlanService, ServiceError};
pub use store::{MemoryPlanStore, PlanStore, StoreError};
pub use workflow::{RebalanceStatus, WorkflowError};
