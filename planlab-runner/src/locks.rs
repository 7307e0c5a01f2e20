//! Per-plan exclusive sections.
//!
//! Readers of a plan's allocation (simulation, recommendation) take the read
//! side; the rebalancer takes the write side for its load → decide → save
//! sequence, so nobody observes a half-applied rebalance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use planlab_core::PlanId;

#[derive(Debug, Default)]
pub struct PlanLocks {
    locks: Mutex<HashMap<PlanId, Arc<RwLock<()>>>>,
}

impl PlanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a plan, created on first use.
    pub fn handle(&self, id: &PlanId) -> Arc<RwLock<()>> {
        Arc::clone(self.locks.lock().entry(id.clone()).or_default())
    }
}
