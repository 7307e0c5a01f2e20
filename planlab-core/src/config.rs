//! Engine configuration: risk-return bands, simulation limits, cache TTL,
//! rebalancing thresholds and recommendation weights.
//!
//! Stored as TOML. Every section has defaults, so a config file only needs
//! the keys it wants to override.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::RiskLevel;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ─── Bands ───────────────────────────────────────────────────────────

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Admissible `(expected_return, volatility)` region for one risk level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskReturnBand {
    pub return_range: Range,
    pub volatility_range: Range,
}

impl RiskReturnBand {
    pub fn admits(&self, expected_return: f64, volatility: f64) -> bool {
        self.return_range.contains(expected_return) && self.volatility_range.contains(volatility)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub low: RiskReturnBand,
    pub medium: RiskReturnBand,
    pub high: RiskReturnBand,
}

impl RiskBands {
    pub fn for_level(&self, level: RiskLevel) -> &RiskReturnBand {
        match level {
            RiskLevel::Low => &self.low,
            RiskLevel::Medium => &self.medium,
            RiskLevel::High => &self.high,
        }
    }
}

/// Every default band keeps `min return > max volatility² / 2`, so the
/// log-drift of any admitted plan is positive and the chance of keeping the
/// principal grows with the horizon.
impl Default for RiskBands {
    fn default() -> Self {
        Self {
            low: RiskReturnBand {
                return_range: Range::new(0.01, 0.05),
                volatility_range: Range::new(0.0, 0.10),
            },
            medium: RiskReturnBand {
                return_range: Range::new(0.05, 0.10),
                volatility_range: Range::new(0.05, 0.20),
            },
            high: RiskReturnBand {
                return_range: Range::new(0.10, 0.25),
                volatility_range: Range::new(0.12, 0.40),
            },
        }
    }
}

// ─── Simulation ──────────────────────────────────────────────────────

/// What counts as a successful path.
///
/// Success has no single accepted definition, so it is a policy rather than
/// a constant. The default treats preserving the principal as success.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessCriterion {
    #[default]
    PrincipalPreserved,
    /// Final value must reach `amount * (1 + annual_rate)^horizon_years`.
    TargetReturn { annual_rate: f64 },
}

impl SuccessCriterion {
    /// Final value a path must reach (inclusive) to count as a success.
    pub fn threshold(&self, amount: f64, horizon_years: u32) -> f64 {
        match self {
            Self::PrincipalPreserved => amount,
            Self::TargetReturn { annual_rate } => {
                amount * (1.0 + annual_rate).powi(horizon_years as i32)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Requests below this path count are rejected.
    pub min_paths: usize,
    /// Path count used when a caller does not specify one.
    pub default_paths: usize,
    /// Size of the private worker pool; 0 uses the global rayon pool.
    pub worker_threads: usize,
    pub success: SuccessCriterion,
    /// Mixed into every request seed.
    pub master_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_paths: 1000,
            default_paths: 2000,
            worker_threads: 0,
            success: SuccessCriterion::PrincipalPreserved,
            master_seed: 0,
        }
    }
}

// ─── Cache ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// How long a caller waits on an in-flight simulation; 0 waits forever.
    pub wait_timeout_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        (self.wait_timeout_ms > 0).then(|| Duration::from_millis(self.wait_timeout_ms))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 1024,
            wait_timeout_ms: 0,
        }
    }
}

// ─── Rebalancing ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Rebalance when any asset drifts strictly more than this.
    pub drift_threshold: f64,
    /// Price-feed attempts per check before the plan is deferred.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound on any single retry delay.
    pub max_backoff_ms: u64,
    /// Market weights must sum to 1 within this tolerance to be usable.
    pub weight_tolerance: f64,
}

impl RebalanceConfig {
    /// Delay before retry number `attempt` (1-based; attempt 0 has no delay).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = self.initial_backoff_ms as f64 * factor;
        let cap = self.max_backoff_ms;
        if millis.is_finite() && millis < cap as f64 {
            Duration::from_secs_f64(millis / 1000.0)
        } else {
            Duration::from_millis(cap)
        }
    }
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.05,
            max_attempts: 3,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            weight_tolerance: 1e-3,
        }
    }
}

// ─── Recommendation ──────────────────────────────────────────────────

/// Fallback risk levels considered when no plan matches a profile exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskAdjacency {
    pub low: Vec<RiskLevel>,
    pub medium: Vec<RiskLevel>,
    pub high: Vec<RiskLevel>,
}

impl RiskAdjacency {
    pub fn neighbors(&self, level: RiskLevel) -> &[RiskLevel] {
        match level {
            RiskLevel::Low => &self.low,
            RiskLevel::Medium => &self.medium,
            RiskLevel::High => &self.high,
        }
    }
}

impl Default for RiskAdjacency {
    fn default() -> Self {
        Self {
            low: vec![RiskLevel::Medium],
            medium: vec![RiskLevel::Low, RiskLevel::High],
            high: vec![RiskLevel::Medium],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// λ in `score = success_probability − λ · VaR95 / amount`.
    pub risk_aversion: f64,
    pub adjacency: RiskAdjacency,
    /// Paths per candidate simulation.
    pub num_paths: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 1.0,
            adjacency: RiskAdjacency::default(),
            num_paths: 2000,
        }
    }
}

// ─── Top level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bands: RiskBands,
    /// Allowed deviation of the allocation sum from 1.0.
    pub allocation_tolerance: f64,
    pub simulation: SimulationConfig,
    pub cache: CacheConfig,
    pub rebalance: RebalanceConfig,
    pub recommend: RecommendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bands: RiskBands::default(),
            allocation_tolerance: 1e-6,
            simulation: SimulationConfig::default(),
            cache: CacheConfig::default(),
            rebalance: RebalanceConfig::default(),
            recommend: RecommendConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for level in RiskLevel::ALL {
            let band = self.bands.for_level(level);
            let ranges = [("return", band.return_range), ("volatility", band.volatility_range)];
            for (what, range) in ranges {
                if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
                    return Err(ConfigError::Invalid(format!(
                        "{level} {what} band [{}, {}] is not a valid range",
                        range.min, range.max
                    )));
                }
            }
        }
        if !(self.allocation_tolerance >= 0.0) {
            return Err(ConfigError::Invalid("allocation_tolerance must be >= 0".into()));
        }
        if self.simulation.min_paths == 0 {
            return Err(ConfigError::Invalid("simulation.min_paths must be > 0".into()));
        }
        if self.simulation.default_paths < self.simulation.min_paths {
            return Err(ConfigError::Invalid(
                "simulation.default_paths must be >= simulation.min_paths".into(),
            ));
        }
        if !(self.rebalance.drift_threshold > 0.0 && self.rebalance.drift_threshold < 1.0) {
            return Err(ConfigError::Invalid(
                "rebalance.drift_threshold must lie in (0, 1)".into(),
            ));
        }
        if self.rebalance.max_attempts == 0 {
            return Err(ConfigError::Invalid("rebalance.max_attempts must be >= 1".into()));
        }
        let multiplier = self.rebalance.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "rebalance.backoff_multiplier must be finite and >= 1".into(),
            ));
        }
        if self.rebalance.initial_backoff_ms > self.rebalance.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "rebalance.initial_backoff_ms must not exceed rebalance.max_backoff_ms".into(),
            ));
        }
        if !(self.recommend.risk_aversion >= 0.0) {
            return Err(ConfigError::Invalid("recommend.risk_aversion must be >= 0".into()));
        }
        if self.recommend.num_paths < self.simulation.min_paths {
            return Err(ConfigError::Invalid(
                "recommend.num_paths must be >= simulation.min_paths".into(),
            ));
        }
        Ok(())
    }
}
