//! Doubly robust estimators: DR, self-normalized DR, Switch-DR, and DR with
//! optimistic shrinkage (DRos).
//!
//! Every variant starts from the direct-method term and adds an importance
//! weighted residual of the reward model at the logged action:
//!
//! ```text
//!   V_i = DM_i + g(w_i) * (r_i - q_i)
//! ```
//!
//! The variants differ only in `g`: the identity (DR, optionally clipped),
//! `w / mean(w)` (SNDR), `w * 1{w < tau}` (Switch-DR), and
//! `lambda * w / (w^2 + lambda)` (DRos). DR is consistent when either the
//! propensities or the reward model are correct.

use crate::error::{OpeError, Result};
use crate::estimator::{normalizing_mass, OpeEstimator, RoundInput, WeightClipping};
use crate::ipw::SwitchConfig;
use crate::tensor::RewardEstimate;

/// `DM_i + g_i * (r_i - q_i)` for precomputed modified weights `g`.
fn dm_plus_residual(input: &RoundInput<'_>, q: &RewardEstimate, g: &[f64]) -> Vec<f64> {
    let dm = input.direct_terms(q);
    let q_fact = input.factual_estimates(q);
    let reward = input.feedback().reward();
    (0..input.n_rounds())
        .map(|i| dm[i] + g[i] * (reward[i] - q_fact[i]))
        .collect()
}

/// Doubly robust (`dr`), optionally with clipped weights.
#[derive(Debug, Clone)]
pub struct DoublyRobust {
    name: String,
    clipping: WeightClipping,
}

impl Default for DoublyRobust {
    fn default() -> Self {
        Self {
            name: "dr".to_string(),
            clipping: WeightClipping::default(),
        }
    }
}

impl DoublyRobust {
    pub fn new() -> Self {
        Self::default()
    }

    /// DR with clipped weights. Named `dr-clipped` unless renamed.
    pub fn with_clipping(clipping: WeightClipping) -> Result<Self> {
        clipping.validate()?;
        Ok(Self {
            name: "dr-clipped".to_string(),
            clipping,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl OpeEstimator for DoublyRobust {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        true
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let q = input.require_reward_estimate(&self.name)?;
        let w = input.clipped_weights(&self.name, &self.clipping)?;
        Ok(dm_plus_residual(input, q, &w))
    }
}

/// Self-normalized doubly robust (`sndr`).
#[derive(Debug, Clone)]
pub struct SelfNormalizedDr {
    name: String,
    clipping: WeightClipping,
}

impl Default for SelfNormalizedDr {
    fn default() -> Self {
        Self {
            name: "sndr".to_string(),
            clipping: WeightClipping::default(),
        }
    }
}

impl SelfNormalizedDr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clipping(mut self, clipping: WeightClipping) -> Result<Self> {
        clipping.validate()?;
        self.clipping = clipping;
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl OpeEstimator for SelfNormalizedDr {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        true
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let q = input.require_reward_estimate(&self.name)?;
        let w = input.clipped_weights(&self.name, &self.clipping)?;
        let mass = normalizing_mass(&self.name, &w)?;
        let g: Vec<f64> = w.iter().map(|w| w / mass).collect();
        Ok(dm_plus_residual(input, q, &g))
    }
}

/// Switch estimator with a DR base (`switch-dr`).
///
/// Per round: `DM_i + 1{w_i < tau} * w_i * (r_i - q_i)`.
#[derive(Debug, Clone)]
pub struct SwitchDr {
    name: String,
    cfg: SwitchConfig,
}

impl Default for SwitchDr {
    fn default() -> Self {
        Self {
            name: "switch-dr".to_string(),
            cfg: SwitchConfig::default(),
        }
    }
}

impl SwitchDr {
    pub fn new(cfg: SwitchConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            ..Self::default()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.cfg
    }
}

impl OpeEstimator for SwitchDr {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        true
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let q = input.require_reward_estimate(&self.name)?;
        let g: Vec<f64> = input
            .importance_weights()
            .into_iter()
            .map(|w| if self.cfg.keeps(w) { w } else { 0.0 })
            .collect();
        Ok(dm_plus_residual(input, q, &g))
    }
}

/// Shrinkage configuration for DRos.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShrinkageConfig {
    /// Shrinkage strength `lambda` (>= 0, `+inf` allowed).
    ///
    /// `0` shrinks every weight to 0 (pure DM); `+inf` leaves weights
    /// untouched (plain DR).
    pub lambda: f64,
}

impl Default for ShrinkageConfig {
    fn default() -> Self {
        Self { lambda: 10.0 }
    }
}

impl ShrinkageConfig {
    pub fn new(lambda: f64) -> Result<Self> {
        let cfg = Self { lambda };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lambda.is_nan() || self.lambda < 0.0 {
            return Err(OpeError::config(format!(
                "shrinkage lambda must be >= 0, got {}",
                self.lambda
            )));
        }
        Ok(())
    }

    /// `lambda * w / (w^2 + lambda)`, with the `lambda -> inf` and `w -> inf` limits.
    pub fn shrink(&self, w: f64) -> f64 {
        let lambda = self.lambda;
        if lambda.is_infinite() {
            w
        } else if lambda == 0.0 || w.is_infinite() {
            0.0
        } else {
            w / (w * w / lambda + 1.0)
        }
    }
}

/// Doubly robust with optimistic shrinkage (`dr-os`).
///
/// Shrinks each weight toward 0 instead of truncating it, which bounds the
/// residual term even for vanishing propensities.
#[derive(Debug, Clone)]
pub struct DoublyRobustWithShrinkage {
    name: String,
    cfg: ShrinkageConfig,
}

impl Default for DoublyRobustWithShrinkage {
    fn default() -> Self {
        Self {
            name: "dr-os".to_string(),
            cfg: ShrinkageConfig::default(),
        }
    }
}

impl DoublyRobustWithShrinkage {
    pub fn new(cfg: ShrinkageConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            ..Self::default()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &ShrinkageConfig {
        &self.cfg
    }
}

impl OpeEstimator for DoublyRobustWithShrinkage {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        true
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let q = input.require_reward_estimate(&self.name)?;
        let g: Vec<f64> = input
            .importance_weights()
            .into_iter()
            .map(|w| self.cfg.shrink(w))
            .collect();
        Ok(dm_plus_residual(input, q, &g))
    }
}
