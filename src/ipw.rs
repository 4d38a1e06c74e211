//! Importance-weighting estimators: IPW, self-normalized IPW, and Switch-IPW.
//!
//! All three reweight the logged reward by `w_i = pi_e(a_i) / pscore_i`.
//! IPW is unbiased when the logged propensities are correct, at the price of
//! variance that grows with the weights; the other two trade some bias for a
//! tighter spread.

use crate::error::{OpeError, Result};
use crate::estimator::{normalizing_mass, OpeEstimator, RoundInput, WeightClipping};

/// Threshold configuration for the Switch estimators.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwitchConfig {
    /// Importance-weight threshold `tau` (>= 0, `+inf` allowed).
    ///
    /// Rounds with `w_i < tau` use the base (IPW or DR) term; the rest fall
    /// back to the direct-method term. The comparison is strict, so `0`
    /// routes every round to DM, including rounds where the candidate never
    /// takes the logged action. `+inf` keeps every round, overflowed weights
    /// included, and so reproduces the base estimator.
    pub tau: f64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self { tau: 1.0 }
    }
}

impl SwitchConfig {
    pub fn new(tau: f64) -> Result<Self> {
        let cfg = Self { tau };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tau.is_nan() || self.tau < 0.0 {
            return Err(OpeError::config(format!(
                "switch threshold tau must be >= 0, got {}",
                self.tau
            )));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn keeps(&self, w: f64) -> bool {
        self.tau == f64::INFINITY || w < self.tau
    }
}

/// Inverse probability weighting (`ipw`), optionally with clipped weights.
///
/// Per round: `min(w_i, ceiling) * r_i`.
#[derive(Debug, Clone)]
pub struct InverseProbabilityWeighting {
    name: String,
    clipping: WeightClipping,
}

impl Default for InverseProbabilityWeighting {
    fn default() -> Self {
        Self {
            name: "ipw".to_string(),
            clipping: WeightClipping::default(),
        }
    }
}

impl InverseProbabilityWeighting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clipped IPW. Named `ipw-clipped` unless renamed.
    pub fn with_clipping(clipping: WeightClipping) -> Result<Self> {
        clipping.validate()?;
        Ok(Self {
            name: "ipw-clipped".to_string(),
            clipping,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn clipping(&self) -> &WeightClipping {
        &self.clipping
    }
}

impl OpeEstimator for InverseProbabilityWeighting {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        false
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let w = input.clipped_weights(&self.name, &self.clipping)?;
        Ok(w
            .iter()
            .zip(input.feedback().reward())
            .map(|(w, r)| w * r)
            .collect())
    }
}

/// Self-normalized IPW (`snipw`).
///
/// Per round: `w_i * r_i / mean(w)`. Bounded by the reward range, at the cost
/// of an `O(1/n)` bias.
#[derive(Debug, Clone)]
pub struct SelfNormalizedIpw {
    name: String,
    clipping: WeightClipping,
}

impl Default for SelfNormalizedIpw {
    fn default() -> Self {
        Self {
            name: "snipw".to_string(),
            clipping: WeightClipping::default(),
        }
    }
}

impl SelfNormalizedIpw {
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

impl OpeEstimator for SelfNormalizedIpw {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        false
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let w = input.clipped_weights(&self.name, &self.clipping)?;
        let mass = normalizing_mass(&self.name, &w)?;
        Ok(w
            .iter()
            .zip(input.feedback().reward())
            .map(|(w, r)| w * r / mass)
            .collect())
    }
}

/// Switch estimator with an IPW base (`switch-ipw`).
///
/// Per round: `w_i * r_i` if `w_i < tau`, else `DM_i`. Needs a reward estimate
/// for the fallback term.
#[derive(Debug, Clone)]
pub struct SwitchIpw {
    name: String,
    cfg: SwitchConfig,
}

impl Default for SwitchIpw {
    fn default() -> Self {
        Self {
            name: "switch-ipw".to_string(),
            cfg: SwitchConfig::default(),
        }
    }
}

impl SwitchIpw {
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

impl OpeEstimator for SwitchIpw {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        true
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let q = input.require_reward_estimate(&self.name)?;
        let dm = input.direct_terms(q);
        let w = input.importance_weights();
        let reward = input.feedback().reward();
        Ok((0..input.n_rounds())
            .map(|i| {
                if self.cfg.keeps(w[i]) {
                    w[i] * reward[i]
                } else {
                    dm[i]
                }
            })
            .collect())
    }
}
