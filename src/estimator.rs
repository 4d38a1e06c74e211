//! The estimator capability set and the helpers every variant shares.
//!
//! An estimator is a pure function from logged feedback, a candidate action
//! distribution and (optionally) a reward-model tensor to a per-round estimate
//! sequence. Everything else, point estimate and interval alike, is derived
//! from that sequence by the provided methods of [`OpeEstimator`]:
//!
//! - `policy_value` is the arithmetic mean of the sequence.
//! - `interval` bootstraps the same sequence, so its `mean` is bit-identical
//!   to `policy_value`.
//!
//! Notation used throughout the variants, for round `i` with logged action
//! `a_i` at position `p_i`:
//!
//! ```text
//!   w_i  = pi_e(a_i | i, p_i) / pscore_i          (importance weight)
//!   q_i  = q_hat(i, a_i, p_i)                      (reward model at the logged action)
//!   DM_i = sum_a pi_e(a | i, p_i) * q_hat(i, a, p_i)
//! ```

use crate::bootstrap::{bootstrap_interval, BootstrapConfig, Interval};
use crate::error::{OpeError, Result};
use crate::feedback::BanditFeedback;
use crate::tensor::{ActionDist, RewardEstimate};

/// Arithmetic mean (`0.0` for an empty slice).
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (`ddof = 1`); `0.0` when fewer than two values.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Standard error of the mean, `std_dev / sqrt(n)`.
pub fn standard_error(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    std_dev(xs) / (xs.len() as f64).sqrt()
}

/// What to do with an importance weight that is not finite (pscore underflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NonFiniteWeightPolicy {
    /// Fail with [`OpeError::NonFiniteWeight`] naming the round.
    #[default]
    Error,
    /// Replace the weight with the (finite) ceiling.
    Clip,
}

/// Importance-weight clipping for IPW-style estimators.
///
/// Weights above `ceiling` are capped to it. The default ceiling is `+inf`
/// (no clipping) and non-finite weights are an error.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightClipping {
    /// Maximum weight (must be > 0; `+inf` disables clipping).
    pub ceiling: f64,
    pub on_non_finite: NonFiniteWeightPolicy,
}

impl Default for WeightClipping {
    fn default() -> Self {
        Self {
            ceiling: f64::INFINITY,
            on_non_finite: NonFiniteWeightPolicy::Error,
        }
    }
}

impl WeightClipping {
    /// Cap weights at `ceiling` and clip non-finite weights to it as well.
    pub fn capped(ceiling: f64) -> Result<Self> {
        let c = Self {
            ceiling,
            on_non_finite: NonFiniteWeightPolicy::Clip,
        };
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ceiling.is_nan() || self.ceiling <= 0.0 {
            return Err(OpeError::config(format!(
                "weight ceiling must be > 0, got {}",
                self.ceiling
            )));
        }
        if self.on_non_finite == NonFiniteWeightPolicy::Clip && !self.ceiling.is_finite() {
            return Err(OpeError::config(
                "clipping non-finite weights requires a finite ceiling",
            ));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.ceiling.is_finite()
    }

    /// Apply the ceiling and the non-finite policy to raw weights.
    pub(crate) fn apply(&self, estimator: &str, mut weights: Vec<f64>) -> Result<Vec<f64>> {
        let mut capped = 0usize;
        let mut replaced = 0usize;
        for (round, w) in weights.iter_mut().enumerate() {
            if !w.is_finite() {
                match self.on_non_finite {
                    NonFiniteWeightPolicy::Error => {
                        return Err(OpeError::NonFiniteWeight {
                            estimator: estimator.to_string(),
                            round,
                        })
                    }
                    NonFiniteWeightPolicy::Clip => {
                        *w = self.ceiling;
                        replaced += 1;
                    }
                }
            } else if *w > self.ceiling {
                *w = self.ceiling;
                capped += 1;
            }
        }
        if capped + replaced > 0 {
            tracing::warn!(
                estimator,
                capped,
                replaced,
                ceiling = self.ceiling,
                "importance weights clipped"
            );
        }
        Ok(weights)
    }
}

/// Validated inputs for one evaluation call.
///
/// Constructing a `RoundInput` is the single validation pass: tensor shapes
/// against the feedback record, action-distribution normalization, and
/// reward-estimate finiteness. Estimators receive it already checked.
#[derive(Debug, Clone, Copy)]
pub struct RoundInput<'a> {
    feedback: &'a BanditFeedback,
    action_dist: &'a ActionDist,
    reward_estimate: Option<&'a RewardEstimate>,
}

impl<'a> RoundInput<'a> {
    pub fn new(
        feedback: &'a BanditFeedback,
        action_dist: &'a ActionDist,
        reward_estimate: Option<&'a RewardEstimate>,
    ) -> Result<Self> {
        let shape = feedback.tensor_shape();
        action_dist.check_shape("action_dist", shape)?;
        action_dist.check_distribution("action_dist")?;
        if let Some(q) = reward_estimate {
            q.check_shape("reward_estimate", shape)?;
            q.check_finite("reward_estimate")?;
        }
        Ok(Self {
            feedback,
            action_dist,
            reward_estimate,
        })
    }

    pub fn feedback(&self) -> &'a BanditFeedback {
        self.feedback
    }

    pub fn action_dist(&self) -> &'a ActionDist {
        self.action_dist
    }

    pub fn reward_estimate(&self) -> Option<&'a RewardEstimate> {
        self.reward_estimate
    }

    pub fn n_rounds(&self) -> usize {
        self.feedback.n_rounds()
    }

    /// The reward estimate, or `MissingInput` attributed to `estimator`.
    pub fn require_reward_estimate(&self, estimator: &str) -> Result<&'a RewardEstimate> {
        self.reward_estimate
            .ok_or_else(|| OpeError::missing_input(estimator))
    }

    /// `pi_e(a_i | i, p_i)`: candidate probability of the logged action.
    #[inline]
    pub fn candidate_prob(&self, r: usize) -> f64 {
        let fb = self.feedback;
        self.action_dist
            .at(r, fb.action()[r], fb.position_at(r))
    }

    /// Unclipped importance weights `w_i`.
    pub fn importance_weights(&self) -> Vec<f64> {
        let pscore = self.feedback.pscore();
        (0..self.n_rounds())
            .map(|r| self.candidate_prob(r) / pscore[r])
            .collect()
    }

    /// Importance weights after `clipping`.
    pub(crate) fn clipped_weights(
        &self,
        estimator: &str,
        clipping: &WeightClipping,
    ) -> Result<Vec<f64>> {
        clipping.apply(estimator, self.importance_weights())
    }

    /// `q_hat(i, a_i, p_i)` for every round.
    pub(crate) fn factual_estimates(&self, q: &RewardEstimate) -> Vec<f64> {
        let fb = self.feedback;
        (0..self.n_rounds())
            .map(|r| q.at(r, fb.action()[r], fb.position_at(r)))
            .collect()
    }

    /// `DM_i` for every round.
    pub(crate) fn direct_terms(&self, q: &RewardEstimate) -> Vec<f64> {
        let fb = self.feedback;
        (0..self.n_rounds())
            .map(|r| self.action_dist.expectation_of(q, r, fb.position_at(r)))
            .collect()
    }
}

/// `mean(weights)`, or `ZeroWeightMass` when it is not strictly positive.
pub(crate) fn normalizing_mass(estimator: &str, weights: &[f64]) -> Result<f64> {
    let m = mean(weights);
    if !(m > 0.0 && m.is_finite()) {
        return Err(OpeError::ZeroWeightMass {
            estimator: estimator.to_string(),
        });
    }
    Ok(m)
}

/// Reject an empty custom name; used by every `with_name` builder.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OpeError::config("estimator name must be non-empty"));
    }
    Ok(())
}

/// Common interface of every off-policy estimator.
///
/// Implementors provide [`estimate_round_rewards`](Self::estimate_round_rewards);
/// the remaining methods are derived from it and should not be overridden.
///
/// # Example
///
/// ```rust
/// use offpolicy::{BanditFeedback, InverseProbabilityWeighting, OpeEstimator, Tensor3};
///
/// let fb = BanditFeedback::builder()
///     .n_actions(2)
///     .context(vec![vec![0.0], vec![1.0]])
///     .action(vec![0, 1])
///     .reward(vec![1.0, 0.0])
///     .pscore(vec![0.5, 0.5])
///     .build()
///     .unwrap();
/// let uniform = Tensor3::uniform(2, 2, 1).unwrap();
///
/// let ipw = InverseProbabilityWeighting::new();
/// let v = ipw.estimate_policy_value(&fb, &uniform, None).unwrap();
/// assert!((v - 0.5).abs() < 1e-12);
/// ```
pub trait OpeEstimator: std::fmt::Debug + Send + Sync {
    /// Stable, human-readable name used as the report key.
    fn name(&self) -> &str;

    /// Whether a reward-model tensor must be supplied.
    fn requires_reward_estimate(&self) -> bool;

    /// Per-round estimates; their mean is the policy value.
    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>>;

    /// [`estimate_round_rewards`](Self::estimate_round_rewards), checked for
    /// length and finiteness.
    fn round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        if self.requires_reward_estimate() {
            input.require_reward_estimate(self.name())?;
        }
        let rounds = self.estimate_round_rewards(input)?;
        if rounds.len() != input.n_rounds() {
            return Err(OpeError::schema(format!(
                "estimator `{}` returned {} per-round values for {} rounds",
                self.name(),
                rounds.len(),
                input.n_rounds()
            )));
        }
        if let Some(round) = rounds.iter().position(|x| !x.is_finite()) {
            return Err(OpeError::NonFiniteWeight {
                estimator: self.name().to_string(),
                round,
            });
        }
        Ok(rounds)
    }

    /// Point estimate on already-validated inputs.
    fn policy_value(&self, input: &RoundInput<'_>) -> Result<f64> {
        let value = mean(&self.round_rewards(input)?);
        tracing::debug!(
            estimator = self.name(),
            n_rounds = input.n_rounds(),
            value,
            "policy value estimated"
        );
        Ok(value)
    }

    /// Bootstrap interval on already-validated inputs.
    fn interval(&self, input: &RoundInput<'_>, cfg: &BootstrapConfig) -> Result<Interval> {
        bootstrap_interval(&self.round_rewards(input)?, cfg)
    }

    /// Validate the inputs, then estimate the candidate policy's value.
    fn estimate_policy_value(
        &self,
        feedback: &BanditFeedback,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
    ) -> Result<f64> {
        self.policy_value(&RoundInput::new(feedback, action_dist, reward_estimate)?)
    }

    /// Validate the inputs, then compute a bootstrap confidence interval.
    fn estimate_interval(
        &self,
        feedback: &BanditFeedback,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
        cfg: &BootstrapConfig,
    ) -> Result<Interval> {
        self.interval(
            &RoundInput::new(feedback, action_dist, reward_estimate)?,
            cfg,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor3;

    fn feedback() -> BanditFeedback {
        BanditFeedback::builder()
            .n_actions(2)
            .context(vec![vec![0.0]; 3])
            .action(vec![0, 1, 1])
            .reward(vec![1.0, 0.0, 1.0])
            .pscore(vec![0.5, 0.25, 1.0])
            .build()
            .unwrap()
    }

    #[test]
    fn mean_and_spread_helpers() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert!((std_dev(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        assert_eq!(std_dev(&[5.0]), 0.0);
        assert!((standard_error(&[1.0, 2.0, 3.0]) - 1.0 / 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn round_input_computes_weights_at_logged_actions() {
        let fb = feedback();
        let pi = Tensor3::from_rows(vec![vec![1.0, 0.0], vec![0.5, 0.5], vec![0.0, 1.0]]).unwrap();
        let input = RoundInput::new(&fb, &pi, None).unwrap();
        assert_eq!(input.importance_weights(), vec![2.0, 2.0, 1.0]);
    }

    #[test]
    fn round_input_rejects_mismatched_shapes() {
        let fb = feedback();
        let wrong = Tensor3::uniform(3, 3, 1).unwrap();
        assert!(matches!(
            RoundInput::new(&fb, &wrong, None),
            Err(OpeError::Schema(_))
        ));
        let pi = Tensor3::uniform(3, 2, 1).unwrap();
        let bad_q = Tensor3::uniform(2, 2, 1).unwrap();
        assert!(RoundInput::new(&fb, &pi, Some(&bad_q)).is_err());
        let nan_q = Tensor3::from_flat(3, 2, 1, vec![0.0, 0.0, f64::NAN, 0.0, 0.0, 0.0]).unwrap();
        assert!(RoundInput::new(&fb, &pi, Some(&nan_q)).is_err());
    }

    #[test]
    fn direct_terms_take_expectation_under_candidate() {
        let fb = feedback();
        let pi = Tensor3::uniform(3, 2, 1).unwrap();
        let q = Tensor3::from_rows(vec![vec![1.0, 0.0], vec![0.2, 0.4], vec![2.0, 2.0]]).unwrap();
        let input = RoundInput::new(&fb, &pi, Some(&q)).unwrap();
        let dm = input.direct_terms(&q);
        assert!((dm[0] - 0.5).abs() < 1e-12);
        assert!((dm[1] - 0.3).abs() < 1e-12);
        assert!((dm[2] - 2.0).abs() < 1e-12);
        assert_eq!(input.factual_estimates(&q), vec![1.0, 0.4, 2.0]);
    }

    #[test]
    fn clipping_caps_and_reports() {
        let c = WeightClipping::capped(3.0).unwrap();
        let out = c.apply("ipw", vec![1.0, 5.0, f64::INFINITY]).unwrap();
        assert_eq!(out, vec![1.0, 3.0, 3.0]);
    }

    #[test]
    fn non_finite_weight_is_an_error_by_default() {
        let err = WeightClipping::default()
            .apply("ipw", vec![1.0, f64::INFINITY])
            .unwrap_err();
        assert_eq!(
            err,
            OpeError::NonFiniteWeight {
                estimator: "ipw".to_string(),
                round: 1
            }
        );
    }

    #[test]
    fn clipping_configuration_is_validated() {
        assert!(WeightClipping::capped(0.0).is_err());
        assert!(WeightClipping::capped(f64::NAN).is_err());
        assert!(WeightClipping::capped(f64::INFINITY).is_err());
        assert!(WeightClipping::default().validate().is_ok());
        assert!(!WeightClipping::default().is_active());
    }

    #[test]
    fn zero_weight_mass_is_reported() {
        assert!(matches!(
            normalizing_mass("snipw", &[0.0, 0.0]),
            Err(OpeError::ZeroWeightMass { .. })
        ));
        assert_eq!(normalizing_mass("snipw", &[1.0, 3.0]), Ok(2.0));
    }
}
