//! Fan-out / fan-in over a collection of estimators.
//!
//! [`OffPolicyEvaluation`] owns one feedback record and an ordered set of
//! uniquely named estimators. Each operation:
//!
//! 1. validates the per-call inputs once (tensor shapes, action-distribution
//!    normalization, bootstrap and metric configuration), failing the whole
//!    call before any estimator runs;
//! 2. runs every estimator on the validated inputs;
//! 3. collects the results into a `BTreeMap` keyed by estimator name, where a
//!    per-estimator failure (for example a missing reward estimate) occupies
//!    only that estimator's entry.
//!
//! Results never depend on estimator order: estimators are pure functions of
//! the inputs, and each interval gets its own RNG seeded from the config.

use std::collections::{BTreeMap, BTreeSet};

use crate::bootstrap::{BootstrapConfig, Interval};
use crate::error::{OpeError, Result};
use crate::estimator::{check_name, OpeEstimator, RoundInput};
use crate::feedback::BanditFeedback;
use crate::tensor::{ActionDist, RewardEstimate};

/// Per-estimator results keyed by estimator name.
pub type EstimateMap<T> = BTreeMap<String, Result<T>>;

/// How estimation error against a ground-truth value is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorMetric {
    /// Relative estimation error `|V_hat - V| / |V|`.
    #[default]
    RelativeEe,
    /// Squared error `(V_hat - V)^2`.
    Se,
}

impl ErrorMetric {
    fn check_ground_truth(self, ground_truth: f64) -> Result<()> {
        if !ground_truth.is_finite() {
            return Err(OpeError::config(format!(
                "ground truth must be finite, got {ground_truth}"
            )));
        }
        if self == Self::RelativeEe && ground_truth == 0.0 {
            return Err(OpeError::DivisionByZero);
        }
        Ok(())
    }

    /// Error of `estimate` against an already-checked `ground_truth`.
    pub fn error(self, estimate: f64, ground_truth: f64) -> f64 {
        match self {
            Self::RelativeEe => (estimate - ground_truth).abs() / ground_truth.abs(),
            Self::Se => (estimate - ground_truth).powi(2),
        }
    }
}

/// One row of [`OffPolicyEvaluation::summarize_off_policy_estimates`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimateSummary {
    pub estimate: f64,
    pub interval: Interval,
    /// `estimate / mean(logged reward)`; `None` when the logged mean is 0.
    pub relative_estimate: Option<f64>,
}

/// Estimators that ran, ranked by error, plus the ones that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorComparison {
    pub metric: ErrorMetric,
    /// `(name, error)` ascending by error, ties broken by name.
    pub ranking: Vec<(String, f64)>,
    pub failures: BTreeMap<String, OpeError>,
}

impl EstimatorComparison {
    /// Name of the estimator with the smallest error, if any ran.
    pub fn best(&self) -> Option<&str> {
        self.ranking.first().map(|(n, _)| n.as_str())
    }
}

/// Off-policy evaluation over a fixed feedback record.
#[derive(Debug)]
pub struct OffPolicyEvaluation {
    feedback: BanditFeedback,
    estimators: Vec<Box<dyn OpeEstimator>>,
}

impl OffPolicyEvaluation {
    /// Create an evaluation session.
    ///
    /// Fails with `Configuration` when the collection is empty, a name is
    /// blank, or two estimators share a name.
    pub fn new(
        feedback: BanditFeedback,
        estimators: Vec<Box<dyn OpeEstimator>>,
    ) -> Result<Self> {
        if estimators.is_empty() {
            return Err(OpeError::config("at least one estimator is required"));
        }
        let mut seen = BTreeSet::new();
        for e in &estimators {
            check_name(e.name())?;
            if !seen.insert(e.name()) {
                return Err(OpeError::config(format!(
                    "duplicate estimator name `{}`",
                    e.name()
                )));
            }
        }
        Ok(Self {
            feedback,
            estimators,
        })
    }

    pub fn feedback(&self) -> &BanditFeedback {
        &self.feedback
    }

    /// Estimator names in collection order.
    pub fn estimator_names(&self) -> Vec<&str> {
        self.estimators.iter().map(|e| e.name()).collect()
    }

    fn validate<'a>(
        &'a self,
        action_dist: &'a ActionDist,
        reward_estimate: Option<&'a RewardEstimate>,
    ) -> Result<RoundInput<'a>> {
        RoundInput::new(&self.feedback, action_dist, reward_estimate)
    }

    fn fan_out<T>(
        &self,
        mut f: impl FnMut(&dyn OpeEstimator) -> Result<T>,
    ) -> EstimateMap<T> {
        let mut out = BTreeMap::new();
        for e in &self.estimators {
            let res = f(e.as_ref());
            if let Err(err) = &res {
                tracing::debug!(estimator = e.name(), error = %err, "estimator failed");
            }
            out.insert(e.name().to_string(), res);
        }
        out
    }

    /// Point estimate of every estimator.
    pub fn estimate_policy_values(
        &self,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
    ) -> Result<EstimateMap<f64>> {
        let input = self.validate(action_dist, reward_estimate)?;
        Ok(self.fan_out(|e| e.policy_value(&input)))
    }

    /// Bootstrap interval of every estimator.
    pub fn estimate_intervals(
        &self,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
        cfg: &BootstrapConfig,
    ) -> Result<EstimateMap<Interval>> {
        cfg.validate()?;
        let input = self.validate(action_dist, reward_estimate)?;
        Ok(self.fan_out(|e| e.interval(&input, cfg)))
    }

    /// Point estimate, interval, and value relative to the logging policy.
    pub fn summarize_off_policy_estimates(
        &self,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
        cfg: &BootstrapConfig,
    ) -> Result<EstimateMap<EstimateSummary>> {
        cfg.validate()?;
        let input = self.validate(action_dist, reward_estimate)?;
        let on_policy = self.feedback.mean_reward();
        Ok(self.fan_out(|e| {
            // The interval mean is bit-identical to the point estimate.
            let interval = e.interval(&input, cfg)?;
            let estimate = interval.mean;
            Ok(EstimateSummary {
                estimate,
                interval,
                relative_estimate: (on_policy != 0.0).then(|| estimate / on_policy),
            })
        }))
    }

    /// Estimation error of every estimator against `ground_truth`.
    pub fn evaluate_performance_of_estimators(
        &self,
        ground_truth: f64,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
        metric: ErrorMetric,
    ) -> Result<EstimateMap<f64>> {
        metric.check_ground_truth(ground_truth)?;
        let input = self.validate(action_dist, reward_estimate)?;
        Ok(self.fan_out(|e| Ok(metric.error(e.policy_value(&input)?, ground_truth))))
    }

    /// Rank estimators by their error against `ground_truth`.
    pub fn summarize_estimators_comparison(
        &self,
        ground_truth: f64,
        action_dist: &ActionDist,
        reward_estimate: Option<&RewardEstimate>,
        metric: ErrorMetric,
    ) -> Result<EstimatorComparison> {
        let errors =
            self.evaluate_performance_of_estimators(ground_truth, action_dist, reward_estimate, metric)?;
        let mut ranking = Vec::new();
        let mut failures = BTreeMap::new();
        for (name, res) in errors {
            match res {
                Ok(err) => ranking.push((name, err)),
                Err(e) => {
                    failures.insert(name, e);
                }
            }
        }
        ranking.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(EstimatorComparison {
            metric,
            ranking,
            failures,
        })
    }
}
