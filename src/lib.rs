//! `offpolicy`: off-policy evaluation (OPE) for logged contextual-bandit feedback.
//!
//! Estimate how a candidate policy *would have* performed using only data
//! logged by a different, historical policy. The crate consumes
//! already-computed arrays:
//!
//! - a [`BanditFeedback`] record (context, logged action, reward, propensity),
//! - the candidate's [`ActionDist`] (`rounds × actions × positions`),
//! - optionally a [`RewardEstimate`] from an external regression model,
//!
//! and never trains, samples policies, or generates data itself.
//!
//! **Estimators** (all implement [`OpeEstimator`]):
//! - [`ReplayMethod`] (`rm`): rounds where the logged action matches a deterministic candidate.
//! - [`DirectMethod`] (`dm`): expectation of the reward model under the candidate.
//! - [`InverseProbabilityWeighting`] (`ipw`, clipped: `ipw-clipped`).
//! - [`SelfNormalizedIpw`] (`snipw`).
//! - [`DoublyRobust`] (`dr`, clipped: `dr-clipped`).
//! - [`SelfNormalizedDr`] (`sndr`).
//! - [`SwitchIpw`] / [`SwitchDr`] (`switch-ipw`, `switch-dr`): fall back to DM above a weight threshold.
//! - [`DoublyRobustWithShrinkage`] (`dr-os`): shrink weights instead of truncating them.
//!
//! **Orchestration:** [`OffPolicyEvaluation`] validates inputs once, runs every
//! estimator, and reports point estimates, [`bootstrap_interval`] confidence
//! intervals, and estimation errors keyed by estimator name.
//!
//! **Goals:**
//! - **Deterministic given a seed**: bootstrap resampling uses an explicit, seeded RNG.
//! - **No silent NaN**: non-finite weights are clipped or reported, per [`WeightClipping`].
//! - **Fail fast**: schema and configuration errors surface before any estimator runs;
//!   per-estimator failures are isolated in that estimator's result.
//!
//! ```rust
//! use offpolicy::{
//!     BanditFeedback, BootstrapConfig, DirectMethod, DoublyRobust, InverseProbabilityWeighting,
//!     OffPolicyEvaluation, OpeEstimator, Tensor3,
//! };
//!
//! let feedback = BanditFeedback::builder()
//!     .n_actions(2)
//!     .context(vec![vec![0.1], vec![0.9], vec![0.4]])
//!     .action(vec![0, 1, 1])
//!     .reward(vec![1.0, 0.0, 1.0])
//!     .pscore(vec![0.5, 0.5, 0.5])
//!     .build()
//!     .unwrap();
//! let candidate = Tensor3::uniform(3, 2, 1).unwrap();
//! let q_hat = Tensor3::from_rows(vec![vec![0.6, 0.4]; 3]).unwrap();
//!
//! let estimators: Vec<Box<dyn OpeEstimator>> = vec![
//!     Box::new(InverseProbabilityWeighting::new()),
//!     Box::new(DirectMethod::new()),
//!     Box::new(DoublyRobust::new()),
//! ];
//! let ope = OffPolicyEvaluation::new(feedback, estimators).unwrap();
//!
//! let values = ope.estimate_policy_values(&candidate, Some(&q_hat)).unwrap();
//! assert_eq!(values.len(), 3);
//!
//! let cfg = BootstrapConfig::default().with_seed(12345);
//! let intervals = ope.estimate_intervals(&candidate, Some(&q_hat), &cfg).unwrap();
//! let dr = intervals["dr"].as_ref().unwrap();
//! assert!(dr.lower <= dr.mean && dr.mean <= dr.upper);
//! ```

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod tensor;
pub use tensor::*;

mod feedback;
pub use feedback::*;

mod bootstrap;
pub use bootstrap::*;

mod estimator;
pub use estimator::*;

mod replay;
pub use replay::*;

mod direct;
pub use direct::*;

mod ipw;
pub use ipw::*;

mod doubly_robust;
pub use doubly_robust::*;

mod evaluation;
pub use evaluation::*;

/// Every estimator variant with its default configuration, in a stable order.
///
/// Useful for side-by-side comparisons; the reward-model estimators need a
/// [`RewardEstimate`] at call time.
pub fn all_estimators() -> Vec<Box<dyn OpeEstimator>> {
    vec![
        Box::new(ReplayMethod::new()),
        Box::new(DirectMethod::new()),
        Box::new(InverseProbabilityWeighting::new()),
        Box::new(SelfNormalizedIpw::new()),
        Box::new(DoublyRobust::new()),
        Box::new(SelfNormalizedDr::new()),
        Box::new(SwitchIpw::default()),
        Box::new(SwitchDr::default()),
        Box::new(DoublyRobustWithShrinkage::default()),
    ]
}
