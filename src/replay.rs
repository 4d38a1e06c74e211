//! Replay method: keep only the rounds where the logging policy happened to
//! take the action a deterministic candidate policy would take.
//!
//! This is a restricted estimator. It only makes sense for deterministic
//! candidates and, under a uniform logging policy, is unbiased; otherwise it is
//! mainly a sanity baseline.

use crate::error::Result;
use crate::estimator::{OpeEstimator, RoundInput};
use crate::tensor::DISTRIBUTION_TOL;

/// Replay method (`rm`).
///
/// Per round: `1{pi_e(a_i) = 1} * r_i / mean(1{pi_e(a_j) = 1})`, so the mean
/// of the sequence is the average reward over matching rounds. When no round
/// matches, every value is `0.0`.
#[derive(Debug, Clone)]
pub struct ReplayMethod {
    name: String,
}

impl Default for ReplayMethod {
    fn default() -> Self {
        Self {
            name: "rm".to_string(),
        }
    }
}

impl ReplayMethod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl OpeEstimator for ReplayMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        false
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let reward = input.feedback().reward();
        let matched: Vec<bool> = (0..input.n_rounds())
            .map(|r| input.candidate_prob(r) >= 1.0 - DISTRIBUTION_TOL)
            .collect();
        let n_matched = matched.iter().filter(|&&m| m).count();
        if n_matched == 0 {
            tracing::debug!(
                estimator = self.name.as_str(),
                "no logged action matches the candidate's deterministic choice"
            );
            return Ok(vec![0.0; input.n_rounds()]);
        }
        let match_rate = n_matched as f64 / input.n_rounds() as f64;
        Ok(matched
            .iter()
            .zip(reward)
            .map(|(&m, &r)| if m { r / match_rate } else { 0.0 })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::BanditFeedback;
    use crate::tensor::Tensor3;

    fn feedback() -> BanditFeedback {
        BanditFeedback::builder()
            .n_actions(2)
            .context(vec![vec![0.0]; 4])
            .action(vec![0, 1, 0, 1])
            .reward(vec![1.0, 0.0, 0.5, 1.0])
            .pscore(vec![0.5; 4])
            .build()
            .unwrap()
    }

    #[test]
    fn averages_reward_over_matching_rounds() {
        let fb = feedback();
        let always_zero = Tensor3::from_rows(vec![vec![1.0, 0.0]; 4]).unwrap();
        let v = ReplayMethod::new()
            .estimate_policy_value(&fb, &always_zero, None)
            .unwrap();
        assert!((v - 0.75).abs() < 1e-12);
    }

    #[test]
    fn stochastic_candidate_matches_nothing() {
        let fb = feedback();
        let uniform = Tensor3::uniform(4, 2, 1).unwrap();
        let input = RoundInput::new(&fb, &uniform, None).unwrap();
        let rounds = ReplayMethod::new().estimate_round_rewards(&input).unwrap();
        assert_eq!(rounds, vec![0.0; 4]);
    }
}
