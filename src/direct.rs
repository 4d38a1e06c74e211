//! Direct method: trust the reward model, ignore logged rewards.

use crate::error::Result;
use crate::estimator::{OpeEstimator, RoundInput};

/// Direct method (`dm`).
///
/// Per round: `DM_i = sum_a pi_e(a | i, p_i) * q_hat(i, a, p_i)`. Low variance,
/// but biased whenever the reward model is misspecified.
#[derive(Debug, Clone)]
pub struct DirectMethod {
    name: String,
}

impl Default for DirectMethod {
    fn default() -> Self {
        Self {
            name: "dm".to_string(),
        }
    }
}

impl DirectMethod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl OpeEstimator for DirectMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_reward_estimate(&self) -> bool {
        true
    }

    fn estimate_round_rewards(&self, input: &RoundInput<'_>) -> Result<Vec<f64>> {
        let q = input.require_reward_estimate(&self.name)?;
        Ok(input.direct_terms(q))
    }
}
