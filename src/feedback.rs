//! Logged bandit feedback: what the logging policy saw, did, and observed.
//!
//! A [`BanditFeedback`] can only be obtained through [`FeedbackBuilder::build`],
//! which checks the full record schema up front. Estimators therefore never
//! re-check lengths, action ranges, or propensity positivity.

use crate::error::{OpeError, Result};
use crate::tensor::Tensor3;

/// Validated, read-only logged feedback.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BanditFeedback {
    n_rounds: usize,
    n_actions: usize,
    context: Vec<Vec<f64>>,
    action: Vec<usize>,
    reward: Vec<f64>,
    pscore: Vec<f64>,
    position: Option<Vec<usize>>,
    expected_reward: Option<Vec<Vec<f64>>>,
}

/// Unvalidated feedback fields.
///
/// Every field is optional so that a record with a missing key (for instance one
/// deserialized from JSON without `pscore`) is reported as a schema error by
/// [`build`](Self::build) instead of failing somewhere downstream.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FeedbackBuilder {
    pub n_rounds: Option<usize>,
    pub n_actions: Option<usize>,
    pub context: Option<Vec<Vec<f64>>>,
    pub action: Option<Vec<usize>>,
    pub reward: Option<Vec<f64>>,
    pub pscore: Option<Vec<f64>>,
    pub position: Option<Vec<usize>>,
    pub expected_reward: Option<Vec<Vec<f64>>>,
}

fn required<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| OpeError::schema(format!("missing required field `{name}`")))
}

fn check_len(name: &str, len: usize, n_rounds: usize) -> Result<()> {
    if len != n_rounds {
        return Err(OpeError::schema(format!(
            "`{name}` has {len} entries, expected n_rounds = {n_rounds}"
        )));
    }
    Ok(())
}

impl FeedbackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optional: when omitted, `n_rounds` is the length of `action`.
    pub fn n_rounds(mut self, n: usize) -> Self {
        self.n_rounds = Some(n);
        self
    }

    pub fn n_actions(mut self, n: usize) -> Self {
        self.n_actions = Some(n);
        self
    }

    pub fn context(mut self, context: Vec<Vec<f64>>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn action(mut self, action: Vec<usize>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn reward(mut self, reward: Vec<f64>) -> Self {
        self.reward = Some(reward);
        self
    }

    pub fn pscore(mut self, pscore: Vec<f64>) -> Self {
        self.pscore = Some(pscore);
        self
    }

    pub fn position(mut self, position: Vec<usize>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn expected_reward(mut self, expected_reward: Vec<Vec<f64>>) -> Self {
        self.expected_reward = Some(expected_reward);
        self
    }

    /// Check the schema and freeze the record.
    pub fn build(self) -> Result<BanditFeedback> {
        let n_actions = required(self.n_actions, "n_actions")?;
        let context = required(self.context, "context")?;
        let action = required(self.action, "action")?;
        let reward = required(self.reward, "reward")?;
        let pscore = required(self.pscore, "pscore")?;

        let n_rounds = self.n_rounds.unwrap_or(action.len());
        if n_rounds == 0 {
            return Err(OpeError::schema("feedback must contain at least one round"));
        }
        if n_actions == 0 {
            return Err(OpeError::schema("n_actions must be >= 1"));
        }

        check_len("context", context.len(), n_rounds)?;
        check_len("action", action.len(), n_rounds)?;
        check_len("reward", reward.len(), n_rounds)?;
        check_len("pscore", pscore.len(), n_rounds)?;

        let dim = context[0].len();
        if let Some(r) = context.iter().position(|row| row.len() != dim) {
            return Err(OpeError::schema(format!(
                "context row {r} has {} features, expected {dim}",
                context[r].len()
            )));
        }
        if context.iter().flatten().any(|x| !x.is_finite()) {
            return Err(OpeError::schema("context contains a non-finite feature"));
        }
        if let Some(r) = action.iter().position(|&a| a >= n_actions) {
            return Err(OpeError::schema(format!(
                "action[{r}] = {} is outside [0, {n_actions})",
                action[r]
            )));
        }
        if let Some(r) = reward.iter().position(|x| !x.is_finite()) {
            return Err(OpeError::schema(format!("reward[{r}] is not finite")));
        }
        if let Some(r) = pscore
            .iter()
            .position(|&p| !(p.is_finite() && p > 0.0 && p <= 1.0))
        {
            return Err(OpeError::schema(format!(
                "pscore[{r}] = {} must lie in (0, 1]",
                pscore[r]
            )));
        }
        if let Some(pos) = &self.position {
            check_len("position", pos.len(), n_rounds)?;
            if let Some(r) = pos.iter().position(|&p| p.checked_add(1).is_none()) {
                return Err(OpeError::schema(format!(
                    "position[{r}] = {} leaves no room for a slot count",
                    pos[r]
                )));
            }
        }
        if let Some(er) = &self.expected_reward {
            check_len("expected_reward", er.len(), n_rounds)?;
            for (r, row) in er.iter().enumerate() {
                if row.len() != n_actions {
                    return Err(OpeError::schema(format!(
                        "expected_reward row {r} has {} actions, expected {n_actions}",
                        row.len()
                    )));
                }
                if row.iter().any(|x| !x.is_finite()) {
                    return Err(OpeError::schema(format!(
                        "expected_reward row {r} contains a non-finite value"
                    )));
                }
            }
        }

        Ok(BanditFeedback {
            n_rounds,
            n_actions,
            context,
            action,
            reward,
            pscore,
            position: self.position,
            expected_reward: self.expected_reward,
        })
    }
}

impl BanditFeedback {
    pub fn builder() -> FeedbackBuilder {
        FeedbackBuilder::new()
    }

    pub fn n_rounds(&self) -> usize {
        self.n_rounds
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Number of slots implied by `position` (`max + 1`), or 1 when absent.
    ///
    /// `build` rejects `usize::MAX` positions, so the addition cannot overflow.
    pub fn n_positions(&self) -> usize {
        self.position
            .as_ref()
            .and_then(|p| p.iter().copied().max())
            .map_or(1, |m| m + 1)
    }

    /// The `(n_rounds, n_actions, n_positions)` shape every tensor must match.
    pub fn tensor_shape(&self) -> (usize, usize, usize) {
        (self.n_rounds, self.n_actions, self.n_positions())
    }

    pub fn context(&self) -> &[Vec<f64>] {
        &self.context
    }

    pub fn action(&self) -> &[usize] {
        &self.action
    }

    pub fn reward(&self) -> &[f64] {
        &self.reward
    }

    pub fn pscore(&self) -> &[f64] {
        &self.pscore
    }

    pub fn position(&self) -> Option<&[usize]> {
        self.position.as_deref()
    }

    /// Slot of round `r` (0 when the record is single-position).
    #[inline]
    pub fn position_at(&self, r: usize) -> usize {
        self.position.as_ref().map_or(0, |p| p[r])
    }

    /// Ground-truth expected rewards, for synthetic validation only.
    pub fn expected_reward(&self) -> Option<&[Vec<f64>]> {
        self.expected_reward.as_deref()
    }

    /// Mean observed reward of the logging policy (its on-policy value).
    pub fn mean_reward(&self) -> f64 {
        crate::estimator::mean(&self.reward)
    }

    /// Ground-truth value of a candidate policy computed from `expected_reward`.
    ///
    /// Returns `None` when the record carries no `expected_reward`. Each round
    /// uses the candidate's distribution at that round's logged position.
    pub fn ground_truth_value(&self, action_dist: &Tensor3) -> Result<Option<f64>> {
        let Some(er) = &self.expected_reward else {
            return Ok(None);
        };
        action_dist.check_shape("action_dist", self.tensor_shape())?;
        let per_round: Vec<f64> = er
            .iter()
            .enumerate()
            .map(|(r, row)| {
                let p = self.position_at(r);
                action_dist
                    .actions_at(r, p)
                    .zip(row)
                    .map(|(pi, q)| pi * q)
                    .sum::<f64>()
            })
            .collect();
        Ok(Some(crate::estimator::mean(&per_round)))
    }
}
