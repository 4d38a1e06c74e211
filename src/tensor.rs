//! Dense `rounds × actions × positions` tensors.
//!
//! Both the candidate policy's action distribution and the (optional) reward
//! model output share this shape, so one type serves both. Storage is a flat,
//! row-major `Vec<f64>` with the position axis innermost.

use crate::error::{OpeError, Result};

/// Tolerance used when checking that an action-distribution slice sums to 1.
pub const DISTRIBUTION_TOL: f64 = 1e-6;

/// A dense 3-d tensor indexed by `(round, action, position)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    n_rounds: usize,
    n_actions: usize,
    n_positions: usize,
    data: Vec<f64>,
}

/// What the candidate policy would do: `[r, :, p]` is a distribution over actions.
pub type ActionDist = Tensor3;

/// Reward-model predictions `q̂(round, action, position)`.
pub type RewardEstimate = Tensor3;

fn element_count(n_rounds: usize, n_actions: usize, n_positions: usize) -> Result<usize> {
    n_rounds
        .checked_mul(n_actions)
        .and_then(|x| x.checked_mul(n_positions))
        .ok_or_else(|| OpeError::schema("tensor shape overflows usize"))
}

impl Tensor3 {
    /// Build from flat row-major data (`(r * n_actions + a) * n_positions + p`).
    pub fn from_flat(
        n_rounds: usize,
        n_actions: usize,
        n_positions: usize,
        data: Vec<f64>,
    ) -> Result<Self> {
        if n_rounds == 0 || n_actions == 0 || n_positions == 0 {
            return Err(OpeError::schema(format!(
                "tensor dimensions must be >= 1, got ({n_rounds}, {n_actions}, {n_positions})"
            )));
        }
        let expected = element_count(n_rounds, n_actions, n_positions)?;
        if data.len() != expected {
            return Err(OpeError::schema(format!(
                "tensor data has {} entries, shape ({n_rounds}, {n_actions}, {n_positions}) needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            n_rounds,
            n_actions,
            n_positions,
            data,
        })
    }

    /// Build from nested `[round][action][position]` vectors.
    pub fn from_nested(nested: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        let n_rounds = nested.len();
        let n_actions = nested.first().map(Vec::len).unwrap_or(0);
        let n_positions = nested
            .first()
            .and_then(|r| r.first())
            .map(Vec::len)
            .unwrap_or(0);
        let mut data = Vec::with_capacity(n_rounds * n_actions * n_positions);
        for (r, row) in nested.into_iter().enumerate() {
            if row.len() != n_actions {
                return Err(OpeError::schema(format!(
                    "round {r} has {} actions, expected {n_actions}",
                    row.len()
                )));
            }
            for (a, cell) in row.into_iter().enumerate() {
                if cell.len() != n_positions {
                    return Err(OpeError::schema(format!(
                        "round {r}, action {a} has {} positions, expected {n_positions}",
                        cell.len()
                    )));
                }
                data.extend(cell);
            }
        }
        Self::from_flat(n_rounds, n_actions, n_positions, data)
    }

    /// Single-position convenience: `rows[r][a]` becomes `[r, a, 0]`.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rounds = rows.len();
        let n_actions = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(n_rounds * n_actions);
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != n_actions {
                return Err(OpeError::schema(format!(
                    "round {r} has {} actions, expected {n_actions}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Self::from_flat(n_rounds, n_actions, 1, data)
    }

    /// The uniformly random policy over `n_actions` at every round and position.
    pub fn uniform(n_rounds: usize, n_actions: usize, n_positions: usize) -> Result<Self> {
        let len = element_count(n_rounds, n_actions, n_positions)?;
        let p = 1.0 / (n_actions.max(1) as f64);
        Self::from_flat(n_rounds, n_actions, n_positions, vec![p; len])
    }

    pub fn n_rounds(&self) -> usize {
        self.n_rounds
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    pub fn n_positions(&self) -> usize {
        self.n_positions
    }

    /// `(n_rounds, n_actions, n_positions)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_rounds, self.n_actions, self.n_positions)
    }

    /// Raw row-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Entry at `(round, action, position)`. Panics when out of bounds.
    #[inline]
    pub fn at(&self, round: usize, action: usize, position: usize) -> f64 {
        debug_assert!(round < self.n_rounds && action < self.n_actions);
        debug_assert!(position < self.n_positions);
        self.data[(round * self.n_actions + action) * self.n_positions + position]
    }

    /// The `[round, :, position]` slice, in action order.
    pub fn actions_at(&self, round: usize, position: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.n_actions).map(move |a| self.at(round, a, position))
    }

    /// Expectation of `values[round, :, position]` under `self[round, :, position]`.
    pub(crate) fn expectation_of(&self, values: &Tensor3, round: usize, position: usize) -> f64 {
        self.actions_at(round, position)
            .zip(values.actions_at(round, position))
            .map(|(p, v)| p * v)
            .sum()
    }

    /// Fail unless the shape is exactly `expected`.
    pub(crate) fn check_shape(&self, what: &str, expected: (usize, usize, usize)) -> Result<()> {
        if self.shape() != expected {
            return Err(OpeError::schema(format!(
                "{what} has shape {:?}, expected {:?} (n_rounds, n_actions, n_positions)",
                self.shape(),
                expected
            )));
        }
        Ok(())
    }

    /// Fail on any NaN or infinite entry.
    pub(crate) fn check_finite(&self, what: &str) -> Result<()> {
        if let Some(i) = self.data.iter().position(|x| !x.is_finite()) {
            return Err(OpeError::schema(format!(
                "{what} has a non-finite entry at flat index {i}"
            )));
        }
        Ok(())
    }

    /// Fail unless every `[r, :, p]` slice is a probability distribution.
    pub(crate) fn check_distribution(&self, what: &str) -> Result<()> {
        self.check_finite(what)?;
        for r in 0..self.n_rounds {
            for p in 0..self.n_positions {
                let mut sum = 0.0;
                for (a, x) in self.actions_at(r, p).enumerate() {
                    if x < 0.0 {
                        return Err(OpeError::schema(format!(
                            "{what}[{r}, {a}, {p}] = {x} is negative"
                        )));
                    }
                    sum += x;
                }
                if (sum - 1.0).abs() > DISTRIBUTION_TOL {
                    return Err(OpeError::schema(format!(
                        "{what}[{r}, :, {p}] sums to {sum}, expected 1"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_puts_position_innermost() {
        let t = Tensor3::from_flat(2, 2, 2, (0..8).map(f64::from).collect()).unwrap();
        assert_eq!(t.at(0, 0, 1), 1.0);
        assert_eq!(t.at(0, 1, 0), 2.0);
        assert_eq!(t.at(1, 0, 0), 4.0);
        assert_eq!(t.at(1, 1, 1), 7.0);
    }

    #[test]
    fn nested_and_rows_agree_for_single_position() {
        let rows = vec![vec![0.2, 0.8], vec![0.5, 0.5]];
        let nested = rows
            .iter()
            .map(|r| r.iter().map(|&x| vec![x]).collect())
            .collect();
        let a = Tensor3::from_rows(rows).unwrap();
        let b = Tensor3::from_nested(nested).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), (2, 2, 1));
    }

    #[test]
    fn ragged_input_is_rejected() {
        let err = Tensor3::from_rows(vec![vec![0.5, 0.5], vec![1.0]]).unwrap_err();
        assert!(matches!(err, OpeError::Schema(_)));
        assert!(Tensor3::from_flat(2, 2, 1, vec![0.0; 3]).is_err());
        assert!(Tensor3::from_flat(0, 2, 1, vec![]).is_err());
    }

    #[test]
    fn overflowing_shape_is_rejected_before_allocating() {
        let err = Tensor3::uniform(usize::MAX, 2, 2).unwrap_err();
        assert_eq!(err, OpeError::schema("tensor shape overflows usize"));
    }

    #[test]
    fn distribution_check_catches_bad_slices() {
        assert!(Tensor3::uniform(3, 4, 2)
            .unwrap()
            .check_distribution("action_dist")
            .is_ok());

        let not_normalized = Tensor3::from_rows(vec![vec![0.5, 0.4]]).unwrap();
        assert!(not_normalized.check_distribution("action_dist").is_err());

        let negative = Tensor3::from_rows(vec![vec![1.5, -0.5]]).unwrap();
        assert!(negative.check_distribution("action_dist").is_err());

        let nan = Tensor3::from_rows(vec![vec![f64::NAN, 1.0]]).unwrap();
        assert!(nan.check_distribution("action_dist").is_err());
    }

    #[test]
    fn expectation_weights_values_by_probabilities() {
        let pi = Tensor3::from_rows(vec![vec![0.25, 0.75]]).unwrap();
        let q = Tensor3::from_rows(vec![vec![1.0, 3.0]]).unwrap();
        assert!((pi.expectation_of(&q, 0, 0) - 2.5).abs() < 1e-12);
    }
}
