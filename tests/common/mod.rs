//! Synthetic logged-feedback fixtures shared by the integration tests.

#![allow(dead_code)]

use offpolicy::{BanditFeedback, Tensor3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Logged data plus everything needed to check estimators against the truth.
pub struct Synthetic {
    pub feedback: BanditFeedback,
    /// `q(x_i, a)` as a single-position tensor (a perfectly specified reward model).
    pub expected_reward: Tensor3,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn sample_index(rng: &mut StdRng, probs: &[f64]) -> usize {
    let u = rng.random::<f64>();
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    probs.len() - 1
}

/// Contextual bandit data with a logistic reward model and a softmax logging
/// policy mixed with 30% uniform exploration (so weights stay bounded).
///
/// With `noisy_rewards = false` the logged reward equals the expected reward
/// of the logged action; otherwise it is a Bernoulli draw with that mean.
pub fn synthetic_bandit_feedback(
    n_rounds: usize,
    n_actions: usize,
    dim: usize,
    noisy_rewards: bool,
    seed: u64,
) -> Synthetic {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();

    let theta: Vec<Vec<f64>> = (0..n_actions)
        .map(|_| (0..dim).map(|_| normal.sample(&mut rng)).collect())
        .collect();
    let beta: Vec<Vec<f64>> = (0..n_actions)
        .map(|_| (0..dim).map(|_| normal.sample(&mut rng)).collect())
        .collect();
    let bias: Vec<f64> = (0..n_actions).map(|_| normal.sample(&mut rng)).collect();

    let mut context = Vec::with_capacity(n_rounds);
    let mut action = Vec::with_capacity(n_rounds);
    let mut reward = Vec::with_capacity(n_rounds);
    let mut pscore = Vec::with_capacity(n_rounds);
    let mut expected = Vec::with_capacity(n_rounds);

    for _ in 0..n_rounds {
        let x: Vec<f64> = (0..dim).map(|_| normal.sample(&mut rng)).collect();
        let dot = |w: &[f64]| w.iter().zip(&x).map(|(a, b)| a * b).sum::<f64>();

        let q: Vec<f64> = (0..n_actions)
            .map(|a| sigmoid(dot(&theta[a]) + bias[a]))
            .collect();

        let logits: Vec<f64> = beta.iter().map(|b| dot(b)).collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let z: f64 = exp.iter().sum();
        let k = n_actions as f64;
        let probs: Vec<f64> = exp.iter().map(|e| 0.7 * e / z + 0.3 / k).collect();

        let a = sample_index(&mut rng, &probs);
        let r = if noisy_rewards {
            if rng.random::<f64>() < q[a] {
                1.0
            } else {
                0.0
            }
        } else {
            q[a]
        };

        context.push(x);
        action.push(a);
        reward.push(r);
        pscore.push(probs[a]);
        expected.push(q);
    }

    let expected_reward = Tensor3::from_rows(expected.clone()).unwrap();
    let feedback = BanditFeedback::builder()
        .n_actions(n_actions)
        .context(context)
        .action(action)
        .reward(reward)
        .pscore(pscore)
        .expected_reward(expected)
        .build()
        .unwrap();

    Synthetic {
        feedback,
        expected_reward,
    }
}

/// A small random problem with strictly positive candidate probabilities.
///
/// Returns `(feedback, action_dist, reward_estimate)`.
pub fn random_problem(
    n_rounds: usize,
    n_actions: usize,
    seed: u64,
) -> (BanditFeedback, Tensor3, Tensor3) {
    let mut rng = StdRng::seed_from_u64(seed);
    let action: Vec<usize> = (0..n_rounds)
        .map(|_| rng.random_range(0..n_actions))
        .collect();
    let reward: Vec<f64> = (0..n_rounds).map(|_| rng.random_range(-1.0..2.0)).collect();
    let pscore: Vec<f64> = (0..n_rounds).map(|_| rng.random_range(0.05..=1.0)).collect();

    let mut dist = Vec::with_capacity(n_rounds);
    for _ in 0..n_rounds {
        let raw: Vec<f64> = (0..n_actions).map(|_| rng.random_range(0.01..1.0)).collect();
        let z: f64 = raw.iter().sum();
        dist.push(raw.into_iter().map(|x| x / z).collect::<Vec<f64>>());
    }
    let q: Vec<Vec<f64>> = (0..n_rounds)
        .map(|_| (0..n_actions).map(|_| rng.random_range(-1.0..2.0)).collect())
        .collect();

    let feedback = BanditFeedback::builder()
        .n_actions(n_actions)
        .context(vec![Vec::new(); n_rounds])
        .action(action)
        .reward(reward)
        .pscore(pscore)
        .build()
        .unwrap();

    (
        feedback,
        Tensor3::from_rows(dist).unwrap(),
        Tensor3::from_rows(q).unwrap(),
    )
}
