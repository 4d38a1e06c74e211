//! Nonparametric bootstrap confidence intervals.
//!
//! Notes:
//! - The RNG is an explicit, seedable `StdRng` created per call, so two
//!   intervals never share resampling state.
//! - A fixed seed gives bit-identical bounds for the same input sequence.
//! - `seed: None` draws a fresh seed from the OS.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::error::{OpeError, Result};
use crate::estimator::mean;

/// Configuration for bootstrap intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BootstrapConfig {
    /// Significance level in `(0, 1)`; the interval covers `1 - alpha`.
    pub alpha: f64,
    /// Number of resamples (must be >= 1).
    pub n_bootstrap: usize,
    /// Seed for the resampling RNG.
    pub seed: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            n_bootstrap: 10_000,
            seed: None,
        }
    }
}

impl BootstrapConfig {
    /// Create and validate a configuration.
    pub fn new(alpha: f64, n_bootstrap: usize, seed: Option<u64>) -> Result<Self> {
        let cfg = Self {
            alpha,
            n_bootstrap,
            seed,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Same configuration with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(OpeError::config(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.n_bootstrap == 0 {
            return Err(OpeError::config("n_bootstrap must be >= 1"));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

/// A point estimate with its bootstrap percentile interval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    /// Mean of the original per-round sequence (the point estimate).
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
    /// Significance level the bounds were computed at.
    pub alpha: f64,
}

impl Interval {
    /// Coverage in percent, e.g. `95.0`.
    pub fn confidence_percent(&self) -> f64 {
        100.0 * (1.0 - self.alpha)
    }

    /// Report label for the lower bound, e.g. `"95.0% CI (lower)"`.
    pub fn lower_label(&self) -> String {
        format!("{:.1}% CI (lower)", self.confidence_percent())
    }

    /// Report label for the upper bound, e.g. `"95.0% CI (upper)"`.
    pub fn upper_label(&self) -> String {
        format!("{:.1}% CI (upper)", self.confidence_percent())
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lower <= x && x <= self.upper
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mean={:.6} {}={:.6} {}={:.6}",
            self.mean,
            self.lower_label(),
            self.lower,
            self.upper_label(),
            self.upper
        )
    }
}

/// Empirical percentile of an ascending slice, `q` in `[0, 1]`.
///
/// Linear interpolation between the two nearest order statistics.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let last = sorted.len() - 1;
    let h = q.clamp(0.0, 1.0) * last as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(last);
    let frac = h - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Bootstrap percentile interval for the mean of `samples`.
///
/// `mean` is the mean of `samples` itself, never of the resampled means, and
/// the bounds are widened to contain it when resampling puts it outside.
pub fn bootstrap_interval(samples: &[f64], cfg: &BootstrapConfig) -> Result<Interval> {
    cfg.validate()?;
    if samples.is_empty() {
        return Err(OpeError::schema(
            "cannot bootstrap an empty per-round sequence",
        ));
    }
    if samples.iter().any(|x| !x.is_finite()) {
        return Err(OpeError::schema(
            "cannot bootstrap a sequence with non-finite values",
        ));
    }

    let n = samples.len();
    let point = mean(samples);
    let mut rng = cfg.rng();
    let mut means = Vec::with_capacity(cfg.n_bootstrap);
    for _ in 0..cfg.n_bootstrap {
        let mut sum = 0.0;
        for _ in 0..n {
            sum += samples[rng.random_range(0..n)];
        }
        means.push(sum / n as f64);
    }
    means.sort_by(f64::total_cmp);

    let mut lower = percentile_sorted(&means, cfg.alpha / 2.0);
    let mut upper = percentile_sorted(&means, 1.0 - cfg.alpha / 2.0);
    if point < lower || point > upper {
        tracing::debug!(
            point,
            lower,
            upper,
            n_bootstrap = cfg.n_bootstrap,
            "bootstrap interval widened to contain the point estimate"
        );
        lower = lower.min(point);
        upper = upper.max(point);
    }

    Ok(Interval {
        mean: point,
        lower,
        upper,
        alpha: cfg.alpha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seeded(n_bootstrap: usize, seed: u64) -> BootstrapConfig {
        BootstrapConfig::new(0.05, n_bootstrap, Some(seed)).unwrap()
    }

    #[test]
    fn single_sample_collapses_to_a_point() {
        let ci = bootstrap_interval(&[0.37], &seeded(200, 1)).unwrap();
        assert_eq!(ci.mean, 0.37);
        assert_eq!(ci.lower, 0.37);
        assert_eq!(ci.upper, 0.37);
    }

    #[test]
    fn constant_sequence_has_zero_width() {
        let ci = bootstrap_interval(&[2.0; 50], &seeded(100, 9)).unwrap();
        assert_eq!(ci.width(), 0.0);
        assert_eq!(ci.mean, 2.0);
    }

    #[test]
    fn same_seed_same_bounds() {
        let xs: Vec<f64> = (0..40).map(|i| ((i * 37) % 11) as f64 / 10.0).collect();
        let a = bootstrap_interval(&xs, &seeded(500, 42)).unwrap();
        let b = bootstrap_interval(&xs, &seeded(500, 42)).unwrap();
        assert_eq!(a.lower.to_bits(), b.lower.to_bits());
        assert_eq!(a.upper.to_bits(), b.upper.to_bits());
    }

    #[test]
    fn wider_alpha_gives_narrower_interval() {
        let xs: Vec<f64> = (0..100).map(|i| (i % 7) as f64).collect();
        let wide = bootstrap_interval(&xs, &BootstrapConfig::new(0.01, 2_000, Some(3)).unwrap())
            .unwrap();
        let narrow = bootstrap_interval(&xs, &BootstrapConfig::new(0.5, 2_000, Some(3)).unwrap())
            .unwrap();
        assert!(narrow.width() <= wide.width());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(BootstrapConfig::new(0.0, 10, None).is_err());
        assert!(BootstrapConfig::new(1.0, 10, None).is_err());
        assert!(BootstrapConfig::new(f64::NAN, 10, None).is_err());
        assert!(BootstrapConfig::new(0.05, 0, None).is_err());
        assert!(matches!(
            bootstrap_interval(&[], &BootstrapConfig::default()),
            Err(OpeError::Schema(_))
        ));
    }

    #[test]
    fn labels_follow_confidence_level() {
        let ci = bootstrap_interval(&[1.0, 2.0], &seeded(10, 0)).unwrap();
        assert_eq!(ci.lower_label(), "95.0% CI (lower)");
        assert_eq!(ci.upper_label(), "95.0% CI (upper)");
    }

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let s = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_sorted(&s, 0.0), 0.0);
        assert_eq!(percentile_sorted(&s, 1.0), 4.0);
        assert!((percentile_sorted(&s, 0.5) - 2.0).abs() < 1e-12);
        assert!((percentile_sorted(&s, 0.125) - 0.5).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn interval_always_brackets_the_mean(
            xs in prop::collection::vec(-100.0f64..100.0, 1..40),
            seed in any::<u64>(),
            n_bootstrap in 1usize..200,
        ) {
            let ci = bootstrap_interval(&xs, &seeded(n_bootstrap, seed)).unwrap();
            prop_assert_eq!(ci.mean.to_bits(), mean(&xs).to_bits());
            prop_assert!(ci.lower <= ci.mean && ci.mean <= ci.upper,
                "lower={} mean={} upper={}", ci.lower, ci.mean, ci.upper);
        }
    }
}
