//! Tree-structured Parzen estimator
//!
//! After a random start-up phase, completed trials are split into the best
//! `gamma` fraction ("good") and the rest ("bad"). Per parameter a Parzen
//! estimator of truncated Gaussians is fit to each group in sampling space
//! (log space for log ranges); candidates are drawn from the good estimator
//! and the one maximizing `l(x) / g(x)` is proposed.

use churn_core::config::ParamRange;
use churn_core::ParamMap;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal as Gaussian};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::debug;

use super::sampler::{from_internal, internal_bounds, sample_uniform, to_internal, Sampler, SearchSpace};
use super::TrialRecord;

#[derive(Clone, Debug, PartialEq)]
pub struct TpeConfig {
    /// Trials proposed at random before the estimators take over
    pub n_startup_trials: usize,
    /// Fraction of completed trials treated as good
    pub gamma: f64,
    /// Candidates drawn from the good estimator per parameter
    pub n_ei_candidates: usize,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            n_startup_trials: 10,
            gamma: 0.25,
            n_ei_candidates: 24,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TpeSampler {
    config: TpeConfig,
    /// Completed trials in observation order
    history: Vec<(ParamMap, f64)>,
}

impl TpeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TpeConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
        }
    }

    /// Good / bad split of the history; best scores first, ties by age
    fn split_history(&self) -> (Vec<&ParamMap>, Vec<&ParamMap>) {
        let mut ranked: Vec<&(ParamMap, f64)> = self.history.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let n_good = ((self.config.gamma * ranked.len() as f64).ceil() as usize).clamp(1, ranked.len());
        let good = ranked[..n_good].iter().map(|(p, _)| p).collect();
        let bad = ranked[n_good..].iter().map(|(p, _)| p).collect();
        (good, bad)
    }

    fn propose_param(
        &self,
        name: &str,
        range: &ParamRange,
        good: &[&ParamMap],
        bad: &[&ParamMap],
        rng: &mut StdRng,
    ) -> churn_core::ParamValue {
        let (low, high) = internal_bounds(range);
        if high <= low {
            return from_internal(range, low);
        }

        let observed = |group: &[&ParamMap]| -> Vec<f64> {
            group
                .iter()
                .filter_map(|params| params.get(name).and_then(|v| to_internal(range, v)))
                .filter(|x| x.is_finite())
                .collect()
        };
        let below = ParzenEstimator::fit(&observed(good), low, high);
        let above = ParzenEstimator::fit(&observed(bad), low, high);

        let mut best: Option<(f64, f64)> = None;
        for _ in 0..self.config.n_ei_candidates.max(1) {
            let x = below.sample(rng);
            let score = below.log_pdf(x) - above.log_pdf(x);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((x, score));
            }
        }

        match best {
            Some((x, _)) => from_internal(range, x),
            None => sample_uniform(range, rng),
        }
    }
}

impl Sampler for TpeSampler {
    fn name(&self) -> &'static str {
        "tpe"
    }

    fn propose(&mut self, space: &SearchSpace, rng: &mut StdRng) -> ParamMap {
        if self.history.len() < self.config.n_startup_trials.max(1) {
            return space
                .iter()
                .map(|(name, range)| (name.clone(), sample_uniform(range, &mut *rng)))
                .collect();
        }

        let (good, bad) = self.split_history();
        debug!(
            good = good.len(),
            bad = bad.len(),
            "TPE proposal from {} completed trials",
            self.history.len()
        );

        space
            .iter()
            .map(|(name, range)| (name.clone(), self.propose_param(name, range, &good, &bad, rng)))
            .collect()
    }

    fn observe(&mut self, trial: &TrialRecord) {
        if trial.is_complete() && trial.score.is_finite() {
            self.history.push((trial.params.clone(), trial.score));
        }
    }
}

/// Equal-weight mixture of truncated Gaussians plus a wide prior component
#[derive(Clone, Debug)]
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    low: f64,
    high: f64,
}

impl ParzenEstimator {
    fn fit(points: &[f64], low: f64, high: f64) -> Self {
        let width = high - low;
        let prior_mu = 0.5 * (low + high);

        let mut mus: Vec<f64> = points.to_vec();
        mus.push(prior_mu);
        mus.sort_by(f64::total_cmp);

        // Bandwidth: larger gap to a neighbour, clipped to the range
        let min_sigma = width / (100.0f64).min(1.0 + mus.len() as f64);
        let sigmas = (0..mus.len())
            .map(|i| {
                if mus[i] == prior_mu && !points.contains(&prior_mu) {
                    return width;
                }
                let left = if i == 0 { mus[i] - low } else { mus[i] - mus[i - 1] };
                let right = if i + 1 == mus.len() { high - mus[i] } else { mus[i + 1] - mus[i] };
                left.max(right).clamp(min_sigma, width)
            })
            .collect();

        Self { mus, sigmas, low, high }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let k = rng.gen_range(0..self.mus.len());
        let (mu, sigma) = (self.mus[k], self.sigmas[k]);
        let Ok(gaussian) = Gaussian::new(mu, sigma) else {
            return mu.clamp(self.low, self.high);
        };
        for _ in 0..32 {
            let x = gaussian.sample(rng);
            if x >= self.low && x <= self.high {
                return x;
            }
        }
        mu.clamp(self.low, self.high)
    }

    /// Log density of the mixture, each component renormalized to `[low, high]`
    fn log_pdf(&self, x: f64) -> f64 {
        let density: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .filter_map(|(&mu, &sigma)| Normal::new(mu, sigma).ok())
            .map(|normal| {
                let mass = normal.cdf(self.high) - normal.cdf(self.low);
                normal.pdf(x) / mass.max(1e-12)
            })
            .sum::<f64>()
            / self.mus.len() as f64;
        density.max(f64::MIN_POSITIVE).ln()
    }
}
