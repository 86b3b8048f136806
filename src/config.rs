//! Sampler configuration and prior hyperparameters.

use crate::error::{ModelError, Result};

/// Options controlling the posterior sampler.
///
/// Defaults match a long production run: 4 chains of 2000 warm-up sweeps followed by
/// 4000 draws, the first 500 of which are discarded as additional burn-in.
///
/// # Example
/// ```
/// use multilevel_regression::SamplerConfig;
///
/// let config = SamplerConfig::default()
///     .with_draws(1000)
///     .with_tune(500)
///     .with_chains(2)
///     .with_target_accept(0.85)
///     .with_burn(100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerConfig {
    /// Retained sweeps per chain after warm-up.
    pub draws: usize,
    /// Warm-up sweeps per chain; used for step-size adaptation and then discarded.
    pub tune: usize,
    /// Number of independent chains.
    pub chains: usize,
    /// Worker threads used to run chains concurrently.
    pub cores: usize,
    /// Step-size acceptance target on the gradient-sampler scale (0.8 to 0.95).
    ///
    /// [`MetropolisWithinGibbs`](crate::MetropolisWithinGibbs) rescales it to a
    /// per-coordinate random-walk target, see
    /// [`coordinate_target`](crate::sampler::coordinate_target).
    pub target_accept: f64,
    /// Draws discarded from the start of every chain after sampling.
    pub burn: usize,
    /// Base seed; chain `i` is seeded with `seed + i`.
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 4000,
            tune: 2000,
            chains: 4,
            cores: 4,
            target_accept: 0.8,
            burn: 500,
            seed: 42,
        }
    }
}

impl SamplerConfig {
    pub fn with_draws(mut self, draws: usize) -> Self {
        self.draws = draws;
        self
    }

    pub fn with_tune(mut self, tune: usize) -> Self {
        self.tune = tune;
        self
    }

    pub fn with_chains(mut self, chains: usize) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    pub fn with_target_accept(mut self, target_accept: f64) -> Self {
        self.target_accept = target_accept;
        self
    }

    pub fn with_burn(mut self, burn: usize) -> Self {
        self.burn = burn;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of draws each chain contributes to the stored trace.
    pub fn retained_per_chain(&self) -> usize {
        self.draws.saturating_sub(self.burn)
    }

    /// Check that the configuration can produce a non-empty trace.
    pub fn validate(&self) -> Result<()> {
        if self.draws == 0 {
            return Err(ModelError::InvalidConfig("draws must be positive".into()));
        }
        if self.chains == 0 {
            return Err(ModelError::InvalidConfig("chains must be positive".into()));
        }
        if self.cores == 0 {
            return Err(ModelError::InvalidConfig("cores must be positive".into()));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if self.burn >= self.draws {
            return Err(ModelError::InvalidConfig(format!(
                "burn ({}) must be smaller than draws ({})",
                self.burn, self.draws
            )));
        }
        Ok(())
    }
}

/// Prior hyperparameters shared by the three pooling variants.
///
/// The coefficient and residual scales are deliberately wide so the likelihood
/// dominates; the degrees-of-freedom prior is Exponential with mean `1 / nu_rate`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Priors {
    /// Standard deviation of the Normal(0, ·) prior on intercepts and slopes
    /// (pooled and unpooled variants).
    pub coef_scale: f64,
    /// Scale of the HalfNormal prior on the residual scale `sigma`.
    pub sigma_scale: f64,
    /// Rate of the Exponential prior on the Student-t degrees of freedom `nu`.
    pub nu_rate: f64,
    /// Standard deviation of the Normal(0, ·) prior on the hyper-means.
    pub hyper_mean_scale: f64,
    /// Scale of the HalfCauchy prior on the hyper-scales.
    pub hyper_scale: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            coef_scale: 1e5,
            sigma_scale: 1e5,
            nu_rate: 1.0 / 30.0,
            hyper_mean_scale: 100.0,
            hyper_scale: 5.0,
        }
    }
}

impl Priors {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("coef_scale", self.coef_scale),
            ("sigma_scale", self.sigma_scale),
            ("nu_rate", self.nu_rate),
            ("hyper_mean_scale", self.hyper_mean_scale),
            ("hyper_scale", self.hyper_scale),
        ];
        for (name, value) in named {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidConfig(format!(
                    "prior {name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}
