use rand::{Rng, prelude::Distribution};
use statrs::distribution::{Normal, Uniform};

/// Draws the sampler needs for proposals, acceptance tests and initial jitter.
pub(crate) trait RngDraw<R: Rng + ?Sized> {
    fn sample_norm(&self, rng: &mut R) -> f64;
    fn sample_unif(&self, rng: &mut R) -> f64;
    fn sample_jitter(&self, rng: &mut R, half_width: f64) -> f64;
}

/// Standard distributions reused by every coordinate update of a chain.
#[derive(Debug, Clone)]
pub(crate) struct ProposalKernel {
    std_norm: Normal,
    unif: Uniform,
}

impl ProposalKernel {
    pub fn new() -> Self {
        Self {
            std_norm: Normal::standard(),
            unif: Uniform::standard(),
        }
    }
}

impl<R: Rng + ?Sized> RngDraw<R> for ProposalKernel {
    /// Sample from the standard normal distribution
    #[inline(always)]
    fn sample_norm(&self, rng: &mut R) -> f64 {
        self.std_norm.sample(rng)
    }

    /// Sample from the standard uniform distribution
    #[inline(always)]
    fn sample_unif(&self, rng: &mut R) -> f64 {
        self.unif.sample(rng)
    }

    /// Sample uniformly from `[-half_width, half_width)`.
    #[inline(always)]
    fn sample_jitter(&self, rng: &mut R, half_width: f64) -> f64 {
        half_width * (2.0 * self.sample_unif(rng) - 1.0)
    }
}
