//! Model graph builders for the three pooling strategies.
//!
//! Every builder is a pure function `(Dataset, Priors) -> ModelGraph`; no sampling
//! happens here. All three share the robust observation model
//!
//! - yᵢ ∼ StudentT(ν, αᵍ⁽ⁱ⁾ + xᵢᵀβᵍ⁽ⁱ⁾, σ)
//! - σ ∼ HalfNormal(sigma_scale)
//! - ν ∼ Exponential(nu_rate)
//!
//! and differ in how the intercept α and slopes β are shared across groups:
//! - [`PoolingVariant::Pooled`]: one α and β for every observation ([`build_pooled`])
//! - [`PoolingVariant::Unpooled`]: independent α and β per group ([`build_unpooled`])
//! - [`PoolingVariant::PartialPooled`]: per-group α and β drawn from learned
//!   hyper-distributions, non-centered ([`build_partial_pooled`])

pub use partial::build_partial_pooled;
pub use pooled::build_pooled;
pub use unpooled::build_unpooled;

mod partial;
mod pooled;
mod unpooled;

use crate::config::Priors;
use crate::data::Dataset;
use crate::error::{ModelError, Result};
use crate::graph::{Latent, LinearPredictor, ModelGraph, Prior, StudentTLikelihood};
use ndarray::ArrayView1;
use std::fmt;

/// Closed set of pooling strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PoolingVariant {
    /// Full pooling: group structure is ignored.
    Pooled,
    /// No pooling: every group is fit on its own data only.
    Unpooled,
    /// Partial pooling: group coefficients shrink toward shared hyper-means.
    PartialPooled,
}

impl PoolingVariant {
    pub fn name(&self) -> &'static str {
        match self {
            PoolingVariant::Pooled => "pooled",
            PoolingVariant::Unpooled => "unpooled",
            PoolingVariant::PartialPooled => "partial-pooled",
        }
    }

    /// Whether fitting and predicting require a group index.
    pub fn requires_groups(&self) -> bool {
        !matches!(self, PoolingVariant::Pooled)
    }

    /// Build the model graph for this variant.
    pub fn build<'a>(&self, data: &'a Dataset, priors: &Priors) -> Result<ModelGraph<'a>> {
        priors.validate()?;
        let graph = match self {
            PoolingVariant::Pooled => build_pooled(data, priors),
            PoolingVariant::Unpooled => build_unpooled(data, priors),
            PoolingVariant::PartialPooled => build_partial_pooled(data, priors),
        }?;
        tracing::debug!(
            variant = self.name(),
            latents = graph.latents.len(),
            dim = graph.dim(),
            observations = data.n_observations(),
            "built model graph"
        );
        Ok(graph)
    }
}

impl fmt::Display for PoolingVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Group index and group count, or `NotBuilt` for a grouped variant without them.
fn require_groups<'a>(
    data: &'a Dataset,
    variant: PoolingVariant,
) -> Result<(ArrayView1<'a, usize>, usize)> {
    match (data.group_idx(), data.n_groups()) {
        (Some(idx), Some(n_groups)) => Ok((idx, n_groups)),
        _ => Err(ModelError::NotBuilt {
            variant: variant.name(),
            missing: "group index",
        }),
    }
}

/// Residual scale and degrees-of-freedom latents shared by every variant.
fn noise_latents(priors: &Priors) -> [Latent; 2] {
    [
        Latent::scalar(
            "sigma",
            Prior::HalfNormal {
                sigma: priors.sigma_scale,
            },
        ),
        Latent::scalar(
            "nu",
            Prior::Exponential {
                rate: priors.nu_rate,
            },
        ),
    ]
}

/// Student-t likelihood on `y` with location `alpha + x · beta`.
fn student_t_likelihood<'a>(
    data: &'a Dataset,
    group_idx: Option<ArrayView1<'a, usize>>,
    n_groups: usize,
) -> StudentTLikelihood<'a> {
    StudentTLikelihood {
        name: "y".to_string(),
        location: LinearPredictor {
            intercept: "alpha".to_string(),
            slope: "beta".to_string(),
            x: data.x(),
            group_idx,
            n_groups,
        },
        sigma: "sigma".to_string(),
        nu: "nu".to_string(),
        observed: data.y(),
    }
}
