//! Partial pooling with a non-centered hierarchical prior.
//!
//! # Model
//! - yᵢ ∼ StudentT(ν, α_g + xᵢᵀβ_{·,g}, σ) with g = group_idx[i]
//! - α_g = α_μ + α_σ · α̃_g,  α̃_g ∼ N(0, 1)
//! - β_{j,g} = β_μ,j + β_σ,j · β̃_{j,g},  β̃_{j,g} ∼ N(0, 1)
//! - α_μ, β_μ,j ∼ N(0, hyper_mean_scale²);  α_σ, β_σ,j ∼ HalfCauchy(hyper_scale)
//! - σ ∼ HalfNormal(sigma_scale), ν ∼ Exponential(nu_rate)
//!
//! The sampler moves the standardized offsets α̃ and β̃ rather than α and β
//! themselves, which keeps the posterior free of the funnel that appears when a
//! hyper-scale approaches zero. α and β are recorded as deterministic nodes.
//!
//! Groups with no observations are allowed; their coefficients follow the
//! hyper-distribution.

use super::{PoolingVariant, noise_latents, require_groups, student_t_likelihood};
use crate::config::Priors;
use crate::data::Dataset;
use crate::error::Result;
use crate::graph::{Deterministic, Latent, ModelGraph, Prior, Transform};

pub fn build_partial_pooled<'a>(data: &'a Dataset, priors: &Priors) -> Result<ModelGraph<'a>> {
    let (group_idx, n_groups) = require_groups(data, PoolingVariant::PartialPooled)?;
    let n_features = data.n_features();

    let hyper_mean = Prior::Normal {
        mu: 0.0,
        sigma: priors.hyper_mean_scale,
    };
    let hyper_scale = Prior::HalfCauchy {
        scale: priors.hyper_scale,
    };
    let standard = Prior::Normal {
        mu: 0.0,
        sigma: 1.0,
    };
    let [sigma, nu] = noise_latents(priors);

    let latents = vec![
        Latent::scalar("alpha_mu", hyper_mean),
        Latent::scalar("alpha_sigma", hyper_scale),
        Latent::per_group("alpha_offset", standard, vec![n_groups]),
        Latent::vector("beta_mu", hyper_mean, n_features),
        Latent::vector("beta_sigma", hyper_scale, n_features),
        Latent::per_group("beta_offset", standard, vec![n_features, n_groups]),
        sigma,
        nu,
    ];
    let deterministics = vec![
        Deterministic {
            name: "alpha".to_string(),
            shape: vec![n_groups],
            grouped: true,
            transform: Transform::NonCentered {
                mean: "alpha_mu".to_string(),
                scale: "alpha_sigma".to_string(),
                offset: "alpha_offset".to_string(),
            },
        },
        Deterministic {
            name: "beta".to_string(),
            shape: vec![n_features, n_groups],
            grouped: true,
            transform: Transform::NonCentered {
                mean: "beta_mu".to_string(),
                scale: "beta_sigma".to_string(),
                offset: "beta_offset".to_string(),
            },
        },
    ];

    Ok(ModelGraph {
        latents,
        deterministics,
        likelihood: student_t_likelihood(data, Some(group_idx), n_groups),
    })
}
