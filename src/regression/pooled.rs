//! Full pooling: a single intercept and slope vector shared by all observations.
//!
//! # Model
//! - yᵢ ∼ StudentT(ν, α + xᵢᵀβ, σ)
//! - α ∼ N(0, coef_scale²), βⱼ ∼ N(0, coef_scale²)
//! - σ ∼ HalfNormal(sigma_scale), ν ∼ Exponential(nu_rate)
//!
//! Appropriate when group structure is believed irrelevant or groups are too small
//! to estimate separately. Any group index on the dataset is ignored.

use super::{noise_latents, student_t_likelihood};
use crate::config::Priors;
use crate::data::Dataset;
use crate::error::Result;
use crate::graph::{Latent, ModelGraph, Prior};

pub fn build_pooled<'a>(data: &'a Dataset, priors: &Priors) -> Result<ModelGraph<'a>> {
    let coef = Prior::Normal {
        mu: 0.0,
        sigma: priors.coef_scale,
    };
    let [sigma, nu] = noise_latents(priors);
    let latents = vec![
        Latent::scalar("alpha", coef),
        Latent::vector("beta", coef, data.n_features()),
        sigma,
        nu,
    ];

    Ok(ModelGraph {
        latents,
        deterministics: Vec::new(),
        likelihood: student_t_likelihood(data, None, 1),
    })
}
