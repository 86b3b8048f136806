//! No pooling: independent intercept and slopes for every group.
//!
//! # Model
//! - yᵢ ∼ StudentT(ν, α_g + xᵢᵀβ_{·,g}, σ) with g = group_idx[i]
//! - α_g ∼ N(0, coef_scale²), β_{j,g} ∼ N(0, coef_scale²)
//! - σ ∼ HalfNormal(sigma_scale), ν ∼ Exponential(nu_rate)
//!
//! Groups share nothing but σ and ν, so small groups get noisy estimates. A group
//! with no observations would be estimated from the (very wide) prior alone and is
//! rejected instead.

use super::{PoolingVariant, noise_latents, require_groups, student_t_likelihood};
use crate::config::Priors;
use crate::data::Dataset;
use crate::error::{ModelError, Result};
use crate::graph::{Latent, ModelGraph, Prior};

pub fn build_unpooled<'a>(data: &'a Dataset, priors: &Priors) -> Result<ModelGraph<'a>> {
    let (group_idx, n_groups) = require_groups(data, PoolingVariant::Unpooled)?;
    if let Some(sizes) = data.group_sizes() {
        if let Some(group) = sizes.iter().position(|&n| n == 0) {
            return Err(ModelError::EmptyGroup { group });
        }
    }

    let coef = Prior::Normal {
        mu: 0.0,
        sigma: priors.coef_scale,
    };
    let [sigma, nu] = noise_latents(priors);
    let latents = vec![
        Latent::per_group("alpha", coef, vec![n_groups]),
        Latent::per_group("beta", coef, vec![data.n_features(), n_groups]),
        sigma,
        nu,
    ];

    Ok(ModelGraph {
        latents,
        deterministics: Vec::new(),
        likelihood: student_t_likelihood(data, Some(group_idx), n_groups),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn coefficients_are_per_group() {
        let data = Dataset::from_single_feature(array![0.0, 1.0, 2.0], array![1.0, 2.0, 3.0])
            .unwrap()
            .with_groups(array![0, 1, 1], 2)
            .unwrap();
        let graph = build_unpooled(&data, &Priors::default()).unwrap();

        assert_eq!(graph.latent("alpha").unwrap().shape, vec![2]);
        assert_eq!(graph.latent("beta").unwrap().shape, vec![1, 2]);
        assert!(graph.latent("beta").unwrap().grouped);
        assert_eq!(graph.likelihood.location.n_groups, 2);
    }

    #[test]
    fn empty_groups_are_rejected() {
        let data = Dataset::from_single_feature(array![0.0, 1.0], array![1.0, 2.0])
            .unwrap()
            .with_groups(array![0, 2], 3)
            .unwrap();
        let err = build_unpooled(&data, &Priors::default()).unwrap_err();
        assert_eq!(err, ModelError::EmptyGroup { group: 1 });
    }
}
