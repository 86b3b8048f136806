//! Convergence diagnostics.
//!
//! Split R-hat and effective sample size are computed by `mini_mcmc::stats` over a
//! `(chains, draws, parameters)` array of retained draws. This module labels the
//! per-parameter values, summarises them as a [`RunStats`], and turns them into
//! [`SamplerWarning`]s.

use crate::error::SamplerWarning;
use mini_mcmc::stats::{RunStats, basic_stats, split_rhat_mean_ess};
use ndarray::ArrayView3;

/// Split R-hat above this value flags non-convergence.
pub const RHAT_THRESHOLD: f64 = 1.05;
/// ESS below this value (per chain) flags an unreliable trace.
pub const ESS_PER_CHAIN_THRESHOLD: f64 = 100.0;
/// Chains need at least this many retained draws to be split in halves.
pub const MIN_DRAWS_PER_CHAIN: usize = 4;

/// Diagnostics of one scalar parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDiagnostics {
    pub name: String,
    pub r_hat: f64,
    pub ess: f64,
}

/// Diagnose every parameter of `samples`, shaped `(chains, draws, parameters)`.
///
/// `labels` names the parameters in column order. Chains shorter than
/// [`MIN_DRAWS_PER_CHAIN`] get `NaN` diagnostics and no [`RunStats`].
pub fn diagnose(
    labels: &[String],
    samples: ArrayView3<f64>,
) -> (Vec<ParamDiagnostics>, Option<RunStats>) {
    let (_, n_draws, n_params) = samples.dim();
    if n_draws < MIN_DRAWS_PER_CHAIN || n_params == 0 {
        let params = labels
            .iter()
            .map(|name| ParamDiagnostics {
                name: name.clone(),
                r_hat: f64::NAN,
                ess: f64::NAN,
            })
            .collect();
        return (params, None);
    }

    let (r_hat, ess) = split_rhat_mean_ess(samples.mapv(|v| v as f32).view());
    let params = labels
        .iter()
        .zip(r_hat.iter().zip(ess.iter()))
        .map(|(name, (&r, &e))| ParamDiagnostics {
            name: name.clone(),
            r_hat: f64::from(r),
            ess: f64::from(e),
        })
        .collect();
    let run_stats = RunStats {
        ess: basic_stats("ESS", ess),
        rhat: basic_stats("Split R-hat", r_hat),
    };
    (params, Some(run_stats))
}

/// Turn diagnostics into warnings. R-hat is only judged with two or more chains.
pub fn warnings_for(params: &[ParamDiagnostics], n_chains: usize) -> Vec<SamplerWarning> {
    let ess_floor = ESS_PER_CHAIN_THRESHOLD * n_chains as f64;
    let mut warnings = Vec::new();
    for p in params {
        if n_chains > 1 && p.r_hat.is_finite() && p.r_hat > RHAT_THRESHOLD {
            warnings.push(SamplerWarning::HighRhat {
                parameter: p.name.clone(),
                r_hat: p.r_hat,
            });
        }
        if p.ess.is_finite() && p.ess < ess_floor {
            warnings.push(SamplerWarning::LowEffectiveSampleSize {
                parameter: p.name.clone(),
                ess: p.ess,
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use statrs::distribution::Normal;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("theta[{i}]")).collect()
    }

    /// Independent standard normal draws, shifted per chain.
    fn iid(n_chains: usize, n: usize, shift: impl Fn(usize) -> f64) -> Array3<f64> {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        Array3::from_shape_fn((n_chains, n, 1), |(c, _, _)| rng.sample(normal) + shift(c))
    }

    #[test]
    fn r_hat_near_one_for_mixed_chains() {
        let (params, stats) = diagnose(&labels(1), iid(4, 1000, |_| 0.0).view());
        assert!(params[0].r_hat < 1.02, "R-hat {}", params[0].r_hat);
        assert!(stats.is_some());
    }

    #[test]
    fn r_hat_large_for_separated_chains() {
        let (params, _) = diagnose(&labels(1), iid(2, 500, |c| 10.0 * c as f64).view());
        assert!(params[0].r_hat > 1.5, "R-hat {}", params[0].r_hat);
        let warnings = warnings_for(&params, 2);
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, SamplerWarning::HighRhat { .. }))
        );
        // a single chain is never judged on R-hat
        assert!(
            warnings_for(&params, 1)
                .iter()
                .all(|w| !matches!(w, SamplerWarning::HighRhat { .. }))
        );
    }

    #[test]
    fn ess_close_to_draw_count_for_independent_draws() {
        let (params, _) = diagnose(&labels(1), iid(2, 1000, |_| 0.0).view());
        let ess = params[0].ess;
        assert!(ess > 1200.0 && ess < 3000.0, "ESS {ess}");
    }

    #[test]
    fn sticky_chain_has_low_ess_and_raises_a_warning() {
        // AR(1) with strong autocorrelation
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut samples = Array3::zeros((2, 1000, 1));
        for chain in 0..2 {
            let mut x = 0.0;
            for draw in 0..1000 {
                x = 0.99 * x + 0.1 * rng.sample(normal);
                samples[[chain, draw, 0]] = x;
            }
        }
        let (params, _) = diagnose(&["alpha".to_string()], samples.view());
        assert!(params[0].ess < 200.0, "ESS {}", params[0].ess);
        let warnings = warnings_for(&params, 2);
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, SamplerWarning::LowEffectiveSampleSize { .. }))
        );
    }

    #[test]
    fn short_chains_give_nan_without_run_stats() {
        let (params, stats) = diagnose(&labels(2), Array3::zeros((2, 3, 2)).view());
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.r_hat.is_nan() && p.ess.is_nan()));
        assert!(stats.is_none());
        assert!(warnings_for(&params, 2).is_empty());
    }
}
