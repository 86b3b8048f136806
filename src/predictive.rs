//! Posterior predictive distribution of new observations.
//!
//! Every retained draw `d` defines a Student-t distribution per new row `r` with
//! location `alpha[g_r] + x_r · beta[·, g_r]`, scale `sigma` and `nu` degrees of
//! freedom. The predictive distribution is the equal-weight mixture over draws.
//!
//! [`PredictiveDistribution::quantile`] averages the per-draw quantiles instead of
//! inverting the mixture CDF. The two agree when the draws are concentrated, and
//! the average is cheap and deterministic; for wide posteriors the averaged
//! quantiles are narrower than the exact mixture quantiles. Use
//! [`PredictiveDistribution::empirical_quantiles`] for Monte Carlo quantiles of
//! the mixture itself.

use crate::data::validate_group_index;
use crate::error::{ModelError, Result};
use crate::trace::PosteriorTrace;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::distributions::Distribution;
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::{Data, OrderStatistics};

/// Point estimates returned by a prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimates {
    /// Predictive mean per row.
    Mean(Array1<f64>),
    /// One array per requested quantile, in request order.
    Quantiles(Vec<Array1<f64>>),
}

/// Mixture of per-draw Student-t distributions over a set of new rows.
#[derive(Debug, Clone)]
pub struct PredictiveDistribution {
    /// `(n_draws, n_rows)` locations.
    location: Array2<f64>,
    /// Residual scale per draw.
    scale: Array1<f64>,
    /// Degrees of freedom per draw.
    df: Array1<f64>,
}

fn draws_of<'t>(trace: &'t PosteriorTrace, name: &'static str) -> Result<ArrayView2<'t, f64>> {
    trace
        .get(name)
        .map(|v| v.values())
        .ok_or_else(|| ModelError::ShapeMismatch(format!("trace has no {name}")))
}

fn scalar_draws(trace: &PosteriorTrace, name: &'static str) -> Result<Array1<f64>> {
    let values = draws_of(trace, name)?;
    if values.ncols() != 1 {
        return Err(ModelError::ShapeMismatch(format!(
            "{name} must be scalar, has {} elements",
            values.ncols()
        )));
    }
    Ok(values.column(0).to_owned())
}

impl PredictiveDistribution {
    /// Build the predictive distribution of rows `x` from a fitted trace.
    ///
    /// `x` is observation-major with as many columns as the model had features.
    /// `group_idx` is required when the trace holds per-group coefficients and is
    /// ignored otherwise.
    pub fn from_trace(
        trace: &PosteriorTrace,
        x: ArrayView2<'_, f64>,
        group_idx: Option<ArrayView1<'_, usize>>,
    ) -> Result<Self> {
        let alpha = trace
            .get("alpha")
            .ok_or_else(|| ModelError::ShapeMismatch("trace has no alpha".into()))?;
        let beta = trace
            .get("beta")
            .ok_or_else(|| ModelError::ShapeMismatch("trace has no beta".into()))?;
        let grouped = alpha.grouped() || beta.grouped();
        let n_groups = if grouped {
            *beta.shape().last().unwrap_or(&1)
        } else {
            1
        };
        let n_features = beta.shape().first().copied().unwrap_or(1);
        if x.ncols() != n_features {
            return Err(ModelError::ShapeMismatch(format!(
                "model was fitted with {n_features} feature(s), got {}",
                x.ncols()
            )));
        }

        let groups: Vec<usize> = if grouped {
            let idx = group_idx.ok_or(ModelError::NotBuilt {
                variant: "grouped",
                missing: "group index",
            })?;
            validate_group_index(idx, x.nrows(), n_groups)?;
            idx.to_vec()
        } else {
            if group_idx.is_some() {
                tracing::debug!("group index ignored for a model without group coefficients");
            }
            vec![0; x.nrows()]
        };

        let alpha = alpha.values();
        let beta = beta.values();
        let alpha_stride = if alpha.ncols() > 1 { 1 } else { 0 };
        let beta_stride = if grouped { n_groups } else { 1 };
        let beta_offset = usize::from(grouped);

        let location = Array2::from_shape_fn((trace.n_draws(), x.nrows()), |(d, r)| {
            let g = groups[r];
            let intercept = alpha[[d, g * alpha_stride]];
            let slope: f64 = (0..n_features)
                .map(|j| x[[r, j]] * beta[[d, j * beta_stride + g * beta_offset]])
                .sum();
            intercept + slope
        });

        Self::from_parts(location, scalar_draws(trace, "sigma")?, scalar_draws(trace, "nu")?)
    }

    /// Assemble a predictive distribution from per-draw parameters.
    pub fn from_parts(location: Array2<f64>, scale: Array1<f64>, df: Array1<f64>) -> Result<Self> {
        if scale.len() != location.nrows() || df.len() != location.nrows() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} draws of location, {} of scale, {} of df",
                location.nrows(),
                scale.len(),
                df.len()
            )));
        }
        if location.nrows() == 0 {
            return Err(ModelError::ShapeMismatch("no posterior draws".into()));
        }
        Ok(Self {
            location,
            scale,
            df,
        })
    }

    pub fn n_draws(&self) -> usize {
        self.location.nrows()
    }

    pub fn n_rows(&self) -> usize {
        self.location.ncols()
    }

    /// `(n_draws, n_rows)` view of the per-draw locations.
    pub fn location(&self) -> ArrayView2<'_, f64> {
        self.location.view()
    }

    fn standard_t(&self, d: usize) -> Result<StudentsT> {
        StudentsT::new(0.0, 1.0, self.df[d]).map_err(|e| ModelError::Distribution(e.to_string()))
    }

    /// Predictive mean of each row.
    ///
    /// A Student-t with `nu <= 1` has no mean; such draws contribute their
    /// location (the median) instead and a warning is logged.
    pub fn mean(&self) -> Array1<f64> {
        let undefined = self.df.iter().filter(|&&nu| nu <= 1.0).count();
        if undefined > 0 {
            tracing::warn!(
                draws = undefined,
                "draws with nu <= 1 have no mean, using their location"
            );
        }
        self.location
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_rows()))
    }

    /// Average over draws of the per-draw `q`-quantile of each row.
    pub fn quantile(&self, q: f64) -> Result<Array1<f64>> {
        if !(q > 0.0 && q < 1.0) {
            return Err(ModelError::InvalidQuantile(q));
        }
        let mut acc = Array1::<f64>::zeros(self.n_rows());
        for (d, row) in self.location.axis_iter(Axis(0)).enumerate() {
            let t_q = self.standard_t(d)?.inverse_cdf(q);
            let shift = self.scale[d] * t_q;
            acc.zip_mut_with(&row, |a, &loc| *a += loc + shift);
        }
        Ok(acc / self.n_draws() as f64)
    }

    /// [`quantile`](Self::quantile) for each of `qs`, in order.
    pub fn quantiles(&self, qs: &[f64]) -> Result<Vec<Array1<f64>>> {
        qs.iter().map(|&q| self.quantile(q)).collect()
    }

    /// Draw `per_draw` values for every posterior draw from the exact mixture.
    ///
    /// Returns a `(n_draws * per_draw, n_rows)` array.
    pub fn sample<R: Rng + ?Sized>(&self, per_draw: usize, rng: &mut R) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((self.n_draws() * per_draw, self.n_rows()));
        for d in 0..self.n_draws() {
            for r in 0..self.n_rows() {
                let dist = StudentsT::new(self.location[[d, r]], self.scale[d], self.df[d])
                    .map_err(|e| ModelError::Distribution(e.to_string()))?;
                for k in 0..per_draw {
                    out[[d * per_draw + k, r]] = dist.sample(rng);
                }
            }
        }
        Ok(out)
    }

    /// Monte Carlo quantiles of the mixture from `per_draw` samples per draw.
    pub fn empirical_quantiles<R: Rng + ?Sized>(
        &self,
        qs: &[f64],
        per_draw: usize,
        rng: &mut R,
    ) -> Result<Vec<Array1<f64>>> {
        if let Some(&bad) = qs.iter().find(|&&q| !(q > 0.0 && q < 1.0)) {
            return Err(ModelError::InvalidQuantile(bad));
        }
        if per_draw == 0 {
            return Err(ModelError::InvalidConfig(
                "at least one sample per draw is needed".into(),
            ));
        }
        let samples = self.sample(per_draw, rng)?;
        let columns: Vec<Data<Vec<f64>>> = samples
            .axis_iter(Axis(1))
            .map(|c| Data::new(c.to_vec()))
            .collect();
        Ok(qs
            .iter()
            .map(|&q| {
                columns
                    .iter()
                    .map(|c| c.clone().quantile(q))
                    .collect::<Array1<f64>>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::VariableSpec;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn pooled_trace() -> PosteriorTrace {
        PosteriorTrace::from_draws(vec![
            (VariableSpec::new("alpha", vec![], false), array![[1.0], [3.0]]),
            (VariableSpec::new("beta", vec![1], false), array![[2.0], [2.0]]),
            (VariableSpec::new("sigma", vec![], false), array![[1.0], [1.0]]),
            (VariableSpec::new("nu", vec![], false), array![[5.0], [5.0]]),
        ])
        .unwrap()
    }

    fn grouped_trace() -> PosteriorTrace {
        // two features, two groups; beta laid out as [feature, group]
        PosteriorTrace::from_draws(vec![
            (VariableSpec::new("alpha", vec![2], true), array![[0.0, 10.0]]),
            (
                VariableSpec::new("beta", vec![2, 2], true),
                array![[1.0, -1.0, 0.5, 2.0]],
            ),
            (VariableSpec::new("sigma", vec![], false), array![[0.5]]),
            (VariableSpec::new("nu", vec![], false), array![[30.0]]),
        ])
        .unwrap()
    }

    #[test]
    fn pooled_mean_averages_locations() {
        let x = array![[0.0], [1.0]];
        let dist = PredictiveDistribution::from_trace(&pooled_trace(), x.view(), None).unwrap();
        assert_eq!(dist.mean(), array![2.0, 4.0]);
        // median of a symmetric mixture sits at the mean
        let median = dist.quantile(0.5).unwrap();
        assert_relative_eq!(median[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn grouped_location_uses_each_rows_group() {
        let x = array![[1.0, 1.0], [1.0, 1.0]];
        let idx = array![0, 1];
        let dist =
            PredictiveDistribution::from_trace(&grouped_trace(), x.view(), Some(idx.view()))
                .unwrap();
        // group 0: 0 + 1 + 0.5, group 1: 10 - 1 + 2
        assert_eq!(dist.mean(), array![1.5, 11.0]);
    }

    #[test]
    fn grouped_prediction_needs_a_valid_group_index() {
        let x = array![[1.0, 1.0]];
        let trace = grouped_trace();
        assert!(matches!(
            PredictiveDistribution::from_trace(&trace, x.view(), None),
            Err(ModelError::NotBuilt { .. })
        ));
        let out_of_range = array![2];
        assert!(matches!(
            PredictiveDistribution::from_trace(&trace, x.view(), Some(out_of_range.view())),
            Err(ModelError::ShapeMismatch(_))
        ));
        let too_many_features = array![[1.0, 1.0, 1.0]];
        let idx = array![0];
        assert!(matches!(
            PredictiveDistribution::from_trace(&trace, too_many_features.view(), Some(idx.view())),
            Err(ModelError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn quantiles_are_ordered_and_validated() {
        let x = array![[0.5]];
        let dist = PredictiveDistribution::from_trace(&pooled_trace(), x.view(), None).unwrap();
        let qs = dist.quantiles(&[0.05, 0.5, 0.95]).unwrap();
        assert!(qs[0][0] < qs[1][0] && qs[1][0] < qs[2][0]);
        assert_eq!(dist.quantile(0.0), Err(ModelError::InvalidQuantile(0.0)));
        assert_eq!(dist.quantile(1.5), Err(ModelError::InvalidQuantile(1.5)));
    }

    #[test]
    fn empirical_quantiles_track_the_mixture() {
        let x = array![[0.0]];
        let dist = PredictiveDistribution::from_trace(&pooled_trace(), x.view(), None).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let qs = dist.empirical_quantiles(&[0.5], 5000, &mut rng).unwrap();
        assert!((qs[0][0] - 2.0).abs() < 0.15, "median {}", qs[0][0]);
    }
}
