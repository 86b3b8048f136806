//! Box-Cox power transform of a positive response.
//!
//! `z = ((y + shift)^λ - 1) / λ`, or `ln(y + shift)` when `λ = 0`. Fitting picks
//! the λ in `[-2, 2]` that maximises the profile log-likelihood
//! `(λ - 1) Σ ln(yᵢ) - n/2 · ln(var(z))`.

use crate::error::{ModelError, Result};
use ndarray::{Array1, ArrayView1};

const LAMBDA_BOUNDS: (f64, f64) = (-2.0, 2.0);
const GOLDEN_TOL: f64 = 1e-8;
const LOG_LAMBDA: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxCox {
    pub lambda: f64,
    /// Added to every value before transforming and removed after inverting.
    pub shift: f64,
}

fn shifted(y: ArrayView1<'_, f64>, shift: f64) -> Result<Array1<f64>> {
    let mut out = Array1::zeros(y.len());
    for (index, (&value, slot)) in y.iter().zip(out.iter_mut()).enumerate() {
        let v = value + shift;
        if !(v > 0.0 && v.is_finite()) {
            return Err(ModelError::DegenerateTransform { index, value });
        }
        *slot = v;
    }
    Ok(out)
}

fn power(v: f64, lambda: f64) -> f64 {
    if lambda.abs() < LOG_LAMBDA {
        v.ln()
    } else {
        (v.powf(lambda) - 1.0) / lambda
    }
}

fn profile_log_likelihood(v: &Array1<f64>, sum_ln: f64, lambda: f64) -> f64 {
    let z = v.mapv(|x| power(x, lambda));
    let var = z.var(0.0);
    if var <= 0.0 {
        return f64::NEG_INFINITY;
    }
    (lambda - 1.0) * sum_ln - 0.5 * v.len() as f64 * var.ln()
}

impl BoxCox {
    pub fn new(lambda: f64) -> Self {
        Self { lambda, shift: 0.0 }
    }

    pub fn with_shift(mut self, shift: f64) -> Self {
        self.shift = shift;
        self
    }

    /// Maximum-likelihood λ for `y`.
    pub fn fit(y: ArrayView1<'_, f64>) -> Result<Self> {
        Self::fit_with_shift(y, 0.0)
    }

    /// Maximum-likelihood λ for `y + shift`.
    pub fn fit_with_shift(y: ArrayView1<'_, f64>, shift: f64) -> Result<Self> {
        if y.len() < 2 {
            return Err(ModelError::ShapeMismatch(
                "Box-Cox fit needs at least two values".into(),
            ));
        }
        let v = shifted(y, shift)?;
        let sum_ln: f64 = v.iter().map(|x| x.ln()).sum();
        let objective = |lambda: f64| profile_log_likelihood(&v, sum_ln, lambda);

        // golden-section search for the maximum
        let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
        let (mut a, mut b) = LAMBDA_BOUNDS;
        let mut c = b - inv_phi * (b - a);
        let mut d = a + inv_phi * (b - a);
        let (mut fc, mut fd) = (objective(c), objective(d));
        while b - a > GOLDEN_TOL {
            if fc > fd {
                b = d;
                d = c;
                fd = fc;
                c = b - inv_phi * (b - a);
                fc = objective(c);
            } else {
                a = c;
                c = d;
                fc = fd;
                d = a + inv_phi * (b - a);
                fd = objective(d);
            }
        }
        let lambda = 0.5 * (a + b);
        tracing::debug!(lambda, shift, n = y.len(), "fitted Box-Cox transform");
        Ok(Self { lambda, shift })
    }

    pub fn transform(&self, y: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        Ok(shifted(y, self.shift)?.mapv(|v| power(v, self.lambda)))
    }

    /// Map transformed values back to the original scale.
    pub fn inverse(&self, z: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let mut out = Array1::zeros(z.len());
        for (index, (&value, slot)) in z.iter().zip(out.iter_mut()).enumerate() {
            let v = if self.lambda.abs() < LOG_LAMBDA {
                value.exp()
            } else {
                let base = self.lambda * value + 1.0;
                if base <= 0.0 {
                    return Err(ModelError::DegenerateTransform { index, value });
                }
                base.powf(1.0 / self.lambda)
            };
            if !v.is_finite() {
                return Err(ModelError::DegenerateTransform { index, value });
            }
            *slot = v - self.shift;
        }
        Ok(out)
    }
}
