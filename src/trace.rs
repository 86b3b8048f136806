//! Retained posterior draws.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use statrs::statistics::{Data, OrderStatistics};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Name and shape of a traced variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub name: String,
    pub shape: Vec<usize>,
    /// Whether the last axis of `shape` indexes groups.
    pub grouped: bool,
}

impl VariableSpec {
    pub fn new(name: &str, shape: Vec<usize>, grouped: bool) -> Self {
        Self {
            name: name.to_string(),
            shape,
            grouped,
        }
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Human-readable label of flat element `index`, e.g. `beta[0, 3]`.
    pub fn element_label(&self, index: usize) -> String {
        if self.shape.is_empty() {
            return self.name.clone();
        }
        let mut rem = index;
        let mut coords = vec![0; self.shape.len()];
        for (axis, &len) in self.shape.iter().enumerate().rev() {
            coords[axis] = rem % len;
            rem /= len;
        }
        let coords: Vec<String> = coords.iter().map(usize::to_string).collect();
        format!("{}[{}]", self.name, coords.join(", "))
    }
}

/// Draws of one variable: one row per draw, one column per flattened element.
#[derive(Debug, Clone)]
pub struct TraceVariable {
    spec: VariableSpec,
    values: Array2<f64>,
}

impl TraceVariable {
    pub fn spec(&self) -> &VariableSpec {
        &self.spec
    }

    pub fn shape(&self) -> &[usize] {
        &self.spec.shape
    }

    pub fn grouped(&self) -> bool {
        self.spec.grouped
    }

    /// `(n_draws, size)` view of the draws.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// All draws of flat element `index`.
    pub fn element(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.values.ncols()).then(|| self.values.column(index))
    }
}

/// Posterior draws for every variable of a model, pooled across chains.
///
/// All variables share the same number of draws. The trace is immutable once built
/// and may be read concurrently.
#[derive(Debug, Clone)]
pub struct PosteriorTrace {
    n_draws: usize,
    n_chains: usize,
    order: Vec<String>,
    variables: BTreeMap<String, TraceVariable>,
}

impl PosteriorTrace {
    /// Assemble a trace from per-chain draws.
    ///
    /// `chains[c][d]` is draw `d` of chain `c`: the flattened values of every
    /// variable in `specs` order. The first `burn` draws of every chain are dropped
    /// before the chains are concatenated.
    pub fn from_chains(specs: Vec<VariableSpec>, chains: &[Vec<Vec<f64>>], burn: usize) -> Result<Self> {
        let width: usize = specs.iter().map(VariableSpec::size).sum();
        let rows: Vec<&Vec<f64>> = chains
            .iter()
            .flat_map(|chain| chain.iter().skip(burn))
            .collect();
        if rows.is_empty() {
            return Err(ModelError::InvalidConfig(
                "no draws left after burn-in".into(),
            ));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelError::ShapeMismatch(format!(
                "draw has {} values, variables need {width}",
                bad.len()
            )));
        }

        let mut entries = Vec::with_capacity(specs.len());
        let mut offset = 0;
        for spec in specs {
            let size = spec.size();
            let values = Array2::from_shape_fn((rows.len(), size), |(d, j)| rows[d][offset + j]);
            offset += size;
            entries.push((spec, values));
        }
        let mut trace = Self::from_draws(entries)?;
        trace.n_chains = chains.len();
        Ok(trace)
    }

    /// Build a trace from already-pooled draws, e.g. produced by another sampler.
    pub fn from_draws(entries: Vec<(VariableSpec, Array2<f64>)>) -> Result<Self> {
        let n_draws = entries.first().map_or(0, |(_, v)| v.nrows());
        if n_draws == 0 {
            return Err(ModelError::ShapeMismatch("trace has no draws".into()));
        }
        let mut order = Vec::with_capacity(entries.len());
        let mut variables = BTreeMap::new();
        for (spec, values) in entries {
            if values.nrows() != n_draws || values.ncols() != spec.size() {
                return Err(ModelError::ShapeMismatch(format!(
                    "{} has draws of shape {:?}, expected ({n_draws}, {})",
                    spec.name,
                    values.dim(),
                    spec.size()
                )));
            }
            order.push(spec.name.clone());
            variables.insert(spec.name.clone(), TraceVariable { spec, values });
        }
        Ok(Self {
            n_draws,
            n_chains: 1,
            order,
            variables,
        })
    }

    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    pub fn n_chains(&self) -> usize {
        self.n_chains
    }

    /// Variable names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&TraceVariable> {
        self.variables.get(name)
    }

    /// Posterior mean of every element of `name`.
    pub fn posterior_mean(&self, name: &str) -> Option<Array1<f64>> {
        self.get(name).and_then(|v| v.values.mean_axis(Axis(0)))
    }

    /// Posterior standard deviation of every element of `name`.
    pub fn posterior_sd(&self, name: &str) -> Option<Array1<f64>> {
        let ddof = if self.n_draws > 1 { 1.0 } else { 0.0 };
        self.get(name).map(|v| v.values.std_axis(Axis(0), ddof))
    }

    /// Equal-tailed credible interval with mass `prob` for every element of `name`.
    pub fn credible_interval(&self, name: &str, prob: f64) -> Result<(Array1<f64>, Array1<f64>)> {
        if !(prob > 0.0 && prob < 1.0) {
            return Err(ModelError::InvalidQuantile(prob));
        }
        let var = self
            .get(name)
            .ok_or_else(|| ModelError::ShapeMismatch(format!("unknown variable {name}")))?;
        let tail = 0.5 * (1.0 - prob);
        let mut lower = Array1::zeros(var.values.ncols());
        let mut upper = Array1::zeros(var.values.ncols());
        for (j, column) in var.values.axis_iter(Axis(1)).enumerate() {
            let mut data = Data::new(column.to_vec());
            lower[j] = data.quantile(tail);
            upper[j] = data.quantile(1.0 - tail);
        }
        Ok((lower, upper))
    }

    /// Table of posterior mean, standard deviation and 95% interval per element.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<18} {:>12} {:>12} {:>12} {:>12}",
            "Parameter", "Mean", "Std. Dev.", "2.5%", "97.5%"
        );
        let _ = writeln!(out, "{}", "-".repeat(70));
        for name in &self.order {
            let var = &self.variables[name];
            let (Some(mean), Some(sd), Ok((lo, hi))) = (
                self.posterior_mean(name),
                self.posterior_sd(name),
                self.credible_interval(name, 0.95),
            ) else {
                continue;
            };
            for j in 0..var.spec.size() {
                let _ = writeln!(
                    out,
                    "{:<18} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
                    var.spec.element_label(j),
                    mean[j],
                    sd[j],
                    lo[j],
                    hi[j]
                );
            }
        }
        let _ = write!(out, "{} draws from {} chain(s)", self.n_draws, self.n_chains);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn specs() -> Vec<VariableSpec> {
        vec![
            VariableSpec::new("alpha", vec![], false),
            VariableSpec::new("beta", vec![1, 2], true),
        ]
    }

    #[test]
    fn burn_is_dropped_per_chain() {
        let chains = vec![
            vec![vec![100.0, 0.0, 0.0], vec![1.0, 1.0, 2.0], vec![3.0, 1.0, 2.0]],
            vec![vec![100.0, 0.0, 0.0], vec![5.0, 3.0, 4.0], vec![7.0, 3.0, 4.0]],
        ];
        let trace = PosteriorTrace::from_chains(specs(), &chains, 1).unwrap();
        assert_eq!(trace.n_draws(), 4);
        assert_eq!(trace.n_chains(), 2);
        assert_relative_eq!(trace.posterior_mean("alpha").unwrap()[0], 4.0);
        assert_eq!(trace.posterior_mean("beta").unwrap(), array![2.0, 3.0]);
        assert_eq!(trace.names().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    }

    #[test]
    fn mismatched_draw_widths_are_rejected() {
        let chains = vec![vec![vec![1.0, 2.0]]];
        assert!(matches!(
            PosteriorTrace::from_chains(specs(), &chains, 0),
            Err(ModelError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn credible_interval_brackets_the_mean() {
        let draws = Array2::from_shape_fn((1001, 1), |(d, _)| d as f64 / 1000.0);
        let trace =
            PosteriorTrace::from_draws(vec![(VariableSpec::new("sigma", vec![], false), draws)])
                .unwrap();
        let (lo, hi) = trace.credible_interval("sigma", 0.9).unwrap();
        assert!((lo[0] - 0.05).abs() < 0.01, "lower {}", lo[0]);
        assert!((hi[0] - 0.95).abs() < 0.01, "upper {}", hi[0]);
        assert!(trace.credible_interval("sigma", 1.0).is_err());
        assert!(trace.summary().contains("sigma"));
    }

    #[test]
    fn element_labels_follow_row_major_order() {
        let spec = VariableSpec::new("beta", vec![2, 3], true);
        assert_eq!(spec.element_label(0), "beta[0, 0]");
        assert_eq!(spec.element_label(4), "beta[1, 1]");
        assert_eq!(VariableSpec::new("nu", vec![], false).element_label(0), "nu");
    }
}
