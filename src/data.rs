//! Validated regression datasets.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeMap;

/// Feature matrix, response and optional group index for one fit.
///
/// The feature matrix is stored observation-major, `(n_observations, n_features)`.
/// Use [`Dataset::from_feature_major`] for data laid out `(n_features, n_observations)`.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<f64>,
    groups: Option<Groups>,
}

#[derive(Debug, Clone)]
struct Groups {
    idx: Array1<usize>,
    n_groups: usize,
}

impl Dataset {
    /// Build a dataset from an `(n_observations, n_features)` matrix and a response.
    ///
    /// # Errors
    /// `ShapeMismatch` if the row count differs from `y.len()`, if there are no
    /// observations or features, or if any value is not finite.
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(ModelError::ShapeMismatch(format!(
                "x has {} observations but y has {}",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ModelError::ShapeMismatch(format!(
                "dataset needs at least one observation and one feature, got {:?}",
                x.dim()
            )));
        }
        if let Some(((row, col), value)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::ShapeMismatch(format!(
                "x[{row}, {col}] is not finite ({value})"
            )));
        }
        if let Some((row, value)) = y.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::ShapeMismatch(format!(
                "y[{row}] is not finite ({value})"
            )));
        }
        Ok(Self { x, y, groups: None })
    }

    /// Build a dataset from an `(n_features, n_observations)` matrix.
    pub fn from_feature_major(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        Self::new(x.reversed_axes().as_standard_layout().to_owned(), y)
    }

    /// Single-predictor convenience constructor.
    pub fn from_single_feature(x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        Self::new(x.insert_axis(Axis(1)), y)
    }

    /// Attach an integer-coded group index with `n_groups` declared groups.
    ///
    /// # Errors
    /// `ShapeMismatch` if the index length differs from the number of observations
    /// or any code is `>= n_groups`.
    pub fn with_groups(mut self, group_idx: Array1<usize>, n_groups: usize) -> Result<Self> {
        validate_group_index(group_idx.view(), self.n_observations(), n_groups)?;
        self.groups = Some(Groups {
            idx: group_idx,
            n_groups,
        });
        Ok(self)
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn group_idx(&self) -> Option<ArrayView1<'_, usize>> {
        self.groups.as_ref().map(|g| g.idx.view())
    }

    pub fn n_groups(&self) -> Option<usize> {
        self.groups.as_ref().map(|g| g.n_groups)
    }

    pub fn n_observations(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Observation count per group; `None` without a group index.
    pub fn group_sizes(&self) -> Option<Vec<usize>> {
        self.groups.as_ref().map(|g| {
            let mut sizes = vec![0; g.n_groups];
            for &code in &g.idx {
                sizes[code] += 1;
            }
            sizes
        })
    }

    /// Copy of the rows at `indices`, keeping the declared group count.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_observations()) {
            return Err(ModelError::ShapeMismatch(format!(
                "row {bad} is out of range for {} observations",
                self.n_observations()
            )));
        }
        let x = self.x.select(Axis(0), indices);
        let y = self.y.select(Axis(0), indices);
        let groups = self.groups.as_ref().map(|g| Groups {
            idx: g.idx.select(Axis(0), indices),
            n_groups: g.n_groups,
        });
        Ok(Self { x, y, groups })
    }
}

/// Check that `group_idx` has `n_rows` entries, all below `n_groups`.
pub(crate) fn validate_group_index(
    group_idx: ArrayView1<'_, usize>,
    n_rows: usize,
    n_groups: usize,
) -> Result<()> {
    if group_idx.len() != n_rows {
        return Err(ModelError::ShapeMismatch(format!(
            "group index has {} entries but there are {n_rows} observations",
            group_idx.len()
        )));
    }
    if let Some((row, &code)) = group_idx.iter().enumerate().find(|(_, c)| **c >= n_groups) {
        return Err(ModelError::ShapeMismatch(format!(
            "group index {code} at row {row} is outside [0, {n_groups})"
        )));
    }
    Ok(())
}

/// Encode arbitrary labels as dense group codes.
///
/// Categories are sorted, so the code of a label does not depend on row order.
/// Returns the per-row codes and the categories indexed by code.
///
/// ```
/// use multilevel_regression::data::encode_groups;
///
/// let (codes, categories) = encode_groups(&["b", "a", "b", "c"]);
/// assert_eq!(codes.to_vec(), vec![1, 0, 1, 2]);
/// assert_eq!(categories, vec!["a", "b", "c"]);
/// ```
pub fn encode_groups<T: Ord + Clone>(labels: &[T]) -> (Array1<usize>, Vec<T>) {
    let mut lookup: BTreeMap<&T, usize> = labels.iter().map(|l| (l, 0)).collect();
    for (code, slot) in lookup.values_mut().enumerate() {
        *slot = code;
    }
    let codes = labels.iter().map(|l| lookup[l]).collect();
    let categories = lookup.into_keys().cloned().collect();
    (codes, categories)
}
