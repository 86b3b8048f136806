//! K-fold cross-validation of multilevel models.

use crate::config::SamplerConfig;
use crate::data::Dataset;
use crate::error::{ModelError, Result};
use crate::model::MultilevelModel;
use crate::predictive::Estimates;
use crate::sampler::PosteriorSampler;
use ndarray::{Array1, ArrayView1};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Shuffled K-fold splitter.
///
/// Rows are shuffled once with a `ChaCha8Rng` seeded from `seed`, then cut into
/// `n_splits` contiguous folds whose sizes differ by at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits, seed: 0 }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// `(train, test)` row indices of every fold.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 || self.n_splits > n_samples {
            return Err(ModelError::InvalidConfig(format!(
                "n_splits must lie in [2, {n_samples}], got {}",
                self.n_splits
            )));
        }
        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let end = start + fold_size + usize::from(i < remainder);
            let test = indices[start..end].to_vec();
            let mut train = Vec::with_capacity(n_samples - test.len());
            train.extend_from_slice(&indices[..start]);
            train.extend_from_slice(&indices[end..]);
            folds.push((train, test));
            start = end;
        }
        Ok(folds)
    }
}

/// Score of one fold. A failed fit or prediction is kept as the fold's error.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldOutcome {
    pub fold: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub score: std::result::Result<f64, ModelError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidation {
    pub folds: Vec<FoldOutcome>,
}

impl CrossValidation {
    /// RMSE of every fold that succeeded.
    pub fn scores(&self) -> Vec<f64> {
        self.folds
            .iter()
            .filter_map(|f| f.score.as_ref().ok().copied())
            .collect()
    }

    /// Folds that failed, with their errors.
    pub fn failures(&self) -> Vec<(usize, &ModelError)> {
        self.folds
            .iter()
            .filter_map(|f| f.score.as_ref().err().map(|e| (f.fold, e)))
            .collect()
    }

    /// Mean RMSE over folds, or `None` if any fold failed.
    pub fn mean_rmse(&self) -> Option<f64> {
        if self.folds.is_empty() || !self.failures().is_empty() {
            return None;
        }
        let scores = self.scores();
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// Root mean squared error.
pub fn rmse(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Result<f64> {
    if y_true.len() != y_pred.len() || y_true.is_empty() {
        return Err(ModelError::ShapeMismatch(format!(
            "rmse needs equal non-empty lengths, got {} and {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    let sse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok((sse / y_true.len() as f64).sqrt())
}

fn score_fold<S: PosteriorSampler + Clone>(
    template: &MultilevelModel<S>,
    data: &Dataset,
    config: &SamplerConfig,
    train: &[usize],
    test: &[usize],
) -> Result<f64> {
    let train_data = data.subset(train)?;
    let test_data = data.subset(test)?;
    let mut model = template.unfitted_clone();
    model.fit(&train_data, config)?;

    let x_test = test_data.x().to_owned();
    let groups: Option<Array1<usize>> = test_data.group_idx().map(|g| g.to_owned());
    let (_, estimates) = model.predict(&x_test, groups.as_ref(), None)?;
    match estimates {
        Estimates::Mean(pred) => rmse(test_data.y(), pred.view()),
        Estimates::Quantiles(_) => Err(ModelError::InvalidConfig(
            "cross-validation scores predictive means".into(),
        )),
    }
}

/// Fit a fresh copy of `template` on every training split and score its
/// predictive mean on the held-out rows by RMSE.
///
/// Split errors fail the whole call; fit or prediction errors are recorded per fold.
pub fn cross_validate<S: PosteriorSampler + Clone>(
    template: &MultilevelModel<S>,
    data: &Dataset,
    config: &SamplerConfig,
    kfold: &KFold,
) -> Result<CrossValidation> {
    let splits = kfold.split(data.n_observations())?;
    let mut folds = Vec::with_capacity(splits.len());
    for (fold, (train, test)) in splits.iter().enumerate() {
        let score = score_fold(template, data, config, train, test);
        match &score {
            Ok(rmse) => tracing::debug!(fold, rmse, "fold scored"),
            Err(error) => tracing::warn!(fold, %error, "fold failed"),
        }
        folds.push(FoldOutcome {
            fold,
            n_train: train.len(),
            n_test: test.len(),
            score,
        });
    }
    Ok(CrossValidation { folds })
}
