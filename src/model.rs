//! The fit/predict contract shared by every pooling variant.

use crate::config::{Priors, SamplerConfig};
use crate::data::Dataset;
use crate::diagnostics::ParamDiagnostics;
use crate::error::{ModelError, Result, SamplerWarning};
use crate::predictive::{Estimates, PredictiveDistribution};
use crate::regression::PoolingVariant;
use crate::sampler::{CancellationToken, MetropolisWithinGibbs, PosteriorSampler};
use crate::trace::PosteriorTrace;
use mini_mcmc::stats::RunStats;
use ndarray::{Array1, Array2};

/// Results of a successful fit.
#[derive(Debug, Clone)]
pub struct FittedModel {
    trace: PosteriorTrace,
    warnings: Vec<SamplerWarning>,
    diagnostics: Vec<ParamDiagnostics>,
    run_stats: Option<RunStats>,
    n_features: usize,
}

impl FittedModel {
    pub fn trace(&self) -> &PosteriorTrace {
        &self.trace
    }

    pub fn warnings(&self) -> &[SamplerWarning] {
        &self.warnings
    }

    pub fn diagnostics(&self) -> &[ParamDiagnostics] {
        &self.diagnostics
    }

    /// R-hat and ESS summarised over all latent scalars.
    pub fn run_stats(&self) -> Option<&RunStats> {
        self.run_stats.as_ref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[derive(Debug, Clone, Default)]
pub enum ModelState {
    #[default]
    Unfit,
    Fitted(FittedModel),
}

/// A multilevel Student-t regression with a fixed pooling variant.
///
/// ```no_run
/// use multilevel_regression::{Dataset, MultilevelModel, PoolingVariant, SamplerConfig};
/// use ndarray::array;
///
/// let data = Dataset::from_single_feature(array![0.0, 1.0, 2.0, 3.0], array![1.0, 3.1, 4.9, 7.2])?
///     .with_groups(array![0, 0, 1, 1], 2)?;
/// let mut model = MultilevelModel::new(PoolingVariant::PartialPooled);
/// model.fit(&data, &SamplerConfig::default().with_draws(1000).with_burn(200))?;
/// let (_, estimates) = model.predict(&array![[1.5]], Some(&array![1]), Some(&[0.05, 0.95]))?;
/// # Ok::<(), multilevel_regression::ModelError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MultilevelModel<S: PosteriorSampler = MetropolisWithinGibbs> {
    variant: PoolingVariant,
    priors: Priors,
    sampler: S,
    state: ModelState,
}

impl MultilevelModel<MetropolisWithinGibbs> {
    pub fn new(variant: PoolingVariant) -> Self {
        Self {
            variant,
            priors: Priors::default(),
            sampler: MetropolisWithinGibbs::default(),
            state: ModelState::Unfit,
        }
    }
}

impl<S: PosteriorSampler> MultilevelModel<S> {
    pub fn with_priors(mut self, priors: Priors) -> Self {
        self.priors = priors;
        self
    }

    /// Replace the sampler. Any fitted state is kept.
    pub fn with_sampler<T: PosteriorSampler>(self, sampler: T) -> MultilevelModel<T> {
        MultilevelModel {
            variant: self.variant,
            priors: self.priors,
            sampler,
            state: self.state,
        }
    }

    pub fn variant(&self) -> PoolingVariant {
        self.variant
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ModelState::Fitted(_))
    }

    fn fitted(&self) -> Result<&FittedModel> {
        match &self.state {
            ModelState::Fitted(fitted) => Ok(fitted),
            ModelState::Unfit => Err(ModelError::NotFitted),
        }
    }

    /// Posterior trace of the last successful fit.
    pub fn trace(&self) -> Result<&PosteriorTrace> {
        self.fitted().map(FittedModel::trace)
    }

    /// Sampler warnings of the last successful fit; empty before fitting.
    pub fn warnings(&self) -> &[SamplerWarning] {
        self.fitted().map(FittedModel::warnings).unwrap_or(&[])
    }

    /// Fit the model to `data`, replacing any previous fit.
    pub fn fit(&mut self, data: &Dataset, config: &SamplerConfig) -> Result<&mut Self> {
        self.fit_with_cancel(data, config, &CancellationToken::new())
    }

    /// As [`fit`](Self::fit), stopping early when `cancel` is triggered.
    ///
    /// On any error, including cancellation, the previous state is left untouched.
    pub fn fit_with_cancel(
        &mut self,
        data: &Dataset,
        config: &SamplerConfig,
        cancel: &CancellationToken,
    ) -> Result<&mut Self> {
        config.validate()?;
        let graph = self.variant.build(data, &self.priors)?;
        tracing::info!(
            variant = %self.variant,
            observations = data.n_observations(),
            features = data.n_features(),
            groups = data.n_groups().unwrap_or(1),
            "fitting model"
        );

        let output = self.sampler.sample(&graph, config, cancel)?;
        tracing::info!(
            variant = %self.variant,
            draws = output.trace.n_draws(),
            warnings = output.warnings.len(),
            "fit finished"
        );
        self.state = ModelState::Fitted(FittedModel {
            trace: output.trace,
            warnings: output.warnings,
            diagnostics: output.diagnostics,
            run_stats: output.run_stats,
            n_features: data.n_features(),
        });
        Ok(self)
    }

    /// Predict new observation-major rows `x`.
    ///
    /// Returns the predictive distribution together with point estimates: the
    /// predictive mean when `quantiles` is `None`, otherwise one array per
    /// requested probability.
    pub fn predict(
        &self,
        x: &Array2<f64>,
        group_idx: Option<&Array1<usize>>,
        quantiles: Option<&[f64]>,
    ) -> Result<(PredictiveDistribution, Estimates)> {
        let fitted = self.fitted()?;
        if x.ncols() != fitted.n_features {
            return Err(ModelError::ShapeMismatch(format!(
                "model was fitted with {} feature(s), got {}",
                fitted.n_features,
                x.ncols()
            )));
        }
        if self.variant.requires_groups() && group_idx.is_none() {
            return Err(ModelError::NotBuilt {
                variant: self.variant.name(),
                missing: "group index",
            });
        }

        let dist = PredictiveDistribution::from_trace(
            &fitted.trace,
            x.view(),
            group_idx.map(|idx| idx.view()),
        )?;
        let estimates = match quantiles {
            None => Estimates::Mean(dist.mean()),
            Some(qs) => Estimates::Quantiles(dist.quantiles(qs)?),
        };
        Ok((dist, estimates))
    }
}

impl<S: PosteriorSampler + Clone> MultilevelModel<S> {
    /// Copy of the model configuration without any fitted state.
    pub fn unfitted_clone(&self) -> Self {
        Self {
            variant: self.variant,
            priors: self.priors.clone(),
            sampler: self.sampler.clone(),
            state: ModelState::Unfit,
        }
    }
}
