//! # Multilevel Bayesian Regression
//!
//! This crate fits robust linear regressions to grouped data under three pooling
//! strategies and produces posterior predictive distributions for new rows.
//!
//! ## Features
//!
//! - **Pooling variants** ([`PoolingVariant`]):
//!   - `Pooled`: one intercept and slope vector shared by every observation.
//!   - `Unpooled`: an independent intercept and slope vector per group.
//!   - `PartialPooled`: per-group coefficients drawn from learned hyper-distributions,
//!     sampled in the non-centered parameterization.
//! - **Student-t likelihood** with a learned degrees-of-freedom parameter, so outliers
//!   pull the fit less than under a Gaussian.
//! - **Sampling**: chains run in parallel (feature `rayon`, on by default), each with
//!   its own seeded `ChaCha8Rng`. Split R-hat, ESS and divergence counts are
//!   reported as [`SamplerWarning`]s.
//! - **Prediction**: predictive means and quantiles per row, see
//!   [`PredictiveDistribution`].
//! - **Model checking**: shuffled [`KFold`] cross-validation scored by RMSE, and a
//!   [`BoxCox`] transform for skewed positive responses.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use multilevel_regression::{Dataset, Estimates, MultilevelModel, PoolingVariant, SamplerConfig};
//! use ndarray::array;
//!
//! let x = array![[0.0], [1.0], [0.0], [1.0], [0.0], [1.0]];
//! let y = array![1.2, 0.6, 2.1, 1.4, 0.9, 0.2];
//! let data = Dataset::new(x, y)?.with_groups(array![0, 0, 1, 1, 2, 2], 3)?;
//!
//! let mut model = MultilevelModel::new(PoolingVariant::PartialPooled);
//! model.fit(&data, &SamplerConfig::default())?;
//! for warning in model.warnings() {
//!     eprintln!("{warning}");
//! }
//!
//! let (_, estimates) = model.predict(&array![[1.0]], Some(&array![2]), None)?;
//! if let Estimates::Mean(mean) = estimates {
//!     println!("predicted mean: {}", mean[0]);
//! }
//! # Ok::<(), multilevel_regression::ModelError>(())
//! ```
//!
//! The library only emits `tracing` events; install a subscriber to see them.
//! The `demos` directory in the repository contains a runnable comparison of the
//! three variants.

pub mod config;
pub mod cv;
pub mod data;
mod density;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod model;
pub mod predictive;
pub mod regression;
pub(crate) mod rng;
pub mod sampler;
pub mod trace;
pub mod transform;

pub use config::{Priors, SamplerConfig};
pub use cv::{CrossValidation, FoldOutcome, KFold, cross_validate, rmse};
pub use data::{Dataset, encode_groups};
pub use error::{ModelError, Result, SamplerWarning};
pub use model::{FittedModel, ModelState, MultilevelModel};
pub use predictive::{Estimates, PredictiveDistribution};
pub use regression::PoolingVariant;
pub use sampler::{CancellationToken, MetropolisWithinGibbs, PosteriorSampler, SampleOutput};
pub use trace::{PosteriorTrace, TraceVariable, VariableSpec};
pub use transform::BoxCox;
