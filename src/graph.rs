//! Declarative model graphs.
//!
//! A [`ModelGraph`] is a plain value: the latent variables with their priors and
//! shapes, the deterministic nodes derived from them, and a single Student-t
//! likelihood tying the latents to the data. Builders in [`crate::regression`]
//! return one; samplers only read it.

use ndarray::{ArrayView1, ArrayView2};

/// Prior families used by the pooling variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    Normal { mu: f64, sigma: f64 },
    HalfNormal { sigma: f64 },
    HalfCauchy { scale: f64 },
    Exponential { rate: f64 },
}

/// Support of a latent variable, which decides its unconstrained transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    Real,
    Positive,
}

impl Prior {
    pub fn support(&self) -> Support {
        match self {
            Prior::Normal { .. } => Support::Real,
            Prior::HalfNormal { .. } | Prior::HalfCauchy { .. } | Prior::Exponential { .. } => {
                Support::Positive
            }
        }
    }
}

/// A sampled variable.
///
/// `shape` is row-major. When `grouped` is set the last axis indexes groups, so a
/// slope of shape `[n_features, n_groups]` holds one coefficient per feature and group.
#[derive(Debug, Clone, PartialEq)]
pub struct Latent {
    pub name: String,
    pub prior: Prior,
    pub shape: Vec<usize>,
    pub grouped: bool,
}

impl Latent {
    pub fn scalar(name: &str, prior: Prior) -> Self {
        Self {
            name: name.to_string(),
            prior,
            shape: Vec::new(),
            grouped: false,
        }
    }

    pub fn vector(name: &str, prior: Prior, len: usize) -> Self {
        Self {
            name: name.to_string(),
            prior,
            shape: vec![len],
            grouped: false,
        }
    }

    pub fn per_group(name: &str, prior: Prior, shape: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            prior,
            shape,
            grouped: true,
        }
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A variable computed from latents rather than sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct Deterministic {
    pub name: String,
    pub shape: Vec<usize>,
    pub grouped: bool,
    pub transform: Transform,
}

impl Deterministic {
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Deterministic transforms.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// `mean + scale * offset`, the non-centered form of a hierarchical coefficient.
    ///
    /// `mean` and `scale` are ungrouped and broadcast along the group axis of `offset`.
    NonCentered {
        mean: String,
        scale: String,
        offset: String,
    },
}

/// Location of the likelihood: `intercept + x · slope`, per observation.
///
/// `intercept` and `slope` name either latents or deterministic nodes. If they are
/// grouped, observation `i` uses the coefficients of group `group_idx[i]`.
#[derive(Debug, Clone)]
pub struct LinearPredictor<'a> {
    pub intercept: String,
    pub slope: String,
    pub x: ArrayView2<'a, f64>,
    pub group_idx: Option<ArrayView1<'a, usize>>,
    pub n_groups: usize,
}

/// Student-t likelihood of the observed response.
#[derive(Debug, Clone)]
pub struct StudentTLikelihood<'a> {
    pub name: String,
    pub location: LinearPredictor<'a>,
    /// Latent holding the scale.
    pub sigma: String,
    /// Latent holding the degrees of freedom.
    pub nu: String,
    pub observed: ArrayView1<'a, f64>,
}

/// Complete model description consumed by a [`PosteriorSampler`](crate::sampler::PosteriorSampler).
#[derive(Debug, Clone)]
pub struct ModelGraph<'a> {
    pub latents: Vec<Latent>,
    pub deterministics: Vec<Deterministic>,
    pub likelihood: StudentTLikelihood<'a>,
}

impl ModelGraph<'_> {
    pub fn latent(&self, name: &str) -> Option<&Latent> {
        self.latents.iter().find(|l| l.name == name)
    }

    pub fn deterministic(&self, name: &str) -> Option<&Deterministic> {
        self.deterministics.iter().find(|d| d.name == name)
    }

    /// Total number of scalar coordinates the sampler moves.
    pub fn dim(&self) -> usize {
        self.latents.iter().map(Latent::size).sum()
    }

    /// Names of every latent and deterministic node, in declaration order.
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.latents
            .iter()
            .map(|l| l.name.as_str())
            .chain(self.deterministics.iter().map(|d| d.name.as_str()))
    }
}
