//! Log-density of a [`ModelGraph`] on the unconstrained scale.
//!
//! Each latent occupies a contiguous block of coordinates. Positive latents are
//! sampled as their logarithm, with the log-Jacobian added to the density, so every
//! coordinate moves on the whole real line.
//!
//! Samplers update one coordinate at a time, so besides the joint density this
//! exposes the coordinate's conditional density up to a constant: its own prior term
//! plus the likelihood of the observations it influences. A per-group coefficient
//! only touches the rows of its group, which keeps a full sweep linear in the data.

use crate::error::{ModelError, Result};
use crate::graph::{ModelGraph, Prior, Support, Transform};
use ndarray::{ArrayView1, ArrayView2};
use statrs::distribution::{Cauchy, Continuous, Exp, Normal};
use statrs::function::gamma::ln_gamma;
use std::f64::consts::{LN_2, PI};
use std::fmt::Display;

/// Read access to a parameter vector.
pub(crate) trait Params {
    fn get(&self, index: usize) -> f64;
}

impl Params for [f64] {
    #[inline(always)]
    fn get(&self, index: usize) -> f64 {
        self[index]
    }
}

/// A parameter vector with one coordinate replaced, without copying it.
pub(crate) struct Substituted<'a> {
    pub base: &'a [f64],
    pub index: usize,
    pub value: f64,
}

impl Params for Substituted<'_> {
    #[inline(always)]
    fn get(&self, index: usize) -> f64 {
        if index == self.index {
            self.value
        } else {
            self.base[index]
        }
    }
}

/// Prior on the constrained scale.
#[derive(Debug, Clone)]
enum PriorDensity {
    Normal(Normal),
    HalfNormal(Normal),
    HalfCauchy(Cauchy),
    Exponential(Exp),
}

fn invalid<E: Display>(err: E) -> ModelError {
    ModelError::Distribution(err.to_string())
}

impl PriorDensity {
    fn new(prior: &Prior) -> Result<Self> {
        Ok(match *prior {
            Prior::Normal { mu, sigma } => Self::Normal(Normal::new(mu, sigma).map_err(invalid)?),
            Prior::HalfNormal { sigma } => {
                Self::HalfNormal(Normal::new(0.0, sigma).map_err(invalid)?)
            }
            Prior::HalfCauchy { scale } => {
                Self::HalfCauchy(Cauchy::new(0.0, scale).map_err(invalid)?)
            }
            Prior::Exponential { rate } => Self::Exponential(Exp::new(rate).map_err(invalid)?),
        })
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        match self {
            Self::Normal(d) => d.ln_pdf(x),
            Self::HalfNormal(d) => d.ln_pdf(x) + LN_2,
            Self::HalfCauchy(d) => d.ln_pdf(x) + LN_2,
            Self::Exponential(d) => d.ln_pdf(x),
        }
    }
}

#[inline(always)]
fn constrain(support: Support, raw: f64) -> f64 {
    match support {
        Support::Real => raw,
        Support::Positive => raw.exp(),
    }
}

/// Contiguous coordinates of one latent.
#[derive(Debug, Clone)]
struct Block {
    name: String,
    offset: usize,
    size: usize,
    grouped: bool,
    /// Size along the non-group axes.
    feature_dim: usize,
    support: Support,
    prior: PriorDensity,
}

/// Where a coefficient's value comes from.
#[derive(Debug, Clone, Copy)]
enum CoefSource {
    Latent(usize),
    NonCentered {
        mean: usize,
        scale: usize,
        offset: usize,
    },
}

/// Deterministic node realised alongside the latents.
#[derive(Debug, Clone)]
struct Derived {
    size: usize,
    grouped: bool,
    source: CoefSource,
}

/// Which observations a coordinate influences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Prior,
    Group(usize),
    All,
}

/// Compiled, read-only log-density shared by all chains.
#[derive(Debug, Clone)]
pub(crate) struct LogDensity<'a> {
    blocks: Vec<Block>,
    derived: Vec<Derived>,
    scopes: Vec<Scope>,
    coord_block: Vec<usize>,
    intercept: CoefSource,
    slope: CoefSource,
    sigma: usize,
    nu: usize,
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    group_idx: Option<ArrayView1<'a, usize>>,
    grouped: bool,
    n_groups: usize,
    rows_by_group: Vec<Vec<usize>>,
}

impl<'a> LogDensity<'a> {
    pub fn new(graph: &ModelGraph<'a>) -> Result<Self> {
        let location = &graph.likelihood.location;
        let n_groups = location.n_groups.max(1);
        let n_features = location.x.ncols();

        let mut blocks = Vec::with_capacity(graph.latents.len());
        let mut offset = 0;
        for latent in &graph.latents {
            let size = latent.size();
            if latent.grouped && latent.shape.last() != Some(&location.n_groups) {
                return Err(ModelError::ShapeMismatch(format!(
                    "grouped latent {} has shape {:?}, expected a last axis of {}",
                    latent.name, latent.shape, location.n_groups
                )));
            }
            let feature_dim = if latent.grouped { size / n_groups } else { size };
            blocks.push(Block {
                name: latent.name.clone(),
                offset,
                size,
                grouped: latent.grouped,
                feature_dim,
                support: latent.prior.support(),
                prior: PriorDensity::new(&latent.prior)?,
            });
            offset += size;
        }
        let dim = offset;

        let block_index = |name: &str| -> Result<usize> {
            blocks
                .iter()
                .position(|b| b.name == name)
                .ok_or_else(|| ModelError::ShapeMismatch(format!("unknown latent {name}")))
        };

        let mut derived = Vec::with_capacity(graph.deterministics.len());
        for node in &graph.deterministics {
            let Transform::NonCentered {
                mean,
                scale,
                offset: standardized,
            } = &node.transform;
            let source = CoefSource::NonCentered {
                mean: block_index(mean)?,
                scale: block_index(scale)?,
                offset: block_index(standardized)?,
            };
            derived.push(Derived {
                size: node.size(),
                grouped: node.grouped,
                source,
            });
        }

        let resolve = |name: &str| -> Result<CoefSource> {
            if let Ok(b) = block_index(name) {
                return Ok(CoefSource::Latent(b));
            }
            graph
                .deterministics
                .iter()
                .position(|d| d.name == name)
                .map(|i| derived[i].source)
                .ok_or_else(|| ModelError::ShapeMismatch(format!("unknown coefficient {name}")))
        };
        let intercept = resolve(&location.intercept)?;
        let slope = resolve(&location.slope)?;
        let sigma = block_index(&graph.likelihood.sigma)?;
        let nu = block_index(&graph.likelihood.nu)?;

        let source_blocks = |src: CoefSource| -> Vec<usize> {
            match src {
                CoefSource::Latent(b) => vec![b],
                CoefSource::NonCentered {
                    mean,
                    scale,
                    offset,
                } => vec![mean, scale, offset],
            }
        };
        let mut referenced = source_blocks(intercept);
        referenced.extend(source_blocks(slope));
        referenced.extend([sigma, nu]);

        for &b in source_blocks(slope).iter() {
            let fd = blocks[b].feature_dim;
            if fd != n_features && fd != 1 {
                return Err(ModelError::ShapeMismatch(format!(
                    "slope component {} spans {fd} features, data has {n_features}",
                    blocks[b].name
                )));
            }
        }
        for b in [sigma, nu] {
            if blocks[b].size != 1 || blocks[b].support != Support::Positive {
                return Err(ModelError::ShapeMismatch(format!(
                    "{} must be a positive scalar",
                    blocks[b].name
                )));
            }
        }

        let grouped = referenced.iter().any(|&b| blocks[b].grouped);
        if grouped && location.group_idx.is_none() {
            return Err(ModelError::ShapeMismatch(
                "grouped coefficients need a group index".into(),
            ));
        }

        let mut coord_block = Vec::with_capacity(dim);
        let mut scopes = Vec::with_capacity(dim);
        for (b, block) in blocks.iter().enumerate() {
            for element in 0..block.size {
                coord_block.push(b);
                scopes.push(if !referenced.contains(&b) {
                    Scope::Prior
                } else if block.grouped {
                    Scope::Group(element % n_groups)
                } else {
                    Scope::All
                });
            }
        }

        let mut rows_by_group = vec![Vec::new(); if grouped { n_groups } else { 1 }];
        for row in 0..location.x.nrows() {
            let slot = match (grouped, location.group_idx) {
                (true, Some(idx)) => idx[row],
                _ => 0,
            };
            rows_by_group[slot].push(row);
        }

        Ok(Self {
            blocks,
            derived,
            scopes,
            coord_block,
            intercept,
            slope,
            sigma,
            nu,
            x: location.x,
            y: graph.likelihood.observed,
            group_idx: location.group_idx,
            grouped,
            n_groups,
            rows_by_group,
        })
    }

    pub fn dim(&self) -> usize {
        self.coord_block.len()
    }

    fn n_slots(&self) -> usize {
        if self.grouped { self.n_groups } else { 1 }
    }

    #[inline(always)]
    fn slot(&self, row: usize) -> usize {
        match self.group_idx {
            Some(idx) if self.grouped => idx[row],
            _ => 0,
        }
    }

    #[inline(always)]
    fn element(&self, block: &Block, feature: usize, group: usize) -> usize {
        let feature = if block.feature_dim == 1 { 0 } else { feature };
        if block.grouped {
            block.offset + feature * self.n_groups + group
        } else {
            block.offset + feature
        }
    }

    #[inline(always)]
    fn value<P: Params + ?Sized>(&self, b: usize, theta: &P, feature: usize, group: usize) -> f64 {
        let block = &self.blocks[b];
        constrain(block.support, theta.get(self.element(block, feature, group)))
    }

    #[inline(always)]
    fn coefficient<P: Params + ?Sized>(
        &self,
        source: CoefSource,
        theta: &P,
        feature: usize,
        group: usize,
    ) -> f64 {
        match source {
            CoefSource::Latent(b) => self.value(b, theta, feature, group),
            CoefSource::NonCentered {
                mean,
                scale,
                offset,
            } => {
                self.value(mean, theta, feature, group)
                    + self.value(scale, theta, feature, group)
                        * self.value(offset, theta, feature, group)
            }
        }
    }

    /// Intercept followed by slopes for one group, appended to `out`.
    fn slot_coefficients<P: Params + ?Sized>(&self, theta: &P, group: usize, out: &mut Vec<f64>) {
        out.push(self.coefficient(self.intercept, theta, 0, group));
        for feature in 0..self.x.ncols() {
            out.push(self.coefficient(self.slope, theta, feature, group));
        }
    }

    fn prior_term<P: Params + ?Sized>(&self, coord: usize, theta: &P) -> f64 {
        let block = &self.blocks[self.coord_block[coord]];
        let raw = theta.get(coord);
        match block.support {
            Support::Real => block.prior.ln_pdf(raw),
            // log-Jacobian of x = exp(raw)
            Support::Positive => block.prior.ln_pdf(raw.exp()) + raw,
        }
    }

    fn log_likelihood<P: Params + ?Sized>(&self, theta: &P, scope: Scope) -> f64 {
        let sigma = theta.get(self.blocks[self.sigma].offset).exp();
        let nu = theta.get(self.blocks[self.nu].offset).exp();
        let half = 0.5 * (nu + 1.0);
        let norm = ln_gamma(half) - ln_gamma(0.5 * nu) - 0.5 * (nu * PI).ln() - sigma.ln();
        let width = 1 + self.x.ncols();

        let row_term = |row: usize, coefs: &[f64]| -> f64 {
            let mu = coefs[0]
                + coefs[1..]
                    .iter()
                    .zip(self.x.row(row))
                    .map(|(b, x)| b * x)
                    .sum::<f64>();
            let z = (self.y[row] - mu) / sigma;
            norm - half * (z * z / nu).ln_1p()
        };

        let mut coefs = Vec::with_capacity(width * self.n_slots());
        match scope {
            Scope::Prior => 0.0,
            Scope::Group(group) => {
                self.slot_coefficients(theta, group, &mut coefs);
                self.rows_by_group[group]
                    .iter()
                    .map(|&row| row_term(row, &coefs))
                    .sum()
            }
            Scope::All => {
                for slot in 0..self.n_slots() {
                    self.slot_coefficients(theta, slot, &mut coefs);
                }
                (0..self.y.len())
                    .map(|row| {
                        let start = self.slot(row) * width;
                        row_term(row, &coefs[start..start + width])
                    })
                    .sum()
            }
        }
    }

    /// Joint log-density of all coordinates.
    #[cfg(test)]
    pub fn log_density(&self, theta: &[f64]) -> f64 {
        let prior: f64 = (0..self.dim()).map(|i| self.prior_term(i, theta)).sum();
        prior + self.log_likelihood(theta, Scope::All)
    }

    /// Log-density of coordinate `coord` given the others, up to a constant.
    pub fn conditional(&self, coord: usize, given: &[f64]) -> f64 {
        self.prior_term(coord, given) + self.log_likelihood(given, self.scopes[coord])
    }

    /// As [`conditional`](Self::conditional) with coordinate `coord` set to `value`.
    pub fn conditional_at(&self, coord: usize, value: f64, given: &[f64]) -> f64 {
        let theta = Substituted {
            base: given,
            index: coord,
            value,
        };
        self.prior_term(coord, &theta) + self.log_likelihood(&theta, self.scopes[coord])
    }

    /// Length of a realised draw: every latent followed by every deterministic node.
    pub fn realized_len(&self) -> usize {
        self.dim() + self.derived.iter().map(|d| d.size).sum::<usize>()
    }

    /// Map an unconstrained point to the constrained values of all variables,
    /// appending them to `out` in declaration order.
    pub fn realize(&self, theta: &[f64], out: &mut Vec<f64>) {
        for block in &self.blocks {
            out.extend(
                theta[block.offset..block.offset + block.size]
                    .iter()
                    .map(|&raw| constrain(block.support, raw)),
            );
        }
        for node in &self.derived {
            let stride = if node.grouped { self.n_groups } else { 1 };
            for element in 0..node.size {
                out.push(self.coefficient(node.source, theta, element / stride, element % stride));
            }
        }
    }
}
