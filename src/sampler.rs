//! Posterior sampling.
//!
//! [`PosteriorSampler`] is the seam between a built [`ModelGraph`] and the
//! [`PosteriorTrace`] a fit stores. The bundled [`MetropolisWithinGibbs`] sampler
//! sweeps the unconstrained coordinates one at a time with a random-walk
//! Metropolis step, tuning one step size per coordinate by dual averaging during
//! warm-up. Chains run independently, each with its own `ChaCha8Rng` seeded from
//! `seed + chain`, and in parallel when the `rayon` feature is enabled.

use crate::config::SamplerConfig;
use crate::density::LogDensity;
use crate::diagnostics::{self, ParamDiagnostics};
use crate::error::{ModelError, Result, SamplerWarning};
use crate::graph::ModelGraph;
use crate::rng::{ProposalKernel, RngDraw};
use crate::trace::{PosteriorTrace, VariableSpec};
use mini_mcmc::core::init_det;
use mini_mcmc::distributions::Conditional;
use mini_mcmc::stats::RunStats;
use ndarray::Array3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A post-warm-up proposal whose log-density falls this far below the current
/// state counts as a divergence.
pub const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// Optimal acceptance rate of a one-dimensional random-walk Metropolis update
/// (Gelman, Roberts and Gilks, 1996).
pub const RANDOM_WALK_ACCEPT: f64 = 0.44;
/// The `target_accept` that maps onto [`RANDOM_WALK_ACCEPT`].
const REFERENCE_TARGET_ACCEPT: f64 = 0.8;

const DA_GAMMA: f64 = 0.05;
const DA_T0: f64 = 10.0;
const DA_KAPPA: f64 = 0.75;

/// Shared flag that asks running chains to stop at the next sweep.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a sampler hands back to the model.
#[derive(Debug, Clone)]
pub struct SampleOutput {
    pub trace: PosteriorTrace,
    pub warnings: Vec<SamplerWarning>,
    pub diagnostics: Vec<ParamDiagnostics>,
    /// Summary of R-hat and ESS across latent scalars; `None` for chains too short
    /// to diagnose.
    pub run_stats: Option<RunStats>,
    /// Post-warm-up acceptance rate of each chain.
    pub acceptance: Vec<f64>,
}

/// Draws from the posterior of a built model.
///
/// Implementations must be deterministic for a fixed `config.seed`, must check
/// `cancel` regularly, and must return a trace holding every latent and
/// deterministic variable of `graph` under its declared name and shape.
pub trait PosteriorSampler: Send + Sync {
    fn sample(
        &self,
        graph: &ModelGraph<'_>,
        config: &SamplerConfig,
        cancel: &CancellationToken,
    ) -> Result<SampleOutput>;
}

/// Component-wise random-walk Metropolis with per-coordinate step adaptation.
#[derive(Debug, Clone)]
pub struct MetropolisWithinGibbs {
    /// Step size every coordinate starts warm-up with.
    pub initial_step: f64,
    /// Chains start at `init_det` plus uniform jitter of this half-width.
    pub init_jitter: f64,
}

impl Default for MetropolisWithinGibbs {
    fn default() -> Self {
        Self {
            initial_step: 1.0,
            init_jitter: 1.0,
        }
    }
}

impl MetropolisWithinGibbs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    pub fn with_init_jitter(mut self, half_width: f64) -> Self {
        self.init_jitter = half_width;
        self
    }
}

/// Per-coordinate acceptance target for a configured `target_accept`.
///
/// `target_accept` is stated on the gradient-sampler scale, where 0.8 is the usual
/// default. It is rescaled linearly so that 0.8 maps to [`RANDOM_WALK_ACCEPT`],
/// then clamped to `[0.05, 0.95]`.
pub fn coordinate_target(target_accept: f64) -> f64 {
    (RANDOM_WALK_ACCEPT * target_accept / REFERENCE_TARGET_ACCEPT).clamp(0.05, 0.95)
}

/// Dual-averaging step size (Hoffman and Gelman, 2014).
#[derive(Debug, Clone)]
struct StepAdapter {
    step: f64,
    mu: f64,
    target: f64,
    h_bar: f64,
    log_step_bar: f64,
    count: f64,
}

impl StepAdapter {
    fn new(initial: f64, target: f64) -> Self {
        Self {
            step: initial,
            mu: (10.0 * initial).ln(),
            target,
            h_bar: 0.0,
            log_step_bar: 0.0,
            count: 0.0,
        }
    }

    fn update(&mut self, accept_prob: f64) {
        self.count += 1.0;
        let w = 1.0 / (self.count + DA_T0);
        self.h_bar = (1.0 - w) * self.h_bar + w * (self.target - accept_prob);
        let log_step = self.mu - self.count.sqrt() / DA_GAMMA * self.h_bar;
        self.step = log_step.exp();
        let m_pow = self.count.powf(-DA_KAPPA);
        self.log_step_bar = m_pow * log_step + (1.0 - m_pow) * self.log_step_bar;
    }

    fn finish(&mut self) {
        if self.count > 0.0 {
            self.step = self.log_step_bar.exp();
        }
    }
}

/// Metropolis update of a single coordinate, plugged into the sweep through
/// mini-mcmc's `Conditional` interface.
#[derive(Clone)]
struct CoordinateConditional<'d, 'a> {
    density: &'d LogDensity<'a>,
    kernel: ProposalKernel,
    rng: ChaCha8Rng,
    steps: Vec<StepAdapter>,
    warmup: bool,
    accepted: u64,
    proposed: u64,
    divergences: usize,
}

impl<'d, 'a> CoordinateConditional<'d, 'a> {
    fn new(density: &'d LogDensity<'a>, rng: ChaCha8Rng, initial_step: f64, target: f64) -> Self {
        Self {
            density,
            kernel: ProposalKernel::new(),
            rng,
            steps: vec![StepAdapter::new(initial_step, target); density.dim()],
            warmup: true,
            accepted: 0,
            proposed: 0,
            divergences: 0,
        }
    }

    fn end_warmup(&mut self) {
        self.warmup = false;
        self.steps.iter_mut().for_each(StepAdapter::finish);
    }

    fn acceptance_rate(&self) -> f64 {
        if self.proposed == 0 {
            return 0.0;
        }
        self.accepted as f64 / self.proposed as f64
    }
}

impl Conditional<f64> for CoordinateConditional<'_, '_> {
    fn sample(&mut self, i: usize, given: &[f64]) -> f64 {
        let current = given[i];
        let proposal = current + self.steps[i].step * self.kernel.sample_norm(&mut self.rng);
        let lp_current = self.density.conditional(i, given);
        let lp_proposal = self.density.conditional_at(i, proposal, given);
        let log_ratio = lp_proposal - lp_current;
        let accept_prob = if log_ratio.is_nan() {
            0.0
        } else {
            log_ratio.min(0.0).exp()
        };

        if self.warmup {
            self.steps[i].update(accept_prob);
        } else {
            self.proposed += 1;
            if log_ratio.is_nan() || log_ratio < -DIVERGENCE_THRESHOLD {
                self.divergences += 1;
            }
        }

        if self.kernel.sample_unif(&mut self.rng) < accept_prob {
            if !self.warmup {
                self.accepted += 1;
            }
            proposal
        } else {
            current
        }
    }
}

/// Realised draws and counters of one finished chain.
struct ChainRun {
    draws: Vec<Vec<f64>>,
    acceptance: f64,
    divergences: usize,
}

fn run_chain(
    density: &LogDensity<'_>,
    settings: &MetropolisWithinGibbs,
    config: &SamplerConfig,
    chain: usize,
    mut state: Vec<f64>,
    cancel: &CancellationToken,
) -> Result<ChainRun> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(chain as u64));
    let kernel = ProposalKernel::new();
    for v in state.iter_mut() {
        *v += kernel.sample_jitter(&mut rng, settings.init_jitter);
    }

    let mut conditional = CoordinateConditional::new(
        density,
        rng,
        settings.initial_step,
        coordinate_target(config.target_accept),
    );
    if config.tune == 0 {
        conditional.end_warmup();
    }

    let width = density.realized_len();
    let mut draws = Vec::with_capacity(config.draws);
    for iter in 0..config.tune + config.draws {
        if cancel.is_cancelled() {
            tracing::debug!(chain, iter, "chain cancelled");
            return Err(ModelError::Cancelled);
        }
        for i in 0..state.len() {
            let next = conditional.sample(i, &state);
            state[i] = next;
        }
        if iter + 1 == config.tune {
            conditional.end_warmup();
        }
        if iter >= config.tune {
            let mut realized = Vec::with_capacity(width);
            density.realize(&state, &mut realized);
            draws.push(realized);
        }
    }

    let acceptance = conditional.acceptance_rate();
    tracing::debug!(
        chain,
        acceptance,
        divergences = conditional.divergences,
        "chain finished"
    );
    Ok(ChainRun {
        draws,
        acceptance,
        divergences: conditional.divergences,
    })
}

impl MetropolisWithinGibbs {
    #[cfg(feature = "rayon")]
    fn run_chains(
        &self,
        density: &LogDensity<'_>,
        config: &SamplerConfig,
        inits: Vec<Vec<f64>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChainRun>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.cores.min(config.chains))
            .build()
            .map_err(|e| ModelError::ThreadPool(e.to_string()))?;
        let runs: Vec<Result<ChainRun>> = pool.install(|| {
            inits
                .into_par_iter()
                .enumerate()
                .map(|(chain, init)| run_chain(density, self, config, chain, init, cancel))
                .collect()
        });
        runs.into_iter().collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn run_chains(
        &self,
        density: &LogDensity<'_>,
        config: &SamplerConfig,
        inits: Vec<Vec<f64>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChainRun>> {
        inits
            .into_iter()
            .enumerate()
            .map(|(chain, init)| run_chain(density, self, config, chain, init, cancel))
            .collect()
    }
}

impl PosteriorSampler for MetropolisWithinGibbs {
    fn sample(
        &self,
        graph: &ModelGraph<'_>,
        config: &SamplerConfig,
        cancel: &CancellationToken,
    ) -> Result<SampleOutput> {
        config.validate()?;
        let density = LogDensity::new(graph)?;
        let inits: Vec<Vec<f64>> = init_det(config.chains, density.dim());

        tracing::debug!(
            dim = density.dim(),
            chains = config.chains,
            tune = config.tune,
            draws = config.draws,
            seed = config.seed,
            "sampling posterior"
        );
        let runs = self.run_chains(&density, config, inits, cancel)?;

        let specs = variable_specs(graph);
        let chains: Vec<Vec<Vec<f64>>> = runs.iter().map(|r| r.draws.clone()).collect();
        let trace = PosteriorTrace::from_chains(specs.clone(), &chains, config.burn)?;

        let (diagnostics, run_stats) = latent_diagnostics(graph, &specs, &chains, config.burn);
        if let Some(stats) = &run_stats {
            tracing::debug!(%stats, "convergence summary");
        }
        let mut warnings: Vec<SamplerWarning> = runs
            .iter()
            .enumerate()
            .filter(|(_, r)| r.divergences > 0)
            .map(|(chain, r)| SamplerWarning::Divergences {
                chain,
                count: r.divergences,
            })
            .collect();
        warnings.extend(diagnostics::warnings_for(&diagnostics, config.chains));
        for warning in &warnings {
            tracing::warn!(%warning, "sampler diagnostic");
        }

        Ok(SampleOutput {
            trace,
            warnings,
            diagnostics,
            run_stats,
            acceptance: runs.iter().map(|r| r.acceptance).collect(),
        })
    }
}

/// Trace layout of a graph: latents first, then deterministic nodes.
pub fn variable_specs(graph: &ModelGraph<'_>) -> Vec<VariableSpec> {
    graph
        .latents
        .iter()
        .map(|l| VariableSpec::new(&l.name, l.shape.clone(), l.grouped))
        .chain(
            graph
                .deterministics
                .iter()
                .map(|d| VariableSpec::new(&d.name, d.shape.clone(), d.grouped)),
        )
        .collect()
}

/// R-hat and ESS of every latent scalar over the retained draws of each chain.
///
/// Latents lead every realised draw, so their columns are stacked into a
/// `(chains, draws, parameters)` array for `mini_mcmc::stats`.
fn latent_diagnostics(
    graph: &ModelGraph<'_>,
    specs: &[VariableSpec],
    chains: &[Vec<Vec<f64>>],
    burn: usize,
) -> (Vec<ParamDiagnostics>, Option<RunStats>) {
    let labels: Vec<String> = specs
        .iter()
        .take(graph.latents.len())
        .flat_map(|spec| (0..spec.size()).map(move |i| spec.element_label(i)))
        .collect();
    let retained = chains.first().map_or(0, |c| c.len().saturating_sub(burn));
    let samples = Array3::from_shape_fn((chains.len(), retained, labels.len()), |(c, d, p)| {
        chains[c][burn + d][p]
    });
    diagnostics::diagnose(&labels, samples.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Priors;
    use crate::data::Dataset;
    use crate::regression::PoolingVariant;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn line(n: usize) -> Dataset {
        let x = Array1::linspace(-1.0, 1.0, n);
        let y = x.mapv(|v: f64| 1.0 + 2.0 * v + 0.3 * (7.0 * v).sin());
        Dataset::from_single_feature(x, y).unwrap()
    }

    fn small_config() -> SamplerConfig {
        SamplerConfig::default()
            .with_draws(300)
            .with_tune(300)
            .with_burn(50)
            .with_chains(2)
            .with_cores(2)
    }

    #[test]
    fn dual_averaging_shrinks_step_when_acceptance_is_low() {
        let mut adapter = StepAdapter::new(1.0, 0.8);
        for _ in 0..200 {
            adapter.update(0.1);
        }
        adapter.finish();
        assert!(adapter.step < 1.0, "step {}", adapter.step);

        let mut adapter = StepAdapter::new(1.0, 0.8);
        for _ in 0..200 {
            adapter.update(1.0);
        }
        adapter.finish();
        assert!(adapter.step > 1.0, "step {}", adapter.step);
    }

    #[test]
    fn trace_holds_every_variable_with_retained_draws() {
        let data = line(40);
        let graph = PoolingVariant::Pooled.build(&data, &Priors::default()).unwrap();
        let config = small_config();
        let out = MetropolisWithinGibbs::default()
            .sample(&graph, &config, &CancellationToken::new())
            .unwrap();

        assert_eq!(out.trace.n_draws(), 2 * config.retained_per_chain());
        assert_eq!(out.trace.n_chains(), 2);
        for name in ["alpha", "beta", "sigma", "nu"] {
            assert!(out.trace.get(name).is_some(), "{name} missing");
        }
        let sigma = out.trace.get("sigma").unwrap().values();
        assert!(sigma.iter().all(|&s| s > 0.0));
        assert_eq!(out.acceptance.len(), 2);
        assert!(out.acceptance.iter().all(|&a| a > 0.05 && a < 0.99));
        assert!(out.run_stats.is_some());
        assert_eq!(out.diagnostics.len(), 4);
    }

    #[test]
    fn default_target_maps_to_random_walk_optimum() {
        assert_relative_eq!(coordinate_target(0.8), RANDOM_WALK_ACCEPT);
        assert!(coordinate_target(0.95) > coordinate_target(0.8));
        assert!(coordinate_target(0.5) < coordinate_target(0.8));
        assert_relative_eq!(coordinate_target(1e-6), 0.05);
    }

    #[test]
    fn adapted_steps_accept_near_random_walk_target() {
        let data = line(100);
        let graph = PoolingVariant::Pooled.build(&data, &Priors::default()).unwrap();
        let config = small_config().with_tune(500);
        let out = MetropolisWithinGibbs::default()
            .sample(&graph, &config, &CancellationToken::new())
            .unwrap();
        for &rate in &out.acceptance {
            assert!(rate > 0.2 && rate < 0.7, "acceptance {rate}");
        }
    }

    #[test]
    fn oversized_steps_are_counted_as_divergences() {
        let data = line(40);
        let graph = PoolingVariant::Pooled.build(&data, &Priors::default()).unwrap();
        let config = small_config().with_tune(0).with_draws(100).with_burn(0);
        let out = MetropolisWithinGibbs::default()
            .with_initial_step(1e4)
            .sample(&graph, &config, &CancellationToken::new())
            .unwrap();
        assert_eq!(out.trace.n_draws(), 200);
        for chain in 0..2 {
            assert!(out.warnings.iter().any(|w| matches!(
                w,
                SamplerWarning::Divergences { chain: c, count } if *c == chain && *count > 0
            )));
        }
    }

    #[test]
    fn same_seed_gives_identical_draws() {
        let data = line(30);
        let graph = PoolingVariant::Pooled.build(&data, &Priors::default()).unwrap();
        let config = small_config().with_seed(9);
        let sampler = MetropolisWithinGibbs::default();
        let a = sampler.sample(&graph, &config, &CancellationToken::new()).unwrap();
        let b = sampler.sample(&graph, &config, &CancellationToken::new()).unwrap();
        assert_eq!(
            a.trace.get("beta").unwrap().values(),
            b.trace.get("beta").unwrap().values()
        );
    }

    #[test]
    fn cancelled_token_stops_sampling() {
        let data = line(20);
        let graph = PoolingVariant::Pooled.build(&data, &Priors::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = MetropolisWithinGibbs::default().sample(&graph, &small_config(), &cancel);
        assert_eq!(result.unwrap_err(), ModelError::Cancelled);
    }

    #[test]
    fn invalid_config_is_rejected_before_sampling() {
        let data = line(20);
        let graph = PoolingVariant::Pooled.build(&data, &Priors::default()).unwrap();
        let config = small_config().with_burn(1000);
        assert!(matches!(
            MetropolisWithinGibbs::default().sample(&graph, &config, &CancellationToken::new()),
            Err(ModelError::InvalidConfig(_))
        ));
    }
}
