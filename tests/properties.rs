use multilevel_regression::graph::ModelGraph;
use multilevel_regression::sampler::variable_specs;
use multilevel_regression::{
    CancellationToken, Dataset, MetropolisWithinGibbs, ModelError, MultilevelModel,
    PoolingVariant, PosteriorSampler, PosteriorTrace, PredictiveDistribution, SampleOutput,
    SamplerConfig, SamplerWarning, VariableSpec,
};
use ndarray::{Array1, Array2, array};
use proptest::prelude::*;

/// Fails the test if sampling is ever reached.
#[derive(Debug, Clone)]
struct UnreachableSampler;

impl PosteriorSampler for UnreachableSampler {
    fn sample(
        &self,
        _graph: &ModelGraph<'_>,
        _config: &SamplerConfig,
        _cancel: &CancellationToken,
    ) -> multilevel_regression::Result<SampleOutput> {
        panic!("structural errors must be raised before sampling");
    }
}

/// Every variable fixed at one value in every draw.
#[derive(Debug, Clone)]
struct PointMassSampler;

impl PosteriorSampler for PointMassSampler {
    fn sample(
        &self,
        graph: &ModelGraph<'_>,
        _config: &SamplerConfig,
        _cancel: &CancellationToken,
    ) -> multilevel_regression::Result<SampleOutput> {
        let entries = variable_specs(graph)
            .into_iter()
            .map(|spec| {
                let size = spec.size();
                (spec, Array2::from_elem((3, size), 1.5))
            })
            .collect();
        Ok(SampleOutput {
            trace: PosteriorTrace::from_draws(entries)?,
            warnings: Vec::new(),
            diagnostics: Vec::new(),
            run_stats: None,
            acceptance: Vec::new(),
        })
    }
}

fn grouped_data(n_groups: usize) -> Dataset {
    let n = 2 * n_groups;
    let x = Array1::linspace(0.0, 1.0, n);
    let y = x.mapv(|v: f64| 1.0 + v + 0.2 * (13.0 * v).sin());
    let idx: Array1<usize> = (0..n).map(|i| i % n_groups).collect();
    Dataset::from_single_feature(x, y)
        .unwrap()
        .with_groups(idx, n_groups)
        .unwrap()
}

#[test]
fn predict_before_fit_fails_for_every_variant() {
    for variant in [
        PoolingVariant::Pooled,
        PoolingVariant::Unpooled,
        PoolingVariant::PartialPooled,
    ] {
        let model = MultilevelModel::new(variant);
        assert_eq!(
            model
                .predict(&array![[0.0]], Some(&array![0]), None)
                .unwrap_err(),
            ModelError::NotFitted
        );
    }
}

#[test]
fn grouped_variants_without_groups_fail_before_sampling() {
    let data = Dataset::from_single_feature(array![0.0, 1.0, 2.0], array![1.0, 2.0, 3.0]).unwrap();
    for variant in [PoolingVariant::Unpooled, PoolingVariant::PartialPooled] {
        let mut model = MultilevelModel::new(variant).with_sampler(UnreachableSampler);
        assert!(matches!(
            model.fit(&data, &SamplerConfig::default()),
            Err(ModelError::NotBuilt {
                missing: "group index",
                ..
            })
        ));
    }
}

#[test]
fn empty_unpooled_group_fails_before_sampling() {
    let data = Dataset::from_single_feature(array![0.0, 1.0, 2.0], array![1.0, 2.0, 3.0])
        .unwrap()
        .with_groups(array![0, 0, 2], 3)
        .unwrap();
    let mut model = MultilevelModel::new(PoolingVariant::Unpooled).with_sampler(UnreachableSampler);
    assert_eq!(
        model.fit(&data, &SamplerConfig::default()).unwrap_err(),
        ModelError::EmptyGroup { group: 1 }
    );
}

#[test]
fn same_seed_gives_same_posterior_means() {
    let data = grouped_data(3);
    let config = SamplerConfig::default()
        .with_draws(200)
        .with_tune(100)
        .with_burn(50)
        .with_chains(2)
        .with_cores(2)
        .with_seed(123);
    let fit = |config: &SamplerConfig| {
        let mut model = MultilevelModel::new(PoolingVariant::PartialPooled);
        model.fit(&data, config).unwrap();
        model.trace().unwrap().posterior_mean("alpha").unwrap()
    };
    assert_eq!(fit(&config), fit(&config));
    assert_ne!(fit(&config), fit(&config.clone().with_seed(124)));
}

#[test]
fn divergent_draws_are_reported_without_failing_the_fit() {
    let config = SamplerConfig::default()
        .with_draws(100)
        .with_tune(0)
        .with_burn(0)
        .with_chains(2)
        .with_cores(2);
    let mut model = MultilevelModel::new(PoolingVariant::Pooled)
        .with_sampler(MetropolisWithinGibbs::default().with_initial_step(1e4));
    model.fit(&grouped_data(4), &config).unwrap();

    assert!(model.is_fitted());
    assert!(model.warnings().iter().any(
        |w| matches!(w, SamplerWarning::Divergences { count, .. } if *count > 0)
    ));
    let trace = model.trace().unwrap();
    assert_eq!(trace.n_draws(), 200);
    assert!(trace.get("sigma").unwrap().values().iter().all(|&s| s > 0.0));
}

proptest! {
    #[test]
    fn out_of_range_group_codes_are_rejected(n_groups in 1usize..6, extra in 0usize..10) {
        let data = Dataset::from_single_feature(array![0.0, 1.0], array![1.0, 2.0]).unwrap();
        let bad = n_groups + extra;
        prop_assert!(matches!(
            data.with_groups(array![0, bad], n_groups),
            Err(ModelError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn out_of_range_prediction_groups_are_rejected(n_groups in 1usize..6, extra in 0usize..10) {
        let mut model = MultilevelModel::new(PoolingVariant::PartialPooled)
            .with_sampler(PointMassSampler);
        model.fit(&grouped_data(n_groups), &SamplerConfig::default()).unwrap();
        let x = array![[0.5], [0.25]];
        let result = model.predict(&x, Some(&array![0, n_groups + extra]), None);
        prop_assert!(matches!(result, Err(ModelError::ShapeMismatch(_))));
        let ok = model.predict(&x, Some(&array![0, n_groups - 1]), None);
        prop_assert!(ok.is_ok());
    }

    #[test]
    fn quantiles_are_monotone_in_q(
        draws in prop::collection::vec(
            (-5.0f64..5.0, -3.0f64..3.0, 0.05f64..5.0, 1.1f64..60.0),
            1..20,
        ),
        x in -10.0f64..10.0,
        q_low in 0.01f64..0.98,
        gap in 0.001f64..0.5,
    ) {
        let q_high = (q_low + gap).min(0.99);
        let n = draws.len();
        let column = |f: fn(&(f64, f64, f64, f64)) -> f64| {
            Array2::from_shape_fn((n, 1), |(d, _)| f(&draws[d]))
        };
        let trace = PosteriorTrace::from_draws(vec![
            (VariableSpec::new("alpha", vec![], false), column(|d| d.0)),
            (VariableSpec::new("beta", vec![1], false), column(|d| d.1)),
            (VariableSpec::new("sigma", vec![], false), column(|d| d.2)),
            (VariableSpec::new("nu", vec![], false), column(|d| d.3)),
        ])
        .unwrap();
        let xs = array![[x]];
        let dist = PredictiveDistribution::from_trace(&trace, xs.view(), None).unwrap();
        let low = dist.quantile(q_low).unwrap();
        let high = dist.quantile(q_high).unwrap();
        prop_assert!(low[0] <= high[0] + 1e-9, "q{} = {} > q{} = {}", q_low, low[0], q_high, high[0]);
    }
}
