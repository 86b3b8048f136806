use criterion::{Criterion, black_box, criterion_group, criterion_main};
use multilevel_regression::{Dataset, MultilevelModel, PoolingVariant, SamplerConfig};
use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;
use std::time::Duration;

fn grouped_data(n: usize, n_groups: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let noise = Normal::new(0.0, 0.5).unwrap();
    let x = Array1::linspace(-1.0, 1.0, n);
    let idx: Array1<usize> = (0..n).map(|i| i % n_groups).collect();
    let y: Array1<f64> = x
        .iter()
        .zip(idx.iter())
        .map(|(&xi, &g)| 0.2 * g as f64 + 1.5 * xi + rng.sample(noise))
        .collect();
    Dataset::from_single_feature(x, y)
        .unwrap()
        .with_groups(idx, n_groups)
        .unwrap()
}

fn bench_fit(cr: &mut Criterion) {
    let data = grouped_data(400, 8);
    let config = SamplerConfig::default()
        .with_draws(500)
        .with_tune(250)
        .with_burn(100);

    for variant in [
        PoolingVariant::Pooled,
        PoolingVariant::Unpooled,
        PoolingVariant::PartialPooled,
    ] {
        cr.bench_function(&format!("fit_{variant}_400obs_8groups"), |bench| {
            bench.iter(|| {
                let mut model = MultilevelModel::new(variant);
                model.fit(&data, &config).unwrap();
                black_box(model.is_fitted());
            });
        });
    }

    #[cfg(feature = "rayon")]
    {
        let single_core = config.clone().with_cores(1);
        cr.bench_function("fit_partial-pooled_single_core", |bench| {
            bench.iter(|| {
                let mut model = MultilevelModel::new(PoolingVariant::PartialPooled);
                model.fit(&data, &single_core).unwrap();
                black_box(model.is_fitted());
            });
        });
    }
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(10))
        .sample_size(10);
    targets = bench_fit
);
criterion_main!(benches);
