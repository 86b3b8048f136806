use multilevel_regression::{
    Dataset, KFold, MultilevelModel, PoolingVariant, SamplerConfig, cross_validate,
};
use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

fn line_data(extra_noise: f64, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let base = Normal::new(0.0, 0.3).unwrap();
    let extra = Normal::new(0.0, extra_noise.max(1e-12)).unwrap();
    let n = 80;
    let x = Array1::linspace(-2.0, 2.0, n);
    let y = x.mapv(|xi| {
        let mut yi = 1.0 + 2.0 * xi + rng.sample(base);
        if extra_noise > 0.0 {
            yi += rng.sample(extra);
        }
        yi
    });
    Dataset::from_single_feature(x, y).unwrap()
}

fn config() -> SamplerConfig {
    SamplerConfig::default()
        .with_draws(400)
        .with_tune(300)
        .with_burn(100)
        .with_chains(2)
        .with_cores(2)
}

#[test]
fn rmse_is_finite_and_grows_with_noise() {
    let model = MultilevelModel::new(PoolingVariant::Pooled);
    let kfold = KFold::new(4).with_seed(17);

    let clean = cross_validate(&model, &line_data(0.0, 1), &config(), &kfold).unwrap();
    let noisy = cross_validate(&model, &line_data(3.0, 1), &config(), &kfold).unwrap();

    assert_eq!(clean.folds.len(), 4);
    assert!(clean.failures().is_empty());
    for fold in &clean.folds {
        assert_eq!(fold.n_train + fold.n_test, 80);
        assert_eq!(fold.n_test, 20);
    }
    let clean_rmse = clean.mean_rmse().unwrap();
    let noisy_rmse = noisy.mean_rmse().unwrap();
    assert!(clean_rmse.is_finite() && clean_rmse >= 0.0);
    assert!(clean_rmse < 0.6, "clean rmse {clean_rmse}");
    assert!(noisy_rmse > clean_rmse, "{noisy_rmse} <= {clean_rmse}");
}

#[test]
fn template_model_stays_unfit() {
    let model = MultilevelModel::new(PoolingVariant::Pooled);
    let cv = cross_validate(&model, &line_data(0.0, 2), &config(), &KFold::new(2)).unwrap();
    assert_eq!(cv.scores().len(), 2);
    assert!(!model.is_fitted());
}
