//! Five-fold cross-validation of the three pooling variants on grouped data with
//! outliers.

use multilevel_regression::{
    Dataset, KFold, MultilevelModel, PoolingVariant, SamplerConfig, cross_validate,
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::distribution::{Normal, StudentsT};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let n_groups = 6;
    let per_group = 25;
    let n = n_groups * per_group;
    let features = Normal::new(0.0, 1.0)?;
    // heavy tails make a few observations look like outliers
    let noise = StudentsT::new(0.0, 0.5, 3.0)?;

    let x = Array2::from_shape_fn((n, 2), |_| rng.sample(features));
    let group_idx: Array1<usize> = (0..n).map(|i| i / per_group).collect();
    let y: Array1<f64> = (0..n)
        .map(|i| {
            let g = group_idx[i] as f64;
            0.5 * g + (1.0 - 0.1 * g) * x[[i, 0]] - 0.8 * x[[i, 1]] + rng.sample(noise)
        })
        .collect();
    let data = Dataset::new(x, y)?.with_groups(group_idx, n_groups)?;

    let config = SamplerConfig::default()
        .with_draws(800)
        .with_tune(600)
        .with_burn(200)
        .with_chains(2);
    let kfold = KFold::new(5).with_seed(2024);

    for variant in [
        PoolingVariant::Pooled,
        PoolingVariant::Unpooled,
        PoolingVariant::PartialPooled,
    ] {
        let cv = cross_validate(&MultilevelModel::new(variant), &data, &config, &kfold)?;
        let scores: Vec<String> = cv.scores().iter().map(|s| format!("{s:.3}")).collect();
        println!("{variant:>15}: folds [{}]", scores.join(", "));
        match cv.mean_rmse() {
            Some(mean) => println!("{:>15}  mean RMSE {mean:.3}", ""),
            None => {
                for (fold, error) in cv.failures() {
                    println!("{:>15}  fold {fold} failed: {error}", "");
                }
            }
        }
    }
    Ok(())
}
