use criterion::{criterion_group, criterion_main, Criterion};
use linfa::prelude::{Dataset, Fit};
use ndarray::{array, Array1, Zip};
use ndarray_rand::rand::SeedableRng;
use openbox_space::{Lhs, SamplingMethod};
use openbox_surrogate::correlation_models::Matern52Corr;
use openbox_surrogate::mean_models::ConstantMean;
use openbox_surrogate::{GaussianProcess, RandomForest};
use rand_xoshiro::Xoshiro256Plus;

fn griewank(x: &Array1<f64>) -> f64 {
    let dim = x.len();
    let d = Array1::linspace(1., dim as f64, dim).mapv(|v| v.sqrt());
    x.mapv(|v| v * v).sum() / 4000. - (x / &d).mapv(|v| v.cos()).fold(1., |acc, x| acc * x) + 1.0
}

fn criterion_surrogates(c: &mut Criterion) {
    let dims = [2, 5, 10];
    let nts = [50, 100, 200];

    let mut group = c.benchmark_group("surrogate");
    group.sample_size(10);
    for (dim, nt) in dims.into_iter().zip(nts) {
        let lim = array![[-600., 600.]];
        let xlimits = lim.broadcast((dim, 2)).unwrap();
        let xt = Lhs::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
            .sample(nt);
        let mut yt: Array1<f64> = Array1::zeros(xt.nrows());
        Zip::from(&mut yt)
            .and(xt.rows())
            .par_for_each(|y, x| *y = griewank(&x.to_owned()));

        group.bench_function(format!("gp {dim}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    GaussianProcess::<ConstantMean, Matern52Corr>::params(
                        ConstantMean::default(),
                        Matern52Corr::default(),
                    )
                    .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
                    .expect("GP fit error"),
                )
            });
        });

        group.bench_function(format!("prf {dim}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    RandomForest::params()
                        .seed(Some(42))
                        .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
                        .expect("RF fit error"),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_surrogates);
criterion_main!(benches);
