use criterion::{criterion_group, criterion_main, Criterion};
use openbox_space::{ConfigSpace, Hyperparameter, InitStrategy, Lhs, SamplingMethod};
use ndarray::aview1;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn criterion_lhs(c: &mut Criterion) {
    let dims = [10, 100];
    let sizes = [10, 100];

    let mut group = c.benchmark_group("doe");
    group.sample_size(10);
    let arr1 = aview1(&[0., 1.]);
    let rng = Xoshiro256Plus::seed_from_u64(42);
    for dim in dims {
        for size in sizes {
            group.bench_function(format!("lhs-{dim}-dim-{size}-size"), |b| {
                let xlimits = arr1.broadcast((dim, 2)).unwrap();
                b.iter(|| {
                    std::hint::black_box(Lhs::new(&xlimits).with_rng(rng.clone()).sample(size))
                });
            });
        }
    }
    group.finish();
}

fn criterion_initial_design(c: &mut Criterion) {
    let mut space = ConfigSpace::new();
    for i in 0..8 {
        space = space
            .add(Hyperparameter::float(format!("x{i}"), 0., 1.))
            .unwrap();
    }
    let space = space
        .add(Hyperparameter::categorical("c", ["a", "b", "c", "d"]))
        .unwrap();

    let mut group = c.benchmark_group("initial_design");
    group.sample_size(10);
    for strategy in [InitStrategy::RandomExploreFirst, InitStrategy::LatinHypercube] {
        group.bench_function(format!("{strategy:?}-20"), |b| {
            b.iter(|| {
                let mut rng = Xoshiro256Plus::seed_from_u64(42);
                std::hint::black_box(space.initial_design(strategy, 20, &mut rng).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_lhs, criterion_initial_design);
criterion_main!(benches);
