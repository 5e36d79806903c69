use criterion::{criterion_group, criterion_main, Criterion};
use openbox::prelude::*;

fn branin(c: &Configuration) -> anyhow::Result<Evaluation> {
    let x1 = c.get_f64("x1").unwrap_or_default();
    let x2 = c.get_f64("x2").unwrap_or_default();
    let pi = std::f64::consts::PI;
    let y = (x2 - 5.1 / (4. * pi * pi) * x1 * x1 + 5. / pi * x1 - 6.).powi(2)
        + 10. * (1. - 1. / (8. * pi)) * x1.cos()
        + 10.;
    Ok(Evaluation::from(y))
}

fn criterion_branin(c: &mut Criterion) {
    let space = ConfigSpace::new()
        .add(Hyperparameter::float("x1", -5., 10.))
        .expect("x1")
        .add(Hyperparameter::float("x2", 0., 15.))
        .expect("x2");

    let mut group = c.benchmark_group("optimizer");
    group.sample_size(10);
    for surrogate_type in [SurrogateType::Gp, SurrogateType::Prf] {
        group.bench_function(format!("branin {surrogate_type:?}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    OptimizerBuilder::optimize(branin)
                        .configure(|config| {
                            config
                                .max_runs(20)
                                .surrogate_type(surrogate_type)
                                .random_state(42)
                        })
                        .within(space.clone())
                        .expect("optimizer")
                        .run()
                        .expect("branin minimization"),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_branin);
criterion_main!(benches);
