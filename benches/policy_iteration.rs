use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use grid_agent::density::DiscreteTransitionDensity;
use grid_agent::geometry::{Obstacle, Vec2D};
use grid_agent::policy::Policy;
use grid_agent::reward::DenseReward;
use grid_agent::sequential::{self, IterationConfig};
use grid_agent::value::ValueFunctions;
use grid_agent::vss::ValidStateSpace;

const GRID_SIZES: [(i32, i32); 3] = [(4, 4), (6, 6), (8, 8)];

fn build(n: i32, m: i32) -> (ValidStateSpace, ValueFunctions, Policy, DiscreteTransitionDensity) {
    let obstacles = vec![Obstacle::new(Vec2D::new(n / 2, 0), Vec2D::new(1, m - 1))];
    let vss = ValidStateSpace::build(Vec2D::new(n, m), &obstacles);
    let values = ValueFunctions::new(vss.space_size());
    let policy = Policy::new(vss.space_size());
    let density = DiscreteTransitionDensity::new(0.9, 0.05, 0.0, 0.05).unwrap();
    (vss, values, policy, density)
}

fn one_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_iteration_sweep");
    let reward = DenseReward;

    for (n, m) in GRID_SIZES {
        group.bench_with_input(BenchmarkId::new("run_sweep", format!("{n}x{m}")), &(n, m), |b, &(n, m)| {
            let (vss, mut values, policy, density) = build(n, m);
            b.iter(|| {
                sequential::run_sweep(
                    black_box(&vss),
                    &mut values,
                    &policy,
                    &density,
                    &reward,
                    black_box(0.9),
                )
            });
        });
    }

    group.finish();
}

fn to_convergence(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_iteration_to_convergence");
    let reward = DenseReward;

    for (n, m) in GRID_SIZES {
        group.bench_with_input(BenchmarkId::new("run", format!("{n}x{m}")), &(n, m), |b, &(n, m)| {
            b.iter(|| {
                let (vss, mut values, policy, density) = build(n, m);
                let config = IterationConfig {
                    discount: 0.9,
                    convergence_tolerance: 1e-6,
                    max_iterations: 200,
                    action_tolerance: 0,
                    action_percentage_tolerance: 0.0,
                };
                sequential::run(
                    black_box(&vss),
                    &mut values,
                    &policy,
                    &density,
                    &reward,
                    &config,
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, one_sweep, to_convergence);
criterion_main!(benches);
