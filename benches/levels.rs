//! Run these benches with `cargo bench --bench levels -- --verbose`
use criterion::{criterion_group, criterion_main, Criterion};
use moisture_layers::Variant;

mod utils;

fn build_tester() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(std::time::Duration::from_secs(10))
        .noise_threshold(0.03)
        .significance_level(0.01)
}

criterion_main!(level_benches);

criterion_group!(
    name = level_benches;
    config = build_tester();
    targets = build_columns_bench, target_levels_bench, interpolate_to_targets_bench,
        assembled_levels_bench
);

fn build_columns_bench(c: &mut Criterion) {
    let config = utils::config(Variant::Era5);
    let day = utils::windy_day(&config);

    c.bench_function("build_columns", |b| {
        b.iter(|| {
            let _x = moisture_layers::build_columns(&day.profiles, &day.surface, &config)
                .expect("oops");
        });
    });
}

fn target_levels_bench(c: &mut Criterion) {
    let config = utils::config(Variant::EcEarth);
    let columns = utils::windy_columns(&config);

    c.bench_function("target_levels", |b| {
        b.iter(|| {
            let _x = moisture_layers::target_levels(
                columns.surface_pressure.view(),
                columns.boundary_pressure.view(),
                &config.levels,
            )
            .expect("oops");
        });
    });
}

fn interpolate_to_targets_bench(c: &mut Criterion) {
    let config = utils::config(Variant::EcEarth);
    let columns = utils::windy_columns(&config);
    let targets = moisture_layers::target_levels(
        columns.surface_pressure.view(),
        columns.boundary_pressure.view(),
        &config.levels,
    )
    .expect("oops");

    c.bench_function("interpolate_to_targets", |b| {
        b.iter(|| {
            let _x = moisture_layers::interpolate_to_targets(&columns, &targets).expect("oops");
        });
    });
}

fn assembled_levels_bench(c: &mut Criterion) {
    let config = utils::config(Variant::Era5);
    let columns = utils::windy_columns(&config);

    c.bench_function("assembled_levels", |b| {
        b.iter(|| {
            let _x = moisture_layers::assembled_levels(&columns).expect("oops");
        });
    });
}
