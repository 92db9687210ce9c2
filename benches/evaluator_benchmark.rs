use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dogtracks::models::LatLng;
use dogtracks::services::evaluator::{evaluate, EvaluationState};
use dogtracks::services::RegionService;

fn benchmark_evaluate(c: &mut Criterion) {
    // Load the service once
    let service =
        RegionService::load_from_file("data/regions.geojson").expect("Failed to load regions");
    let regions = service.regions();

    // A short walk from outside the field, through it, and out again
    let walk: Vec<LatLng> = (0..200)
        .map(|i| LatLng::new(59.3315, 18.0680 + i as f64 * 0.00005))
        .collect();

    let mut group = c.benchmark_group("region_evaluation");

    group.bench_function("single_point_inside", |b| {
        let p = LatLng::new(59.334, 18.066);
        let state = EvaluationState::default();
        b.iter(|| evaluate(black_box(p), regions, &state))
    });

    group.bench_function("walk_200_samples", |b| {
        b.iter(|| {
            let mut state = EvaluationState::default();
            for p in &walk {
                if let Ok(eval) = evaluate(black_box(*p), regions, &state) {
                    state = eval.state;
                }
            }
            state
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_evaluate);
criterion_main!(benches);
