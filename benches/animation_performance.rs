use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use samu_dispatch::dispatch::{AnimatorTick, RouteAnimator, sampling_step};
use samu_dispatch::{GeoPoint, bearing, route_length};
use std::time::Duration;

fn create_route(points: usize) -> Vec<GeoPoint> {
    (0..points)
        .map(|i| {
            let t = i as f64 / points as f64;
            // gentle S-curve between the hospital and a patient a few km away
            GeoPoint::new(
                -24.005618 - 0.03 * t,
                -46.4241265 - 0.02 * t + 0.002 * (t * 12.0).sin(),
            )
        })
        .collect()
}

fn bench_bearing(c: &mut Criterion) {
    let from = GeoPoint::new(-24.005618, -46.4241265);
    let to = GeoPoint::new(-24.01, -46.43);

    c.bench_function("bearing", |b| {
        b.iter(|| black_box(bearing(black_box(from), black_box(to))))
    });
}

fn bench_route_animation(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_animation");
    group.measurement_time(Duration::from_secs(5));

    for size in [2, 100, 1_000, 10_000] {
        let route = create_route(size);
        group.bench_with_input(BenchmarkId::new("full_run", size), &route, |b, route| {
            b.iter(|| {
                let mut animator = RouteAnimator::new(route.clone(), 100).unwrap();
                let mut frames = 0;
                while let AnimatorTick::Moved(frame) = animator.tick() {
                    black_box(frame);
                    frames += 1;
                }
                assert_eq!(frames, size.div_ceil(sampling_step(size, 100)));
            })
        });
    }

    let route = create_route(10_000);
    group.bench_function("route_length_10000", |b| {
        b.iter(|| black_box(route_length(black_box(&route))))
    });

    group.finish();
}

criterion_group!(benches, bench_bearing, bench_route_animation);
criterion_main!(benches);
