// Run with:  cargo bench --bench set_pixel

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::Point;
use hub75_refresh::framebuffer::PlaneFrameBuffer;
use hub75_refresh::{compute_rows, Color};
use std::hint::black_box;
use std::time::Duration;

const ROWS: usize = 32;
const COLS: usize = 64;
const NROWS: usize = compute_rows(ROWS);

// Number of iterations to target ~1-5ms per measurement
const ITERATIONS: usize = 100;

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(100)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3))
        .confidence_level(0.95)
        .significance_level(0.05)
}

fn fill<const PLANES: usize>(fb: &mut PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>, color: Color) {
    for _ in 0..ITERATIONS {
        for y in 0..ROWS {
            for x in 0..COLS {
                black_box(&mut *fb).set_pixel(black_box(Point::new(x as i32, y as i32)), black_box(color));
            }
        }
    }
}

fn set_pixel(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_pixel");
    group.throughput(Throughput::Elements((ROWS * COLS * ITERATIONS) as u64));

    group.bench_function(BenchmarkId::new("planes", 3), |b| {
        let mut fb = PlaneFrameBuffer::<ROWS, COLS, NROWS, 3>::new();
        b.iter(|| fill(&mut fb, Color::RED));
    });
    group.bench_function(BenchmarkId::new("planes", 8), |b| {
        let mut fb = PlaneFrameBuffer::<ROWS, COLS, NROWS, 8>::new();
        b.iter(|| fill(&mut fb, Color::new(128, 64, 192)));
    });

    group.finish();
}

criterion_group!(name = benches; config = configure_criterion(); targets = set_pixel);
criterion_main!(benches);
