//! Benchmarks for vidscan-color
//!
//! Measures 4:2:0 -> RGBA conversion throughput at common frame sizes and the
//! cost of PQ luminance sampling.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vidscan_color::{
    luminance_stats, required_len, st2084_eotf, yuv420p10le_to_rgba, yuv420p_to_rgba, BitDepth,
    ColorRange, ColorStandard,
};

const SIZES: [(u32, u32); 3] = [(640, 360), (1280, 720), (1920, 1080)];

fn synthetic_frame(width: u32, height: u32, depth: BitDepth) -> Vec<u8> {
    (0..required_len(width, height, depth))
        .map(|i| (i * 7 % 251) as u8)
        .collect()
}

fn bench_yuv420p(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuv420p_to_rgba");

    for (width, height) in SIZES {
        let frame = synthetic_frame(width, height, BitDepth::Eight);
        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &frame,
            |b, frame| {
                b.iter(|| {
                    let image = yuv420p_to_rgba(
                        black_box(frame),
                        width,
                        height,
                        ColorRange::Limited,
                        ColorStandard::Bt709,
                    );
                    black_box(image)
                });
            },
        );
    }

    group.finish();
}

fn bench_yuv420p10le(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuv420p10le_to_rgba");

    for (width, height) in SIZES {
        let frame = synthetic_frame(width, height, BitDepth::Ten);
        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &frame,
            |b, frame| {
                b.iter(|| {
                    let image = yuv420p10le_to_rgba(
                        black_box(frame),
                        width,
                        height,
                        ColorRange::Limited,
                        ColorStandard::Bt709,
                    );
                    black_box(image)
                });
            },
        );
    }

    group.finish();
}

fn bench_pq(c: &mut Criterion) {
    c.bench_function("st2084_eotf_256", |b| {
        b.iter(|| {
            let mut total = 0.0;
            for code in 0..256u32 {
                total += st2084_eotf(black_box(code as f64 / 255.0));
            }
            black_box(total)
        });
    });

    let frame = synthetic_frame(1920, 1080, BitDepth::Eight);
    let image =
        yuv420p_to_rgba(&frame, 1920, 1080, ColorRange::Full, ColorStandard::Bt709).unwrap();
    c.bench_function("luminance_stats_1080p_step8", |b| {
        b.iter(|| black_box(luminance_stats(black_box(&image), 8)));
    });
}

criterion_group!(benches, bench_yuv420p, bench_yuv420p10le, bench_pq);
criterion_main!(benches);
