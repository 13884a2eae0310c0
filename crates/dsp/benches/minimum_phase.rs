use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use num::complex::Complex64;
use num::Zero;

use makemhr_dsp::{minimum_phase, FftPair};

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("minimum_phase");

    for size in [1usize << 12, 1 << 16, 1 << 17] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            criterion::BenchmarkId::from_parameter(format!("fft_size={size}")),
            &size,
            |b, size| {
                let mut fft = FftPair::new(*size);
                let source = (0..*size)
                    .map(|i| 1.0 + 0.5 * (i as f64 * 0.01).sin())
                    .collect::<Vec<_>>();
                let mut mags = source.clone();
                let mut out = vec![Complex64::zero(); *size];
                b.iter(|| {
                    mags.copy_from_slice(&source);
                    minimum_phase(&mut fft, &mut mags, &mut out);
                    fft.inverse(&mut out);
                    black_box(out[0]);
                });
            },
        );
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
