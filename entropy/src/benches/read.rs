use commonware_entropy::{CachedReader, Config, Entropy};
use criterion::{criterion_group, Criterion};
use std::{hint::black_box, num::NonZeroUsize, thread, time::Instant};

fn benchmark_read(c: &mut Criterion) {
    for size in [8, 16, 32] {
        for threads in [1, 4] {
            let cfg = Config::for_payloads(
                NonZeroUsize::new(1024).unwrap(),
                NonZeroUsize::new(size).unwrap(),
            )
            .unwrap();
            let reader = CachedReader::with_config(Entropy::os(), cfg).unwrap();
            c.bench_function(
                &format!("{}/size={} threads={}", module_path!(), size, threads),
                |b| {
                    b.iter_custom(|iters| {
                        let start = Instant::now();
                        thread::scope(|s| {
                            for _ in 0..threads {
                                s.spawn(|| {
                                    let mut buf = vec![0u8; size];
                                    for _ in 0..iters {
                                        reader.read(&mut buf).unwrap();
                                        black_box(&buf);
                                    }
                                });
                            }
                        });
                        start.elapsed()
                    });
                },
            );
        }
    }
}

criterion_group!(benches, benchmark_read);
