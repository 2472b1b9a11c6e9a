//! Distance Benchmarks
//!
//! Run with: cargo bench --package edgeset-index

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use edgeset_core::GeometryConfig;
use edgeset_index::{dot_product_u8, dot_product_u8_scalar, DistanceMatrix};
use edgeset_storage::{ExampleStore, MemoryFlash};

fn random_bytes(rng: &mut ChaCha8Rng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_dot_product(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mut group = c.benchmark_group("dot_product_u8");

    for len in [64, 256, 784] {
        let a = random_bytes(&mut rng, len);
        let b = random_bytes(&mut rng, len);

        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("dispatch_{}", len), |bencher| {
            bencher.iter(|| black_box(dot_product_u8(black_box(&a), black_box(&b))))
        });
        group.bench_function(format!("scalar_{}", len), |bencher| {
            bencher.iter(|| black_box(dot_product_u8_scalar(black_box(&a), black_box(&b))))
        });
    }

    group.finish();
}

fn bench_matrix_compute(c: &mut Criterion) {
    let geometry = GeometryConfig {
        volatile_capacity: 100,
        persistent_capacity: 200,
        ..GeometryConfig::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let flash = MemoryFlash::for_geometry(&geometry);
    let mut store = ExampleStore::new(geometry.clone(), flash).unwrap();
    for idx in 0..store.len() {
        let mut record = random_bytes(&mut rng, geometry.record_size());
        record[geometry.feature_len] = (idx % 10) as u8;
        store.write_record(idx, &record).unwrap();
    }

    let mut matrix = DistanceMatrix::new(store.len(), 12).unwrap();
    let mut group = c.benchmark_group("distance_matrix");
    group.sample_size(10);
    group.throughput(Throughput::Elements((store.len() * (store.len() - 1) / 2) as u64));
    group.bench_function("compute_300x784", |bencher| {
        bencher.iter(|| black_box(matrix.compute(&mut store).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_dot_product, bench_matrix_compute);
criterion_main!(benches);
