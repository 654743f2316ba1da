use criterion::{criterion_group, criterion_main, Criterion};
use ethash::compute;

fn cache_generation(c: &mut Criterion) {
    let seed = compute::seed_hash(0);
    c.bench_function("generate_cache_1024b", |b| {
        b.iter(|| {
            let mut buf = vec![0u32; 1024 / 4];
            compute::generate_cache(&mut buf, 0, &seed);
            buf
        })
    });
}

fn dataset_generation(c: &mut Criterion) {
    let seed = compute::seed_hash(0);
    let mut cache = vec![0u32; 1024 / 4];
    compute::generate_cache(&mut cache, 0, &seed);

    c.bench_function("generate_dataset_32kb", |b| {
        b.iter(|| {
            let mut buf = vec![0u32; 32 * 1024 / 4];
            compute::generate_dataset(&mut buf, 0, &cache);
            buf
        })
    });
}

fn hashimoto_full(c: &mut Criterion) {
    let seed = compute::seed_hash(0);
    let mut cache = vec![0u32; 1024 / 4];
    compute::generate_cache(&mut cache, 0, &seed);
    let mut dataset = vec![0u32; 32 * 1024 / 4];
    compute::generate_dataset(&mut dataset, 0, &cache);
    let header_hash = [9u8; 32];

    c.bench_function("hashimoto_full_32kb_dataset", |b| {
        let mut nonce = 0u64;
        b.iter(|| {
            nonce = nonce.wrapping_add(1);
            compute::hashimoto_full(&dataset, &header_hash, nonce)
        })
    });
}

criterion_group!(benches, cache_generation, dataset_generation, hashimoto_full);
criterion_main!(benches);
