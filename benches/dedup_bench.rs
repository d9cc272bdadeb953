use criterion::{black_box, criterion_group, criterion_main, Criterion};
use debedup::codec;
use debedup::{ChunkAddress, CountMinSketch, Fingerprint, TopKHeap};

fn bench_codec(c: &mut Criterion) {
    let compressible = vec![0u8; 64 * 1024];
    let random: Vec<u8> = (0u32..64 * 1024).map(|i| (i % 251) as u8).collect();

    c.bench_function("codec_compress_zeros_64k", |b| b.iter(|| codec::compress(black_box(&compressible))));
    c.bench_function("codec_compress_random_64k", |b| b.iter(|| codec::compress(black_box(&random))));
    c.bench_function("codec_hash_64k", |b| b.iter(|| codec::hash(black_box(&random))));
}

fn bench_sketch_and_heap(c: &mut Criterion) {
    let fps: Vec<Fingerprint> = (0u8..=255).map(|b| Fingerprint([b; 32])).collect();

    c.bench_function("sketch_update_estimate", |b| {
        b.iter(|| {
            let mut sketch = CountMinSketch::default();
            for fp in &fps {
                sketch.update(fp, 1);
            }
            black_box(sketch.estimate(&fps[0]))
        })
    });

    c.bench_function("heap_add_256_entries", |b| {
        b.iter(|| {
            let mut heap = TopKHeap::new(128);
            for (i, fp) in fps.iter().enumerate() {
                let address = ChunkAddress { container_id: 0, offset: 0, length: 0 };
                heap.add(*fp, (i % 17) as u32 + 1, address);
            }
            black_box(heap.len())
        })
    });
}

criterion_group!(benches, bench_codec, bench_sketch_and_heap);
criterion_main!(benches);
