//! Benchmarks for the two-stage query path.
//!
//! Measures:
//! - Flat vs partitioned Hamming candidate search
//! - Cosine rerank over candidate pools of increasing size
//! - End-to-end hybrid query

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bitrank_core::cancel::ScanGuard;
use bitrank_core::index::{FlatIndex, PartitionedIndex};
use bitrank_core::{
    BinaryQuantizer, BitrankConfig, ChunkFilter, ChunkMetadata, DocumentChunk, FloatStore,
    HammingIndex, HybridRetriever, PartitionParams,
};

const DIMENSION: usize = 384;
const CORPUS: u64 = 20_000;

fn random_vector(rng: &mut StdRng) -> Vec<f32> {
    (0..DIMENSION).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn corpus() -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..CORPUS).map(|_| random_vector(&mut rng)).collect()
}

// =============================================================================
// Binary stage
// =============================================================================

fn bench_binary_search(c: &mut Criterion) {
    let vectors = corpus();
    let quantizer = BinaryQuantizer::new(DIMENSION).unwrap();
    let mut flat = FlatIndex::new(DIMENSION).unwrap();
    let mut partitioned = PartitionedIndex::new(
        DIMENSION,
        PartitionParams {
            partitions: 64,
            probes: 8,
            min_recall: 0.0,
            ..PartitionParams::default()
        },
    )
    .unwrap();
    for (id, v) in (0_u64..).zip(&vectors) {
        let code = quantizer.quantize(v).unwrap();
        flat.insert(id, code.clone(), &ChunkMetadata::new()).unwrap();
        partitioned.insert(id, code, &ChunkMetadata::new()).unwrap();
    }
    partitioned.reindex().unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let query = quantizer.quantize(&random_vector(&mut rng)).unwrap();
    let guard = ScanGuard::unbounded();
    let filter = ChunkFilter::any();

    let mut group = c.benchmark_group("binary_search");
    group.throughput(Throughput::Elements(CORPUS));
    for pool in [50_usize, 200] {
        group.bench_with_input(BenchmarkId::new("flat", pool), &pool, |b, &pool| {
            b.iter(|| black_box(flat.search(&query, pool, &filter, &guard).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("partitioned", pool), &pool, |b, &pool| {
            b.iter(|| black_box(partitioned.search(&query, pool, &filter, &guard).unwrap()));
        });
    }
    group.finish();
}

// =============================================================================
// Rerank stage
// =============================================================================

fn bench_rerank(c: &mut Criterion) {
    let vectors = corpus();
    let mut store = FloatStore::new(DIMENSION);
    for (id, v) in (0_u64..).zip(&vectors) {
        store.put(id, v.clone()).unwrap();
    }
    let mut rng = StdRng::seed_from_u64(11);
    let query = random_vector(&mut rng);

    let mut group = c.benchmark_group("rerank");
    for pool in [50_u64, 200, 1000] {
        let candidates: Vec<u64> = (0..pool).collect();
        group.throughput(Throughput::Elements(pool));
        group.bench_with_input(BenchmarkId::from_parameter(pool), &candidates, |b, cands| {
            b.iter(|| black_box(store.rerank(&query, cands, 10).unwrap()));
        });
    }
    group.finish();
}

// =============================================================================
// End to end
// =============================================================================

fn bench_hybrid_query(c: &mut Criterion) {
    let mut config = BitrankConfig::default();
    config.index.dimension = DIMENSION;
    let retriever = HybridRetriever::from_config(&config).unwrap();
    for (id, v) in (0_u64..).zip(corpus()) {
        retriever
            .ingest(DocumentChunk::new(id, "", ChunkMetadata::new(), v))
            .unwrap();
    }
    let mut rng = StdRng::seed_from_u64(13);
    let query = random_vector(&mut rng);

    c.bench_function("hybrid_query_k10", |b| {
        b.iter(|| {
            black_box(
                retriever
                    .query(&query, &ChunkFilter::any(), 80, 10)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_binary_search, bench_rerank, bench_hybrid_query);
criterion_main!(benches);
