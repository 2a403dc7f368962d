// Index build, search and pipeline throughput benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use shopwise::{
    CorpusEntry, EventEmitter, HashingInference, PipelineConfig, PipelineOrchestrator, PipelineRequest,
    SimilarityIndex, Vector,
};
use std::sync::Arc;

const DIM: usize = 128;

fn generate_random_vector(rng: &mut impl Rng, dim: usize) -> Vector {
    let data: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect();
    Vector::new(data)
}

fn generate_corpus(size: usize, dim: usize) -> (Vec<Vector>, Vec<CorpusEntry>) {
    let mut rng = rand::rng();
    let vectors = (0..size).map(|_| generate_random_vector(&mut rng, dim)).collect();
    let entries = (0..size)
        .map(|i| CorpusEntry::new(i.to_string(), format!("Product {i}"), format!("description number {i}"), ""))
        .collect();
    (vectors, entries)
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for size in [1000, 10000].iter() {
        let (vectors, entries) = generate_corpus(*size, DIM);
        group.bench_with_input(BenchmarkId::new("shopwise", size), size, |b, _| {
            b.iter(|| {
                let index = SimilarityIndex::build(vectors.clone(), entries.clone()).unwrap();
                black_box(index);
            });
        });
    }

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    // Sizes on both sides of the parallel scan threshold
    for size in [2000, 20000].iter() {
        let (vectors, entries) = generate_corpus(*size, DIM);
        let index = SimilarityIndex::build(vectors, entries).unwrap();
        let query = generate_random_vector(&mut rand::rng(), DIM);

        group.bench_with_input(BenchmarkId::new("shopwise_exact", size), size, |b, _| {
            b.iter(|| {
                let results = index.search(black_box(query.as_slice()), 10).unwrap();
                black_box(results);
            });
        });
    }

    group.finish();
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    let embedder = HashingInference::new(DIM);
    let entries: Vec<CorpusEntry> = (0..2000)
        .map(|i| CorpusEntry::new(i.to_string(), format!("Kettle model {i}"), "Durable steel", ""))
        .collect();
    let vectors = entries.iter().map(|e| embedder.embed(&e.embedding_text())).collect();
    let index = Arc::new(SimilarityIndex::build(vectors, entries).unwrap());
    let orchestrator = PipelineOrchestrator::new(Some(index), Arc::new(embedder), PipelineConfig::default());

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

    group.bench_function("shopwise_text_run", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let (mut emitter, _stream) = EventEmitter::channel(16);
                let outcome = orchestrator
                    .run(PipelineRequest::text(black_box("steel kettle"), 40.0, 50.0), &mut emitter)
                    .await;
                black_box(outcome);
            });
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_build, benchmark_search, benchmark_pipeline);
criterion_main!(benches);
