use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use docs_search::index::{DocumentRecord, VectorStore, document_id};
use docs_search::ranking::{RankingConfig, RankingRequest, rank};
use std::hint::black_box;
use std::path::PathBuf;

const DIMENSION: usize = 768;

/// Deterministic pseudo-random vector so runs are comparable
fn vector(seed: usize) -> Vec<f32> {
    (0..DIMENSION)
        .map(|i| (((seed * 31 + i * 17) % 97) as f32 / 97.0) - 0.5)
        .collect()
}

fn populated_store(documents: usize) -> VectorStore {
    let mut store = VectorStore::new();
    for i in 0..documents {
        let filepath = PathBuf::from(format!("/library/document_{i}.txt"));
        let record = DocumentRecord {
            doc_id: document_id(&filepath),
            filename: format!("document_{i}.txt"),
            extension: ".txt".to_string(),
            size_mb: 0.01,
            text_excerpt: "Excerpt".to_string(),
            text_length: 1000,
            full_text: "Full text".to_string(),
            indexed_at: Utc::now(),
            filepath,
        };
        store
            .add(&vector(i), record)
            .expect("generated vectors share a dimension");
    }
    store
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let query = vector(7_919);
    let config = RankingConfig::default();

    let mut group = c.benchmark_group("search");
    for documents in [100, 1_000, 10_000] {
        let store = populated_store(documents);

        group.bench_with_input(
            BenchmarkId::new("vector_store", documents),
            &store,
            |b, store| b.iter(|| store.search(black_box(&query), 10, Some(0.1))),
        );

        group.bench_with_input(BenchmarkId::new("rank", documents), &store, |b, store| {
            b.iter(|| {
                rank(
                    store,
                    &RankingRequest {
                        query: black_box("document_42"),
                        embedding: &query,
                        filename_embedding: Some(&query),
                        top_k: 10,
                        threshold: Some(0.1),
                    },
                    &config,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
