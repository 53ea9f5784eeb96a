use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use verbum_index::{Chunker, ChunkerConfig, DistanceMetric, DocId, Document, FileKind, Page};

fn generate_page(size: usize) -> String {
    let paragraph = "The quick brown fox jumps over the lazy dog. \
                     This sentence contains various English words and punctuation marks.\n\n";
    let text = paragraph.repeat(size / paragraph.len() + 1);
    text[..text.floor_char_boundary(size)].to_string()
}

fn document(pages: usize, page_size: usize) -> Document {
    Document {
        id: DocId::new("bench.txt"),
        name: "bench.txt".into(),
        kind: FileKind::Text,
        pages: (1..=pages)
            .map(|n| Page {
                number: u32::try_from(n).unwrap_or(u32::MAX),
                text: generate_page(page_size),
            })
            .collect(),
    }
}

fn chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk");
    let chunker = Chunker::new(ChunkerConfig::default());

    for pages in [10, 100, 500] {
        let doc = document(pages, 3_000);
        group.throughput(Throughput::Bytes((pages * 3_000) as u64));
        group.bench_with_input(BenchmarkId::new("pages", pages), &doc, |b, doc| {
            b.iter(|| chunker.chunk(black_box(doc)));
        });
    }

    group.finish();
}

fn chunking_single_long_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_long_page");
    let chunker = Chunker::new(ChunkerConfig::default());

    for size in [10_000, 100_000] {
        let doc = document(1, size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("bytes", size), &doc, |b, doc| {
            b.iter(|| chunker.chunk(black_box(doc)));
        });
    }

    group.finish();
}

fn distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance");
    let a: Vec<f32> = (0..1536).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..1536).map(|i| (i as f32).cos()).collect();

    for metric in [DistanceMetric::Euclidean, DistanceMetric::Cosine] {
        group.bench_function(format!("{metric:?}_1536"), |bench| {
            bench.iter(|| metric.distance(black_box(&a), black_box(&b)));
        });
    }

    group.finish();
}

criterion_group!(benches, chunking, chunking_single_long_page, distance);
criterion_main!(benches);
