//! Tagsoup parser benchmarks
//!
//! Run with: cargo bench -p tagsoup-bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tagsoup_bench::{generate_document, generate_messy_document, ByteCounter};
use tagsoup_grammar::BasicGrammar;
use tagsoup_parser::tokenizer::tokenize;
use tagsoup_parser::{parse, stream, Parser, Tokenizer};

fn tokenizer_benchmarks(c: &mut Criterion) {
    let grammar = BasicGrammar::html();
    let mut group = c.benchmark_group("tokenize");

    for (label, doc) in [
        ("medium", generate_document(100)),
        ("large", generate_document(1000)),
        ("messy", generate_messy_document(1000)),
    ] {
        group.throughput(Throughput::Bytes(doc.len() as u64));
        group.bench_with_input(BenchmarkId::new("html", label), &doc, |b, doc| {
            b.iter(|| tokenize(black_box(doc), &grammar))
        });
    }

    group.finish();
}

fn assembler_benchmarks(c: &mut Criterion) {
    let grammar = BasicGrammar::html();
    let large = generate_document(1000);
    let messy = generate_messy_document(1000);
    let mut group = c.benchmark_group("assemble");

    for (label, doc) in [("large", &large), ("messy", &messy)] {
        group.throughput(Throughput::Bytes(doc.len() as u64));
        group.bench_with_input(BenchmarkId::new("build", label), doc, |b, doc| {
            b.iter(|| parse(black_box(doc), &grammar))
        });
        group.bench_with_input(BenchmarkId::new("stream", label), doc, |b, doc| {
            b.iter(|| stream(black_box(doc), &grammar, ByteCounter::default()))
        });
        group.bench_with_input(BenchmarkId::new("pull", label), doc, |b, doc| {
            b.iter(|| {
                let mut parser = Parser::pull(Tokenizer::from_text(black_box(doc), &grammar));
                let mut count = 0usize;
                while let Ok(Some(_)) = parser.retrieve_token() {
                    count += 1;
                }
                count
            })
        });
    }

    group.finish();
}

fn lookahead_benchmarks(c: &mut Criterion) {
    let doc = generate_document(500);
    let mut group = c.benchmark_group("lookahead_chars");
    group.throughput(Throughput::Bytes(doc.len() as u64));

    for chars in [16usize, 64, 256] {
        let grammar = BasicGrammar::html().with_lookahead_chars(chars);
        group.bench_with_input(BenchmarkId::from_parameter(chars), &doc, |b, doc| {
            b.iter(|| parse(black_box(doc), &grammar))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    tokenizer_benchmarks,
    assembler_benchmarks,
    lookahead_benchmarks
);
criterion_main!(benches);
