//! # Tagsoup Bench
//!
//! Benchmark harness for the tagsoup tokenizer and tree assembler.
//!
//! Besides timing, streaming runs record the peak number of live tree
//! nodes so memory regressions in the streaming modes show up alongside
//! speed regressions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tagsoup_bench::Benchmark;
//!
//! let suite = Benchmark::new().run_all()?;
//! suite.print_summary();
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tagsoup_grammar::{BasicGrammar, Grammar};
use tagsoup_parser::tokenizer::tokenize;
use tagsoup_parser::{ParseError, Parser, Tokenizer};
use thiserror::Error;
use tracing::debug;

/// Benchmark errors.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timing of one benchmark over its input document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    /// Size of the input in bytes.
    pub input_bytes: usize,
    pub iterations: u64,
    pub mean_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub std_dev_ns: u64,
    /// Highest live node count observed, for streaming runs.
    pub peak_nodes: Option<usize>,
}

impl BenchmarkResult {
    /// Summarize sample times.
    pub fn from_samples(name: impl Into<String>, input_bytes: usize, samples: &[Duration]) -> Self {
        let times: Vec<u64> = samples
            .iter()
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .collect();
        let iterations = times.len() as u64;
        let mean_ns = if iterations == 0 {
            0
        } else {
            times.iter().sum::<u64>() / iterations
        };
        let variance = if iterations == 0 {
            0.0
        } else {
            times
                .iter()
                .map(|&t| (t as f64 - mean_ns as f64).powi(2))
                .sum::<f64>()
                / iterations as f64
        };

        Self {
            name: name.into(),
            input_bytes,
            iterations,
            mean_ns,
            min_ns: times.iter().copied().min().unwrap_or(0),
            max_ns: times.iter().copied().max().unwrap_or(0),
            std_dev_ns: variance.sqrt() as u64,
            peak_nodes: None,
        }
    }

    /// Input bytes processed per second, in MiB.
    pub fn throughput_mib(&self) -> f64 {
        if self.mean_ns == 0 {
            return 0.0;
        }
        let per_sec = self.input_bytes as f64 * 1_000_000_000.0 / self.mean_ns as f64;
        per_sec / (1024.0 * 1024.0)
    }

    pub fn print_line(&self) {
        let peak = self
            .peak_nodes
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:36} {:>12} {:>12} {:>10.2} MiB/s {:>8}",
            self.name,
            format_duration(self.mean_ns),
            format!("±{}", format_duration(self.std_dev_ns)),
            self.throughput_mib(),
            peak,
        );
    }
}

/// Format nanoseconds as a human-readable duration.
fn format_duration(ns: u64) -> String {
    match ns {
        n if n >= 1_000_000_000 => format!("{:.2} s", n as f64 / 1e9),
        n if n >= 1_000_000 => format!("{:.2} ms", n as f64 / 1e6),
        n if n >= 1_000 => format!("{:.2} µs", n as f64 / 1e3),
        n => format!("{} ns", n),
    }
}

/// Results of a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    pub name: String,
    pub results: Vec<BenchmarkResult>,
    pub total_time: Duration,
}

impl BenchmarkSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Vec::new(),
            total_time: Duration::ZERO,
        }
    }

    pub fn add(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(86));
        println!("Benchmark Suite: {}", self.name);
        println!("{}", "=".repeat(86));
        println!(
            "{:36} {:>12} {:>12} {:>16} {:>8}",
            "Name", "Mean", "StdDev", "Throughput", "Peak"
        );
        println!("{}", "-".repeat(86));
        for result in &self.results {
            result.print_line();
        }
        println!("{}", "-".repeat(86));
        println!("Total time: {:?}", self.total_time);
    }

    /// Save results as pretty-printed JSON.
    pub fn save_json(&self, path: &str) -> Result<(), BenchError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Benchmark runner.
pub struct Benchmark {
    pub warmup: u64,
    pub iterations: u64,
    grammar: BasicGrammar,
}

impl Benchmark {
    pub fn new() -> Self {
        Self {
            warmup: 5,
            iterations: 50,
            grammar: BasicGrammar::html(),
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_warmup(mut self, warmup: u64) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_grammar(mut self, grammar: BasicGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Time `f` over `input`, failing on the first parse error.
    pub fn run<F>(&self, name: &str, input: &str, mut f: F) -> Result<BenchmarkResult, BenchError>
    where
        F: FnMut(&str, &dyn Grammar) -> Result<(), ParseError>,
    {
        debug!(
            name,
            bytes = input.len(),
            iterations = self.iterations,
            "Running benchmark"
        );
        for _ in 0..self.warmup {
            f(input, &self.grammar)?;
        }
        let mut samples = Vec::with_capacity(self.iterations as usize);
        for _ in 0..self.iterations {
            let start = Instant::now();
            f(input, &self.grammar)?;
            samples.push(start.elapsed());
        }
        Ok(BenchmarkResult::from_samples(name, input.len(), &samples))
    }

    pub fn bench_tokenize(&self, name: &str, input: &str) -> Result<BenchmarkResult, BenchError> {
        self.run(name, input, |doc, grammar| tokenize(doc, grammar).map(drop))
    }

    pub fn bench_build(&self, name: &str, input: &str) -> Result<BenchmarkResult, BenchError> {
        self.run(name, input, |doc, grammar| {
            tagsoup_parser::parse(doc, grammar).map(drop)
        })
    }

    /// Stream into a byte counter, recording the peak live node count.
    pub fn bench_stream(&self, name: &str, input: &str) -> Result<BenchmarkResult, BenchError> {
        let mut result = self.run(name, input, |doc, grammar| {
            tagsoup_parser::stream(doc, grammar, ByteCounter::default()).map(drop)
        })?;
        result.peak_nodes = Some(peak_stream_nodes(input, &self.grammar)?);
        Ok(result)
    }

    pub fn bench_pull(&self, name: &str, input: &str) -> Result<BenchmarkResult, BenchError> {
        self.run(name, input, |doc, grammar| {
            let mut parser = Parser::pull(Tokenizer::from_text(doc, grammar));
            while parser.retrieve_token()?.is_some() {}
            Ok(())
        })
    }

    /// Run the standard suite over generated documents.
    pub fn run_all(&self) -> Result<BenchmarkSuite, BenchError> {
        let start = Instant::now();
        let mut suite = BenchmarkSuite::new("Tagsoup");
        let medium = generate_document(100);
        let large = generate_document(1000);
        let messy = generate_messy_document(1000);

        suite.add(self.bench_tokenize("tokenize/medium", &medium)?);
        suite.add(self.bench_tokenize("tokenize/large", &large)?);
        suite.add(self.bench_build("build/medium", &medium)?);
        suite.add(self.bench_build("build/large", &large)?);
        suite.add(self.bench_build("build/messy", &messy)?);
        suite.add(self.bench_stream("stream/large", &large)?);
        suite.add(self.bench_stream("stream/messy", &messy)?);
        suite.add(self.bench_pull("pull/large", &large)?);

        suite.total_time = start.elapsed();
        Ok(suite)
    }
}

impl Default for Benchmark {
    fn default() -> Self {
        Self::new()
    }
}

/// Token sink that only counts.
#[derive(Debug, Default)]
pub struct ByteCounter {
    pub tokens: usize,
    pub bytes: usize,
}

impl tagsoup_parser::TokenSink for ByteCounter {
    fn accept(&mut self, token: &str, _depth: usize) -> tagsoup_parser::ParseResult<()> {
        self.tokens += 1;
        self.bytes += token.len();
        Ok(())
    }
}

/// Peak number of live nodes while streaming `input`.
pub fn peak_stream_nodes(input: &str, grammar: &dyn Grammar) -> Result<usize, ParseError> {
    let mut parser = Parser::stream(Tokenizer::from_text(input, grammar), ByteCounter::default());
    let mut peak = parser.tree().live_count();
    while parser.has_more_tokens() {
        parser.consume_token()?;
        peak = peak.max(parser.tree().live_count());
    }
    Ok(peak)
}

/// Well-formed document with `n` articles.
pub fn generate_document(n: usize) -> String {
    let mut doc = String::from(
        "<!DOCTYPE html><html><head><title>Bench</title><style>p { margin: 0 }</style></head><body>",
    );
    for i in 0..n {
        doc.push_str(&format!(
            "<div class=\"article\" id=\"a{i}\"><h2>Article {i}</h2>\
             <p>Paragraph with <a href=\"/page/{i}\">a link</a> &amp; <b>bold</b> text.<br></p>\
             <!-- article {i} --></div>"
        ));
    }
    doc.push_str("</body></html>");
    doc
}

/// Document with `n` sections of unclosed, misnested and unquoted markup.
pub fn generate_messy_document(n: usize) -> String {
    let mut doc = String::from("<html><body>");
    for i in 0..n {
        doc.push_str(&format!(
            "<P CLASS=item{i}>Item {i} & more<ul><li>one<li>two</ul>\
             <b><i>nested</b></i><a href=x{i}>link<a href=y{i}>other</a>\
             <td>stray</span>"
        ));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benchmark_result() {
        let samples = vec![
            Duration::from_micros(100),
            Duration::from_micros(120),
            Duration::from_micros(80),
        ];
        let result = BenchmarkResult::from_samples("test", 1024 * 1024, &samples);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.mean_ns, 100_000);
        assert_eq!(result.min_ns, 80_000);
        assert_eq!(result.max_ns, 120_000);
        assert!((result.throughput_mib() - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_samples() {
        let result = BenchmarkResult::from_samples("empty", 10, &[]);
        assert_eq!(result.mean_ns, 0);
        assert_eq!(result.throughput_mib(), 0.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(500), "500 ns");
        assert_eq!(format_duration(1_500), "1.50 µs");
        assert_eq!(format_duration(1_500_000), "1.50 ms");
        assert_eq!(format_duration(1_500_000_000), "1.50 s");
    }

    #[test]
    fn test_generated_documents_parse() {
        let grammar = BasicGrammar::html();
        let doc = generate_document(3);
        let tree = tagsoup_parser::parse(&doc, &grammar).unwrap();
        assert_eq!(tree.find_all(tagsoup_tree::NodeId::ROOT, "div").len(), 3);

        let messy = generate_messy_document(3);
        assert!(tagsoup_parser::parse(&messy, &grammar).is_ok());
    }

    #[test]
    fn test_stream_peak_is_independent_of_length() {
        let grammar = BasicGrammar::html();
        let small = peak_stream_nodes(&generate_document(10), &grammar).unwrap();
        let large = peak_stream_nodes(&generate_document(500), &grammar).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_run_suite_smoke() {
        let bench = Benchmark::new().with_iterations(1).with_warmup(0);
        let result = bench.bench_stream("stream/tiny", "<p>x</p>").unwrap();
        assert_eq!(result.iterations, 1);
        assert!(result.peak_nodes.is_some());
    }
}
