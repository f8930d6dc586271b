//! Benchmarks for clausecut splitting performance.
//!
//! Run with: cargo bench
//!
//! The classifier is a constant stub, so these measure the deterministic
//! parts of the pipeline: marker scan, candidate detection, context building
//! and reply validation.

use clausecut::{BoundaryCandidateDetector, ClassifierError, Clausecut, Message};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const AUDIT_REPLY: &str =
    r#"{"verdict":"reject","boundaries":[],"final_sections":[],"warnings":[]}"#;

/// Creates a synthetic contract with the given number of clauses.
fn create_test_contract(clause_count: usize) -> Vec<String> {
    let mut lines = vec![
        "業務委託契約書".to_string(),
        "株式会社A（以下「甲」という。）と株式会社B（以下「乙」という。）は、次のとおり契約を締結する。".to_string(),
    ];

    for i in 1..=clause_count {
        lines.push(format!("第{i}条（条項{i}）"));
        lines.push(format!(
            "甲及び乙は、本契約第{i}条に定める事項について誠実に協議するものとする。"
        ));
        lines.push("2 前項の協議が整わないときは、甲乙協議の上これを定める。".to_string());
    }

    lines.extend(
        [
            "本契約締結の証として本書2通を作成し、甲乙記名押印の上、各1通を保有する。",
            "2024年4月1日",
            "（甲）東京都千代田区1-1-1 株式会社A 代表取締役 山田太郎 印",
            "（乙）大阪府大阪市2-2-2 株式会社B 代表取締役 鈴木花子 印",
            "別紙1 業務内容",
            "1. システム保守",
            "別紙2 価格表",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    lines
}

fn stub(messages: &[Message]) -> Result<String, ClassifierError> {
    if messages[1].content.starts_with("### 条文リスト") {
        Ok("[]".to_string())
    } else {
        Ok(AUDIT_REPLY.to_string())
    }
}

/// Benchmark the full pipeline at various sizes.
fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    let pipeline = Clausecut::new();

    for clause_count in [10, 100, 500].iter() {
        let lines = create_test_contract(*clause_count);
        let size: usize = lines.iter().map(String::len).sum();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("clauses", clause_count),
            &lines,
            |b, lines| {
                b.iter(|| {
                    let _ = pipeline.split(black_box(lines), &stub);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the marker scan alone.
fn bench_marker_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("marker_scan");

    for clause_count in [10, 100, 500, 1000].iter() {
        let lines = create_test_contract(*clause_count);

        group.bench_with_input(
            BenchmarkId::new("clauses", clause_count),
            &lines,
            |b, lines| {
                b.iter(|| clausecut::split::split_clauses(black_box(lines)));
            },
        );
    }

    group.finish();
}

/// Benchmark candidate detection on a signature-heavy tail.
fn bench_candidate_detection(c: &mut Criterion) {
    let detector = BoundaryCandidateDetector::default();
    let tail = create_test_contract(1);

    c.bench_function("detect_tail_candidates", |b| {
        b.iter(|| detector.detect(black_box(&tail)));
    });
}

criterion_group!(
    benches,
    bench_marker_scan,
    bench_candidate_detection,
    bench_split,
);
criterion_main!(benches);
