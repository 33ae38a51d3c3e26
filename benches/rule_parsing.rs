use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use llama_rs::lexer::scan_tokens;
use llama_rs::{parse_rules, RuleEngine};
use std::hint::black_box;

const SIMPLE_RULE: &str = r#"
rule Simple {
  file_metadata:
    filesize > 1000
}
"#;

const COMPLEX_RULE: &str = r#"
rule Complex {
  meta:
    description = "every section"
  hash:
    md5 == "900150983cd24fb0d6963f7d28e17f72", sha1 == "a9993e364706816aba3e25717850c26c9cd0d89d"
  file_metadata:
    (created > "2023-05-04" and modified < "2023-05-06") or filesize == 30000
  signature:
    name == "PDF"
  grep:
    patterns:
      a = "powershell" nocase encodings=UTF-8,UTF-16LE
      b = { 4d 5a 90 00 }
      c = "cmd.exe"
    condition:
      any(a, b) and count(c) > 2
}
"#;

fn rule_file(n: usize) -> String {
    (0..n)
        .map(|i| COMPLEX_RULE.replace("rule Complex", &format!("rule Complex{}", i)))
        .collect()
}

/// Parse `text` and fail loudly if any rule was dropped, so the benches
/// never measure only the error-recovery path
fn checked(text: &str, expected: usize) -> &str {
    let out = parse_rules(text).unwrap();
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    assert_eq!(out.rules.len(), expected);
    text
}

fn benchmark_lexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexing");
    for n in [1usize, 10, 100] {
        let text = rule_file(n);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &text, |b, text| {
            b.iter(|| black_box(scan_tokens(black_box(text)).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_parsing");

    let simple = checked(SIMPLE_RULE, 1);
    group.bench_function("parse_simple_rule", |b| {
        b.iter(|| black_box(parse_rules(black_box(simple)).unwrap()));
    });
    let complex = checked(COMPLEX_RULE, 1);
    group.bench_function("parse_complex_rule", |b| {
        b.iter(|| black_box(parse_rules(black_box(complex)).unwrap()));
    });

    for n in [10usize, 100] {
        let text = rule_file(n);
        checked(&text, n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("parse_many", n), &text, |b, text| {
            b.iter(|| black_box(parse_rules(black_box(text)).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_engine_build(c: &mut Criterion) {
    let text = rule_file(100);
    let rules = parse_rules(checked(&text, 100)).unwrap().rules;
    c.bench_function("engine_build_100_rules", |b| {
        b.iter(|| black_box(RuleEngine::new(rules.clone()).unwrap()));
    });
}

criterion_group!(benches, benchmark_lexing, benchmark_parsing, benchmark_engine_build);
criterion_main!(benches);
