use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use llama_rs::pattern::FsmBuilder;
use llama_rs::rule::PatternDef;
use std::hint::black_box;

const WORDS: &[&str] = &[
    "powershell", "mimikatz", "cmd.exe", "rundll32", "regsvr32", "certutil", "bitsadmin",
    "wscript", "cscript", "mshta",
];

fn haystack(len: usize) -> Vec<u8> {
    let filler = b"the quick brown fox jumps over the lazy dog ";
    let mut data: Vec<u8> = filler.iter().copied().cycle().take(len).collect();
    // Plant a few needles so the hit path is measured too
    for (i, word) in WORDS.iter().enumerate() {
        let at = (len / WORDS.len()) * i;
        if at + word.len() < len {
            data[at..at + word.len()].copy_from_slice(word.as_bytes());
        }
    }
    data
}

fn program(count: usize, nocase: bool) -> llama_rs::pattern::PatternProgram {
    let mut builder = FsmBuilder::new();
    for i in 0..count {
        let mut def = PatternDef::new(format!("{}{}", WORDS[i % WORDS.len()], i / WORDS.len()));
        def.options.case_insensitive = nocase;
        def.options.fixed_string = true;
        builder.add_pattern(&def, i).unwrap();
    }
    builder.build().unwrap()
}

fn benchmark_search_all(c: &mut Criterion) {
    let data = haystack(1 << 20);
    let mut group = c.benchmark_group("pattern_search");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for count in [1usize, 10, 100] {
        let exact = program(count, false);
        group.bench_with_input(BenchmarkId::new("exact", count), &data, |b, data| {
            b.iter(|| black_box(exact.search_all(black_box(data))));
        });
        let nocase = program(count, true);
        group.bench_with_input(BenchmarkId::new("nocase", count), &data, |b, data| {
            b.iter(|| black_box(nocase.search_all(black_box(data))));
        });
    }
    group.finish();
}

fn benchmark_regex(c: &mut Criterion) {
    let data = haystack(1 << 20);
    let mut builder = FsmBuilder::new();
    for (i, expr) in [r"cmd\.exe", r"(power|w|c)shell", r"reg[a-z]+32", r"\d{3}-\d{4}"]
        .iter()
        .enumerate()
    {
        builder.add_pattern(&PatternDef::new(*expr), i).unwrap();
    }
    let program = builder.build().unwrap();
    let mut group = c.benchmark_group("regex_search");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("search_all", |b| {
        b.iter(|| black_box(program.search_all(black_box(&data))));
    });
    group.finish();
}

fn benchmark_chunked_stream(c: &mut Criterion) {
    let data = haystack(1 << 20);
    let program = program(10, false);
    let mut group = c.benchmark_group("chunked_stream");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for chunk in [4096usize, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &data, |b, data| {
            let mut ctx = program.new_context();
            b.iter(|| {
                let mut hits = 0u64;
                for piece in data.chunks(chunk) {
                    program.search(&mut ctx, piece, |_| hits += 1);
                }
                program.finish(&mut ctx, |_| hits += 1);
                black_box(hits)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_search_all, benchmark_regex, benchmark_chunked_stream);
criterion_main!(benches);
