use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};
use tempfile::tempdir;

use connections::text::{LineSplitter, PushBack};
use connections::{ConnectionsConfig, Session};

const LINES: usize = 10_000;

fn sample(line_len: usize, terminator: &str) -> String {
    let line = "x".repeat(line_len);
    let mut text = String::with_capacity((line_len + 2) * LINES);
    for _ in 0..LINES {
        text.push_str(&line);
        text.push_str(terminator);
    }
    text
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    for &(name, terminator) in &[("lf", "\n"), ("crlf", "\r\n"), ("cr", "\r")] {
        let text = sample(80, terminator);
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| {
                let mut splitter = LineSplitter::new();
                let mut count = 0;
                for chunk in text.as_bytes().chunks(4096) {
                    let chunk = std::str::from_utf8(chunk).expect("ascii sample");
                    count += splitter.push(black_box(chunk)).len();
                }
                count
            });
        });
    }
    group.finish();
}

fn bench_pushback(c: &mut Criterion) {
    let lines: Vec<String> = (0..LINES).map(|i| format!("line {i}")).collect();
    c.bench_function("pushback_drain", |b| {
        b.iter_batched(
            || {
                let mut pb = PushBack::new();
                pb.push(&lines[..], true);
                pb
            },
            |mut pb| {
                let mut count = 0;
                while !pb.is_empty() {
                    black_box(pb.next_line());
                    count += 1;
                }
                count
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_read_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_lines");
    for &size in &[16_usize, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = tempdir().expect("tempdir");
                    let path = dir.path().join("lines.txt");
                    std::fs::write(&path, sample(size, "\n")).expect("write sample");
                    let session = Session::new(ConnectionsConfig::default()).expect("session");
                    (dir, session, path)
                },
                |(_dir, session, path)| {
                    let con = session.file(&path, "").expect("file");
                    let lines = con.lock().expect("lock").read_lines(-1, false, false).expect("read");
                    assert_eq!(lines.len(), LINES);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_split, bench_pushback, bench_read_lines);
criterion_main!(benches);
