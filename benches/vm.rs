//! Benchmarks of the full pipeline: scan, compile, and execute.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn run_program(source: &str) {
    let mut out = Vec::new();
    lox::interpret_with_output(source, &mut out).expect("benchmark program runs");
}

fn compile_only(source: &str) {
    lox::compiler::compile(lox::scanner::Scanner::new(source)).expect("benchmark program compiles");
}

fn compile_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    let expression_soup = "print 1 + 2 * 3 - 4 / 2 < 5 == true != false;";
    group.bench_function("expression_statement", |b| {
        b.iter(|| compile_only(black_box(expression_soup)))
    });

    let branchy = "var x = 3; if (x < 2) print 1; else if (x < 4) print 2; else print 3;";
    group.bench_function("nested_branches", |b| {
        b.iter(|| compile_only(black_box(branchy)))
    });

    group.finish();
}

fn execute_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");

    group.bench_function("sum_10000", |b| {
        b.iter(|| {
            run_program(black_box(
                "var i = 0; var total = 0; \
                 while (i < 10000) { total = total + i; i = i + 1; }",
            ))
        })
    });

    group.bench_function("countdown_flat_body", |b| {
        b.iter(|| run_program(black_box("var i = 10000; while (0 < i) i = i - 1;")))
    });

    group.finish();
}

criterion_group!(benches, compile_benchmarks, execute_benchmarks);
criterion_main!(benches);
