//! Whole-pipeline transform throughput on a representative program.

use criterion::{criterion_group, criterion_main, Criterion};
use omp_transform::{transform_source, Options};

const PROGRAM: &str = "\
@omp
def simulate(q, n):
    total = 0
    with omp(\"parallel for schedule(static, 4) reduction(+: total)\"):
        for i in range(n):
            total += i * i
    with omp(\"parallel\"):
        with omp(\"single\"):
            with omp(\"task\"):
                q.put(total)
        omp(\"taskwait\")
    return total
";

fn bench_transform(c: &mut Criterion) {
    let options = Options::default();
    c.bench_function("transform_program", |b| {
        b.iter(|| {
            let out =
                transform_source(std::hint::black_box(PROGRAM), "bench.py", &options).unwrap();
            std::hint::black_box(out);
        })
    });
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
