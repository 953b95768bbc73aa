//! Criterion benchmarks for script evaluation and graph validation.
//!
//! Run with:
//! ```bash
//! cargo bench --package livegraph-core --bench script_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livegraph_core::script::{build_graph, validate, ModuleCache, ModuleLoader};

// ── Script fixtures ───────────────────────────────────────────────────────────

/// A chain of `len` TOP nodes, each feeding the next.
fn make_chain_script(len: usize) -> String {
    let mut source = String::from("let n0 = c.top(\"noise\", { period: c.fp(1) })\n");
    for i in 1..len {
        source.push_str(&format!(
            "let n{i} = n{}.connect(c.top(\"level\", {{ opacity: c.fp({i} / {len}) }}))\n",
            i - 1
        ));
    }
    source.push_str(&format!("return n{}.out()\n", len - 1));
    source
}

/// A fan of CHOP-driven SOPs built with `map`.
fn make_map_script(width: usize) -> String {
    format!(
        r#"
        let lfo = c.chop("lfo", {{ frequency: 0.5 }})
        let ids = [{}]
        return ids.map((i) => c.sop("box", {{
            t: c.xyzp(i, 0, c.multp(c.chan(0, lfo), i)),
            scale: c.ip(i)
        }}))
        "#,
        (0..width).map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
    )
}

fn loader() -> ModuleLoader {
    ModuleLoader::new(std::env::temp_dir(), Arc::new(ModuleCache::new()))
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_build_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_graph_chain");
    for len in [10, 100, 500] {
        let source = make_chain_script(len);
        group.bench_with_input(BenchmarkId::new("nodes", len), &source, |b, source| {
            b.iter(|| build_graph(black_box(source), "<document>", &loader()).unwrap())
        });
    }
    group.finish();
}

fn bench_build_and_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_and_validate");
    for width in [10, 100] {
        let source = make_map_script(width);
        group.bench_with_input(BenchmarkId::new("fan", width), &source, |b, source| {
            b.iter(|| {
                let value = build_graph(black_box(source), "<document>", &loader()).unwrap();
                validate(&value).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_graph, bench_build_and_validate);
criterion_main!(benches);
