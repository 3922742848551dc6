use criterion::{black_box, criterion_group, criterion_main, Criterion};

use actscript::engine::{node, Eval, ForEach, LoopSource, ScriptContext};
use actscript::script::Value;
use actscript::EngineConfig;

const EXPR: &str = "(($v_t=='B')?'bus':($v_t=='A')?'airplane':($v_t=='T')?'train':'feet') + ($n * 3 + 1)";

fn context(cache_capacity: usize) -> ScriptContext {
    let mut ctx = ScriptContext::with_config(EngineConfig {
        cache_capacity,
        ..EngineConfig::default()
    });
    ctx.set("v_t", "T").expect("set");
    ctx.set("n", 14).expect("set");
    ctx
}

fn bench_eval(c: &mut Criterion) {
    let mut g = c.benchmark_group("eval");

    let mut cached = context(256);
    g.bench_function("cached", |b| b.iter(|| cached.eval(black_box(EXPR))));

    // capacity 0 parses on every call
    let mut uncached = context(0);
    g.bench_function("uncached", |b| b.iter(|| uncached.eval(black_box(EXPR))));

    let mut expand = context(256);
    g.bench_function("expand_mixed", |b| {
        b.iter(|| expand.expand(black_box("go by ${=$v_t=='T' ? 'train' : 'car'} x${n}")))
    });

    g.finish();
}

fn bench_loop(c: &mut Criterion) {
    let items: Vec<Value> = (0..1000).map(Value::from).collect();
    let lp = node(ForEach::new(
        LoopSource::Value("${items}".into()),
        vec![node(Eval::new("$sum += $item"))],
    ));
    let mut ctx = context(256);
    ctx.set("items", items).expect("set");

    c.bench_function("foreach_1000", |b| {
        b.iter(|| {
            ctx.set("sum", 0).expect("set");
            ctx.execute(&lp).expect("run")
        })
    });
}

criterion_group!(benches, bench_eval, bench_loop);
criterion_main!(benches);
