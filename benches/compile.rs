//! Benchmark: full compile pipeline (lex, parse, analyze, emit) over a
//! synthetic protocol with many messages, plus the front end alone.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use protodsl::{analyze, compile, parse, EmitOptions, Mode};

/// Build a protocol with `n` messages, each mixing whole-byte fields, a bit
/// run, and a limited array, with every message bound to an id.
fn synthetic_protocol(n: usize) -> String {
    let mut src = String::from("mspace bench;\nconst MAX 128\nconst MASK 0x55\n");
    src.push_str("defmid Mid {\n");
    for i in 0..n {
        if i == 0 {
            src.push_str(&format!("    M{} = 1,\n", i));
        } else {
            src.push_str(&format!("    M{},\n", i));
        }
    }
    src.push_str("}\n");
    for i in 0..n {
        src.push_str(&format!(
            "defmsg Msg{i} {{\n\
             \tkind u8 //*message kind\n\
             \tflags u4\n\
             \tprio u3\n\
             \tlast u1\n\
             \tseq u32 -> xor MASK\n\
             \tlen u8 -> max MAX\n\
             \tdata []u8 -> limit by len\n\
             }}\n\
             bind M{i} Msg{i}\n"
        ));
    }
    src
}

fn bench_compile(c: &mut Criterion) {
    let src = synthetic_protocol(64);
    let opts = EmitOptions { source_name: "bench.proto".to_string() };

    // One warm-up pass to fail fast on a broken synthetic source.
    let code = compile(&src, Mode::Go, &opts).expect("synthetic protocol compiles");
    eprintln!(
        "bench_compile: {} source bytes -> {} generated lines",
        src.len(),
        code.lines().count()
    );

    c.bench_function("compile_64_messages", |b| {
        b.iter(|| compile(black_box(&src), Mode::Go, &opts).expect("compile"))
    });

    c.bench_function("parse_64_messages", |b| {
        b.iter(|| parse(black_box(&src)).expect("parse"))
    });

    c.bench_function("parse_analyze_64_messages", |b| {
        b.iter(|| {
            let mut program = parse(black_box(&src)).expect("parse");
            analyze(&mut program).expect("analyze");
            black_box(program)
        })
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
