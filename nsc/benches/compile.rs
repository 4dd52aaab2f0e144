use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use nsc::prelude::*;

fn criterion_benchmark(c: &mut Criterion) {
    let engine = EngineTable::from_source("bench", include_str!("../tests/fixtures/nwscript.nss")).unwrap();
    let compiler = Compiler::new(Arc::new(engine));

    {
        let source = include_str!("../tests/fixtures/library.nss");
        c.bench_function("compile bundled library", |b| {
            b.iter(|| black_box(compiler.compile("library", black_box(source))))
        });
    }

    {
        let object = compiler
            .compile("hello", include_str!("../tests/fixtures/hello.nss"))
            .object
            .unwrap();
        c.bench_function("disassemble", |b| {
            b.iter(|| black_box(Disassembler::new(black_box(&object.bytes)).listing()))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
