//! Decode throughput over a synthetic module of straight-line functions.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use rimec::bitcode::codes::{self, block};
use rimec::bitcode::stream::EventStream;
use rimec::lower::NullLower;
use rimec::{Flags, Translator};

fn build_module(functions: usize, insts_per_function: usize) -> Vec<u8> {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[1]);
    stream.enter_block(block::TYPES);
    stream.record(codes::types::COUNT, &[2]);
    stream.record(codes::types::INTEGER, &[32]);
    stream.record(codes::types::FUNCTION, &[0, 0, 0, 0]); // i32 (i32, i32)
    stream.exit_block();
    for _ in 0..functions {
        stream.record(codes::module::FUNCTION, &[1, 0, 0, 3]);
    }
    for _ in 0..functions {
        stream.enter_block(block::FUNCTION);
        stream.record(codes::function::DECLAREBLOCKS, &[1]);
        for _ in 0..insts_per_function {
            stream.record(codes::function::BINOP, &[1, 2, codes::binop::ADD]);
        }
        stream.record(codes::function::RET, &[1]);
        stream.exit_block();
    }
    stream.exit_block();
    stream.to_bytes()
}

fn bench_translate(c: &mut Criterion) {
    let bytes = build_module(8, 250);
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("translate_module", |b| {
        b.iter(|| {
            let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
            translator
                .translate(black_box(&bytes))
                .expect("benchmark module is well-formed");
        });
    });
    group.finish();
}

criterion_group!(benches, bench_translate);
criterion_main!(benches);
