//! Run with:
//!   cargo bench --bench vm_benchmark

use std::io::Cursor;
use std::sync::Arc;

use aesop::resource::build_dictionary;
use aesop::{ContainerWriter, Engine, EngineConfig, PROGRAM_HEADER_SIZE, ProgramHeader, ProgramRef, ResourceManager};
use bytecode::{Area, BinaryOp, BytecodeBuilder, Op, Width};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

const LOOP_MESSAGE: u32 = 1;
const SEND_MESSAGE: u32 = 2;

/// Program 10 counts autos[0] down to zero; program 20 sends to the
/// object at index 1 `count` times.
fn container() -> Vec<u8> {
    let mut w = ContainerWriter::new();

    let mut b = BytecodeBuilder::with_origin(PROGRAM_HEADER_SIZE);
    let countdown = b.handler(4);
    let top = b.current_offset() as u16;
    b.load(Area::Auto, Width::Dword, false, 0);
    b.op(Op::Dec);
    b.store(Area::Auto, Width::Dword, false, 0);
    b.branch_to(Op::Brt, top);
    b.rts();
    let echo = b.handler(0);
    b.load(Area::Auto, Width::Dword, false, 0);
    b.push();
    b.shtc(1);
    b.binary(BinaryOp::Add);
    b.rts();
    let handlers = [(LOOP_MESSAGE, countdown), (SEND_MESSAGE, echo)];
    add_program(&mut w, 10, "counter", &b.into_bytes(), &handlers);

    let mut b = BytecodeBuilder::with_origin(PROGRAM_HEADER_SIZE);
    let sender = b.handler(4);
    let top = b.current_offset() as u16;
    b.shtc(1);
    b.push();
    b.load(Area::Auto, Width::Dword, false, 0);
    b.send(1, SEND_MESSAGE as u16);
    b.load(Area::Auto, Width::Dword, false, 0);
    b.op(Op::Dec);
    b.store(Area::Auto, Width::Dword, false, 0);
    b.branch_to(Op::Brt, top);
    b.rts();
    add_program(&mut w, 20, "sender", &b.into_bytes(), &[(SEND_MESSAGE, sender)]);

    w.to_bytes()
}

fn add_program(w: &mut ContainerWriter, id: u32, name: &str, code: &[u8], handlers: &[(u32, u16)]) {
    let header = ProgramHeader {
        static_size: 0,
        imports: 0,
        exports: id + 1,
        parent: None,
    };
    let mut data = header.to_bytes().to_vec();
    data.extend_from_slice(code);
    w.insert(id, Some(name), data).unwrap();

    let exports: Vec<(String, String)> = handlers
        .iter()
        .map(|(message, offset)| (format!("M:{message}"), offset.to_string()))
        .collect();
    let dict = build_dictionary(exports.iter().map(|(tag, def)| (tag.as_str(), def.as_str())));
    w.insert(id + 1, None, dict).unwrap();
}

fn engine() -> Engine {
    let rm = ResourceManager::from_reader(Cursor::new(container())).unwrap();
    let mut engine = Engine::new(Arc::new(rm), EngineConfig::default());
    engine.create_program(Some(1), ProgramRef::Name("counter")).unwrap();
    engine.create_program(Some(2), ProgramRef::Name("sender")).unwrap();
    engine
}

fn bench_interpreter(c: &mut Criterion) {
    let mut engine = engine();
    let count = [aesop::Value::from_i32(10_000)];

    c.bench_function("countdown_10k", |b| {
        b.iter(|| black_box(engine.send(1, LOOP_MESSAGE, black_box(&count)).unwrap()))
    });

    let sends = [aesop::Value::from_i32(1_000)];
    c.bench_function("send_1k", |b| {
        b.iter(|| black_box(engine.send(2, SEND_MESSAGE, black_box(&sends)).unwrap()))
    });
}

fn bench_resources(c: &mut Criterion) {
    let rm = ResourceManager::from_reader(Cursor::new(container())).unwrap();
    rm.resource(10).unwrap();

    c.bench_function("resource_cache_hit", |b| b.iter(|| black_box(rm.resource(black_box(10)).unwrap())));

    c.bench_function("resource_cold_read", |b| {
        b.iter(|| {
            rm.evict(20);
            black_box(rm.resource(black_box(20)).unwrap())
        })
    });

    c.bench_function("thunk_build", |b| {
        b.iter(|| {
            let mut engine = Engine::new(Arc::new(ResourceManager::from_reader(Cursor::new(container())).unwrap()), EngineConfig::default());
            black_box(engine.load_thunk(black_box(10)).unwrap())
        })
    });
}

criterion_group!(benches, bench_interpreter, bench_resources);
criterion_main!(benches);
