//! Wire codec benchmark suite.
//!
//! Measures the hot paths of frame encoding and decoding:
//! - Varints: 1, 3 and 5 byte encodings
//! - Dynamic tuples: primitive and vector payloads
//! - NBT: nested compounds
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::collections::BTreeMap;
use std::hint::black_box;

use codecraft::codec::{Vec3d, Vec3i};
use codecraft::{ByteBuf, DynamicValue, Nbt, RegistryIdMaps, ResourceId};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const VARINT_VALUES: &[(&str, i32)] = &[("1_byte", 17), ("3_bytes", 70_000), ("5_bytes", -1)];
const TUPLE_LENGTHS: &[usize] = &[1, 16, 256];

// ============================================================================
// Fixtures
// ============================================================================

fn tuple(len: usize) -> Vec<DynamicValue> {
    (0..len)
        .map(|i| match i % 4 {
            0 => DynamicValue::VarInt(i as i32),
            1 => DynamicValue::String(format!("value-{i}")),
            2 => DynamicValue::Vec3i(Vec3i::new(i as i32, 64, -(i as i32))),
            _ => DynamicValue::Vec3d(Vec3d::new(0.5, i as f64, -0.25)),
        })
        .collect()
}

fn nbt(depth: usize) -> Nbt {
    let mut compound = BTreeMap::new();
    compound.insert("id".to_string(), Nbt::String("minecraft:chest".to_string()));
    compound.insert("pos".to_string(), Nbt::IntArray(vec![1, 64, -3]));
    compound.insert(
        "items".to_string(),
        Nbt::List((0..8).map(|i| Nbt::Byte(i as i8)).collect()),
    );
    if depth > 0 {
        compound.insert("child".to_string(), nbt(depth - 1));
    }
    Nbt::Compound(compound)
}

// ============================================================================
// Benchmark: Varints
// ============================================================================

fn bench_varint(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint");

    for &(name, value) in VARINT_VALUES {
        group.bench_with_input(BenchmarkId::new("write", name), &value, |b, &value| {
            let mut buf = ByteBuf::with_capacity(8);
            b.iter(|| {
                buf.clear();
                buf.write_varint(black_box(value));
            });
        });

        let mut encoded = ByteBuf::new();
        encoded.write_varint(value);
        let bytes = encoded.into_inner();
        group.bench_with_input(BenchmarkId::new("read", name), &bytes, |b, bytes| {
            b.iter(|| ByteBuf::view(black_box(bytes)).read_varint());
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Dynamic Tuples
// ============================================================================

fn bench_dynamic_tuple(c: &mut Criterion) {
    let maps = RegistryIdMaps::new();
    let mut group = c.benchmark_group("dynamic_tuple");

    for &len in TUPLE_LENGTHS {
        let values = tuple(len);
        let mut encoded = ByteBuf::new();
        if encoded.write_dynamic_tuple(&values, &maps).is_err() {
            continue;
        }
        let bytes = encoded.into_inner();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("write", len), &values, |b, values| {
            let mut buf = ByteBuf::with_capacity(bytes.len());
            b.iter(|| {
                buf.clear();
                buf.write_dynamic_tuple(black_box(values), &maps)
            });
        });

        group.bench_with_input(BenchmarkId::new("read", len), &bytes, |b, bytes| {
            b.iter(|| ByteBuf::view(black_box(bytes)).read_dynamic_tuple(&maps));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: NBT
// ============================================================================

fn bench_nbt(c: &mut Criterion) {
    let mut group = c.benchmark_group("nbt");

    for depth in [0usize, 4, 16] {
        let tag = nbt(depth);
        let mut encoded = ByteBuf::new();
        if encoded.write_nbt(Some(&tag)).is_err() {
            continue;
        }
        let bytes = encoded.into_inner();

        group.bench_with_input(BenchmarkId::new("write", depth), &tag, |b, tag| {
            let mut buf = ByteBuf::with_capacity(bytes.len());
            b.iter(|| {
                buf.clear();
                buf.write_nbt(Some(black_box(tag)))
            });
        });

        group.bench_with_input(BenchmarkId::new("read", depth), &bytes, |b, bytes| {
            b.iter(|| ByteBuf::view(black_box(bytes)).read_nbt());
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Resource Ids
// ============================================================================

fn bench_resource_id(c: &mut Criterion) {
    c.bench_function("resource_id/parse", |b| {
        b.iter(|| ResourceId::parse(black_box("codecraft:send_system_chat")));
    });
}

criterion_group!(
    benches,
    bench_varint,
    bench_dynamic_tuple,
    bench_nbt,
    bench_resource_id
);
criterion_main!(benches);
