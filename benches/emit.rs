//! Benchmarks for emission.
//!
//! Measures the hot paths of building a module:
//! - Method, local and generic instantiation signature encoding
//! - IL generation with labels and stack tracking
//! - Baking a module with many small methods

extern crate dotemit;

use criterion::{criterion_group, criterion_main, Criterion};
use dotemit::{
    assembly::{ILGenerator, OpCode},
    builder::{BuilderConfig, ModuleBuilder},
    metadata::{
        signatures::{
            encode_local_var_signature, encode_method_signature, encode_typespec_signature,
            NullResolver, SignatureLocalVariable, SignatureLocalVariables, SignatureMethod,
            TypeSignature,
        },
        tables::attributes::{MethodAttributes, TypeAttributes},
        token::Token,
    },
};
use std::hint::black_box;

/// Benchmark encoding `int Method(int, string, bool)`.
fn bench_encode_method_signature(c: &mut Criterion) {
    let signature = SignatureMethod::static_method(
        TypeSignature::I4,
        vec![TypeSignature::I4, TypeSignature::String, TypeSignature::Boolean],
    );

    c.bench_function("encode_method_primitives", |b| {
        b.iter(|| {
            let blob = encode_method_signature(black_box(&signature), &mut NullResolver).unwrap();
            black_box(blob)
        });
    });
}

/// Benchmark encoding a local signature with arrays and a pinned pointer.
fn bench_encode_locals(c: &mut Criterion) {
    let mut pinned = SignatureLocalVariable::new(TypeSignature::Ptr(Box::new(TypeSignature::U1)));
    pinned.is_pinned = true;
    let signature = SignatureLocalVariables {
        locals: vec![
            SignatureLocalVariable::new(TypeSignature::I4),
            SignatureLocalVariable::new(TypeSignature::SzArray(Box::new(TypeSignature::String))),
            pinned,
        ],
    };

    c.bench_function("encode_locals", |b| {
        b.iter(|| {
            let blob = encode_local_var_signature(black_box(&signature), &mut NullResolver).unwrap();
            black_box(blob)
        });
    });
}

/// Benchmark encoding `List<Dictionary<string, int[]>>` against fixed tokens.
fn bench_encode_generic_instance(c: &mut Criterion) {
    let list = TypeSignature::Class(Token::new(0x0100_0001).into());
    let dictionary = TypeSignature::Class(Token::new(0x0100_0002).into());
    let signature = TypeSignature::GenericInst(
        Box::new(list),
        vec![TypeSignature::GenericInst(
            Box::new(dictionary),
            vec![
                TypeSignature::String,
                TypeSignature::SzArray(Box::new(TypeSignature::I4)),
            ],
        )],
    );

    c.bench_function("encode_generic_instance", |b| {
        b.iter(|| {
            let blob = encode_typespec_signature(black_box(&signature), &mut NullResolver).unwrap();
            black_box(blob)
        });
    });
}

/// Benchmark a counting loop with a backward branch.
fn bench_generate_loop(c: &mut Criterion) {
    c.bench_function("ilgen_loop", |b| {
        b.iter(|| {
            let mut il = ILGenerator::new();
            let top = il.define_label().unwrap();
            let done = il.define_label().unwrap();
            il.mark_label(top).unwrap();
            for value in 0..black_box(64) {
                il.emit_ldc_i4(value).unwrap();
                il.emit_branch(OpCode::BRTRUE, done).unwrap();
            }
            il.emit_branch(OpCode::BR, top).unwrap();
            il.mark_label(done).unwrap();
            il.emit(OpCode::RET).unwrap();
            black_box(il.finish().unwrap())
        });
    });
}

/// Benchmark baking a type with 100 static methods.
fn bench_bake_module(c: &mut Criterion) {
    c.bench_function("bake_100_methods", |b| {
        b.iter(|| {
            let mut module = ModuleBuilder::new("Bench.dll", BuilderConfig::default()).unwrap();
            let ty = module
                .define_type("Bench", "Methods", TypeAttributes::PUBLIC, None)
                .unwrap();
            for index in 0..100 {
                let method = module
                    .define_method(
                        ty,
                        &format!("M{index}"),
                        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                        SignatureMethod::static_method(TypeSignature::I4, vec![TypeSignature::I4]),
                    )
                    .unwrap();
                let mut il = module.il_generator(method).unwrap();
                il.emit_ldarg(0).unwrap();
                il.emit_ldc_i4(index).unwrap();
                il.emit(OpCode::ADD).unwrap();
                il.emit(OpCode::RET).unwrap();
            }
            black_box(module.bake().unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_encode_method_signature,
    bench_encode_locals,
    bench_encode_generic_instance,
    bench_generate_loop,
    bench_bake_module
);
criterion_main!(benches);
