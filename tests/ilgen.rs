//! Integration tests for IL generation: labels, stack tracking, exception regions and the
//! method header choice, both on a standalone generator and through a module.

use dotemit::{
    assembly::{ILGenerator, OpCode},
    builder::{BuilderConfig, ModuleBuilder},
    metadata::{
        method::{sort_exception_handlers, ExceptionHandler, ExceptionHandlerFlags, MethodBody},
        signatures::{SignatureMethod, TypeName, TypeSignature},
        tables::{
            attributes::{MethodAttributes, TypeAttributes},
            TableId,
        },
    },
    Error, Result,
};

const STATIC: u16 = MethodAttributes::PUBLIC | MethodAttributes::STATIC;

fn module() -> Result<ModuleBuilder> {
    ModuleBuilder::new("IlGen.dll", BuilderConfig::default())
}

/// A forward short branch is patched once its label is marked.
#[test]
fn forward_branch_displacement() -> Result<()> {
    let mut il = ILGenerator::new();
    let end = il.define_label()?;
    il.emit_branch(OpCode::BR_S, end)?;
    il.emit(OpCode::NOP)?;
    il.mark_label(end)?;
    il.emit(OpCode::RET)?;

    let finished = il.finish()?;
    assert_eq!(finished.code, vec![0x2B, 0x01, 0x00, 0x2A]);
    Ok(())
}

/// Backward branches are written immediately with a negative displacement.
#[test]
fn backward_branch_displacement() -> Result<()> {
    let mut il = ILGenerator::new();
    let top = il.define_label()?;
    il.mark_label(top)?;
    il.emit(OpCode::NOP)?;
    il.emit_branch(OpCode::BR_S, top)?;

    let finished = il.finish()?;
    assert_eq!(finished.code, vec![0x00, 0x2B, 0xFD]);
    Ok(())
}

/// Switch displacements count from the end of the whole instruction.
#[test]
fn switch_table_is_relative_to_instruction_end() -> Result<()> {
    let mut il = ILGenerator::new();
    let first = il.define_label()?;
    let second = il.define_label()?;
    il.emit_ldc_i4(0)?;
    il.emit_switch(&[first, second])?;
    il.mark_label(first)?;
    il.emit(OpCode::NOP)?;
    il.mark_label(second)?;
    il.emit(OpCode::RET)?;

    let finished = il.finish()?;
    assert_eq!(
        finished.code,
        vec![
            0x16, 0x45, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x2A
        ]
    );
    Ok(())
}

/// A short branch that cannot reach its target fails instead of truncating.
#[test]
fn short_branch_overflow() -> Result<()> {
    let mut il = ILGenerator::new();
    let far = il.define_label()?;
    il.emit_branch(OpCode::BR_S, far)?;
    for _ in 0..200 {
        il.emit(OpCode::NOP)?;
    }
    il.mark_label(far)?;
    il.emit(OpCode::RET)?;

    assert!(matches!(il.finish(), Err(Error::InvalidBranch(_))));
    Ok(())
}

/// A label that is never marked cannot be resolved.
#[test]
fn unmarked_label() -> Result<()> {
    let mut il = ILGenerator::new();
    let nowhere = il.define_label()?;
    il.emit_branch(OpCode::BR, nowhere)?;

    assert!(matches!(il.finish(), Err(Error::InvalidBranch(_))));
    Ok(())
}

/// Two branches reaching one label with different heights are rejected.
#[test]
fn disagreeing_stack_heights() {
    let result = (|| -> Result<()> {
        let mut il = ILGenerator::new();
        let join = il.define_label()?;
        il.emit_ldc_i4(0)?;
        il.emit_branch(OpCode::BRTRUE, join)?;
        il.emit_ldc_i4(1)?;
        il.emit_branch(OpCode::BR, join)?;
        il.mark_label(join)?;
        il.emit(OpCode::RET)?;
        il.finish().map(|_| ())
    })();

    assert!(matches!(result, Err(Error::NotSupported(_))));
}

/// Popping an empty stack reports the offending instruction.
#[test]
fn stack_underflow() {
    let mut il = ILGenerator::new();
    assert!(matches!(
        il.emit(OpCode::POP),
        Err(Error::StackUnderflow { offset: 0 })
    ));
}

/// Balanced code bakes and reports its maximum height.
#[test]
fn max_stack_is_tracked() -> Result<()> {
    let mut il = ILGenerator::new();
    il.emit_ldc_i4(1)?;
    il.emit_ldc_i4(2)?;
    il.emit_ldc_i4(3)?;
    il.emit(OpCode::ADD)?;
    il.emit(OpCode::ADD)?;
    il.emit(OpCode::POP)?;
    il.emit(OpCode::RET)?;

    assert_eq!(il.finish()?.max_stack, 3);
    Ok(())
}

/// An inner region is written before the region that encloses it.
#[test]
fn nested_regions_are_sorted_inner_first() {
    let outer = ExceptionHandler::finally(0..10, 10..15);
    let inner = ExceptionHandler::finally(2..8, 15..17);
    let mut handlers = vec![outer.clone(), inner.clone()];

    sort_exception_handlers(&mut handlers);
    assert_eq!(handlers, vec![inner, outer]);
}

/// Handlers of a generator come out sorted, and the implicit `leave`/`endfinally` are added.
#[test]
fn try_catch_finally_through_module() -> Result<()> {
    let mut module = module()?;
    let ty = module.define_type("App", "Guarded", TypeAttributes::PUBLIC, None)?;
    let method = module.define_method(
        ty,
        "Run",
        STATIC,
        SignatureMethod::static_method(TypeSignature::Void, Vec::new()),
    )?;
    {
        let mut il = module.il_generator(method)?;
        il.begin_exception_block()?;
        il.begin_exception_block()?;
        il.emit(OpCode::NOP)?;
        il.begin_catch_block(TypeName::core("System", "Exception"))?;
        il.emit(OpCode::POP)?;
        il.end_exception_block()?;
        il.begin_finally_block()?;
        il.emit(OpCode::NOP)?;
        il.end_exception_block()?;
        il.emit(OpCode::RET)?;
    }

    let emitted = module.bake()?;
    let rva = emitted.tables.method_def[0].rva as usize;
    let body = MethodBody::parse(&emitted.il[rva..])?;
    assert!(body.is_fat);
    assert_eq!(body.size_header, 12);
    assert_eq!(body.exception_handlers.len(), 2);
    assert_eq!(body.exception_handlers[0].flags, ExceptionHandlerFlags::EXCEPTION);
    assert_eq!(body.exception_handlers[1].flags, ExceptionHandlerFlags::FINALLY);

    let catch = &body.exception_handlers[0];
    let class = catch
        .class_token
        .and_then(|token| token.real())
        .ok_or(Error::OutOfBounds)?;
    assert_eq!(class.table(), TableId::TypeRef as u8);

    let code = emitted.method_code(1)?;
    assert!(code.contains(&0xDC));
    Ok(())
}

/// No locals and small code keep the tiny header; one local forces the fat one and a
/// deduplicated `StandAloneSig` row.
#[test]
fn header_choice_follows_locals() -> Result<()> {
    let mut module = module()?;
    let ty = module.define_type("App", "Headers", TypeAttributes::PUBLIC, None)?;
    let sig = || SignatureMethod::static_method(TypeSignature::I4, Vec::new());

    let tiny = module.define_method(ty, "Tiny", STATIC, sig())?;
    {
        let mut il = module.il_generator(tiny)?;
        il.emit_ldc_i4(7)?;
        il.emit(OpCode::RET)?;
    }

    for name in ["Fat", "AlsoFat"] {
        let method = module.define_method(ty, name, STATIC, sig())?;
        let mut il = module.il_generator(method)?;
        let local = il.declare_local(TypeSignature::I4, false)?;
        il.emit_ldc_i4(7)?;
        il.emit_stloc(&local)?;
        il.emit_ldloc(&local)?;
        il.emit(OpCode::RET)?;
    }

    let emitted = module.bake()?;
    let tiny_body = MethodBody::parse(emitted.method_body(1)?)?;
    assert!(!tiny_body.is_fat);
    assert_eq!(emitted.method_body(1)?, &[0x0A, 0x1D, 0x2A]);

    for row in [2, 3] {
        let rva = emitted.tables.method_def[row - 1].rva;
        assert_eq!(rva % 4, 0);
        let body = MethodBody::parse(&emitted.il[rva as usize..])?;
        assert!(body.is_fat);
        assert!(body.is_init_local);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
    }
    assert_eq!(emitted.tables.stand_alone_sig.len(), 1);
    Ok(())
}

/// Forcing fat headers applies even to trivial bodies.
#[test]
fn forced_fat_header() -> Result<()> {
    let config = BuilderConfig {
        force_fat_headers: true,
        ..BuilderConfig::default()
    };
    let mut module = ModuleBuilder::new("Fat.dll", config)?;
    let method = module.define_global_method(
        "Nothing",
        STATIC,
        SignatureMethod::static_method(TypeSignature::Void, Vec::new()),
    )?;
    module.il_generator(method)?.emit(OpCode::RET)?;

    let emitted = module.bake()?;
    let body = MethodBody::parse(emitted.method_body(1)?)?;
    assert!(body.is_fat);
    assert_eq!(body.size_code, 1);
    Ok(())
}
