//! Integration tests for high-level builder combinations.
//!
//! This module tests realistic scenarios where types, members, attributes and IL are combined
//! in one module and baked, checking the rows, heaps and method bodies that come out.

use dotemit::{
    assembly::OpCode,
    builder::{
        AssemblyBuilder, AssemblyName, AssemblyVersion, BuilderConfig, ConstantValue,
        EmittedModule, MethodTarget, ModuleBuilder, TypeId,
    },
    metadata::{
        customattributes::{
            decode_custom_attribute, CustomAttributeArgument, CustomAttributeBuilder,
            CustomAttributeType,
        },
        signatures::{parse_method_signature, SignatureMethod, TypeName, TypeSignature},
        tables::{
            attributes::{
                FieldAttributes, MethodAttributes, MethodSemanticsAttributes, PInvokeAttributes,
                TypeAttributes,
            },
            CodedIndex, CodedIndexType, TableId,
        },
        token::Token,
    },
    Result,
};

const STATIC: u16 = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
const ACCESSOR: u16 =
    MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::HIDE_BY_SIG;

fn module(name: &str) -> Result<ModuleBuilder> {
    let _ = env_logger::builder().is_test(true).try_init();
    ModuleBuilder::new(name, BuilderConfig::default())
}

fn add_method(module: &mut ModuleBuilder, ty: TypeId, flags: u16) -> Result<()> {
    let method = module.define_method(
        ty,
        "Add",
        flags,
        SignatureMethod::static_method(TypeSignature::I4, vec![TypeSignature::I4; 2]),
    )?;
    let first = if flags & MethodAttributes::STATIC != 0 { 0 } else { 1 };
    let mut il = module.il_generator(method)?;
    il.emit_ldarg(first)?;
    il.emit_ldarg(first + 1)?;
    il.emit(OpCode::ADD)?;
    il.emit(OpCode::RET)
}

/// `T : object` with an instance `Add(int, int) : int` and a synthesized default ctor.
#[test]
fn test_instance_add_scenario() -> Result<()> {
    let mut module = module("Scenario.dll")?;
    let ty = module.define_type("", "T", TypeAttributes::PUBLIC, None)?;
    add_method(&mut module, ty, MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG)?;

    let emitted = module.bake()?;
    let tables = &emitted.tables;
    assert_eq!(tables.type_def.len(), 2);
    assert_eq!(emitted.string(tables.type_def[0].type_name), Some("<Module>"));
    assert_eq!(emitted.string(tables.type_def[1].type_name), Some("T"));
    assert_eq!(tables.method_def.len(), 2);
    assert_eq!(emitted.string(tables.method_def[1].name), Some(".ctor"));

    let signature = parse_method_signature(emitted.blob(tables.method_def[0].signature)?)?;
    assert!(signature.has_this);
    assert_eq!(signature.params.len(), 2);
    assert_eq!(signature.return_type.base, TypeSignature::I4);
    assert!(signature
        .params
        .iter()
        .all(|param| param.base == TypeSignature::I4));

    let body = emitted.method_body(1)?;
    assert_eq!(body[0], 0x12);
    assert_eq!(&body[1..], &[0x03, 0x04, 0x58, 0x2A]);
    Ok(())
}

/// The static form of the scenario reads its arguments from slots 0 and 1.
#[test]
fn test_static_add_scenario() -> Result<()> {
    let mut module = module("Scenario.dll")?;
    let ty = module.define_type("", "T", TypeAttributes::PUBLIC, None)?;
    add_method(&mut module, ty, STATIC)?;

    let emitted = module.bake()?;
    assert_eq!(emitted.method_body(1)?, &[0x12, 0x02, 0x03, 0x58, 0x2A]);
    let signature = parse_method_signature(emitted.blob(emitted.tables.method_def[0].signature)?)?;
    assert!(!signature.has_this);
    Ok(())
}

/// The default constructor calls the base constructor and returns.
#[test]
fn test_default_constructor_body() -> Result<()> {
    let mut module = module("Ctor.dll")?;
    module.define_type("App", "Widget", TypeAttributes::PUBLIC, None)?;

    let emitted = module.bake()?;
    let code = emitted.method_code(1)?;
    assert_eq!(code[0], 0x02);
    assert_eq!(code[1], 0x28);
    assert_eq!(code[6], 0x2A);

    let token = Token::new(u32::from_le_bytes([code[2], code[3], code[4], code[5]]));
    assert_eq!(token.table(), TableId::MemberRef as u8);
    assert!(emitted.tables.contains(token));
    let member = &emitted.tables.member_ref[token.row() as usize - 1];
    assert_eq!(emitted.string(member.name), Some(".ctor"));
    Ok(())
}

/// Tokens of methods defined after their callers are patched into real rows.
#[test]
fn test_every_il_token_resolves() -> Result<()> {
    let mut module = module("Calls.dll")?;
    let ty = module.define_type("App", "Program", TypeAttributes::PUBLIC, None)?;
    let void = || SignatureMethod::static_method(TypeSignature::Void, Vec::new());
    let main = module.define_method(ty, "Main", STATIC, void())?;
    let helper = module.define_method(ty, "Helper", STATIC, void())?;
    let counter = module.define_field(ty, "counter", TypeSignature::I4, FieldAttributes::STATIC)?;

    {
        let mut il = module.il_generator(main)?;
        il.emit_call(OpCode::CALL, helper)?;
        il.emit_field(OpCode::LDSFLD, counter)?;
        il.emit(OpCode::POP)?;
        il.emit_string("done")?;
        il.emit(OpCode::POP)?;
        il.emit(OpCode::RET)?;
    }
    {
        let mut il = module.il_generator(helper)?;
        il.emit(OpCode::RET)?;
    }
    module.set_entry_point(main)?;

    let emitted = module.bake()?;
    let code = emitted.method_code(1)?;
    let call = Token::new(u32::from_le_bytes([code[1], code[2], code[3], code[4]]));
    let field = Token::new(u32::from_le_bytes([code[6], code[7], code[8], code[9]]));
    let string = Token::new(u32::from_le_bytes([code[12], code[13], code[14], code[15]]));
    assert_eq!(call, Token::new(0x0600_0002));
    assert_eq!(field, Token::new(0x0400_0001));
    assert!(emitted.tables.contains(call));
    assert!(emitted.tables.contains(field));
    assert_eq!(string.table(), 0x70);
    assert_eq!(emitted.entry_point, Some(Token::new(0x0600_0001)));
    Ok(())
}

/// Identical user strings share one `#US` entry.
#[test]
fn test_user_strings_are_deduplicated() -> Result<()> {
    let mut module = module("Strings.dll")?;
    let first = module.user_string("hello")?;
    let second = module.user_string("hello")?;
    let other = module.user_string("world")?;
    assert_eq!(first, second);
    assert_ne!(first, other);
    Ok(())
}

fn viewmodel(module: &mut ModuleBuilder) -> Result<TypeId> {
    let ty = module.define_type("MyApp", "PersonViewModel", TypeAttributes::PUBLIC, None)?;
    let handler = TypeName::core("System", "EventHandler");

    let name = module.define_property(ty, "Name", 0, TypeSignature::String, Vec::new())?;
    let get_name = module.define_method(
        ty,
        "get_Name",
        ACCESSOR,
        SignatureMethod::instance(TypeSignature::String, Vec::new()),
    )?;
    {
        let mut il = module.il_generator(get_name)?;
        il.emit_string("Ada")?;
        il.emit(OpCode::RET)?;
    }
    module.set_get_method(name, get_name)?;

    let changed = module.define_event(ty, "Changed", 0, handler.clone())?;
    for (accessor, add) in [("add_Changed", true), ("remove_Changed", false)] {
        let method = module.define_method(
            ty,
            accessor,
            ACCESSOR,
            SignatureMethod::instance(
                TypeSignature::Void,
                vec![TypeSignature::Class(handler.clone().into())],
            ),
        )?;
        module.il_generator(method)?.emit(OpCode::RET)?;
        if add {
            module.set_add_on_method(changed, method)?;
        } else {
            module.set_remove_on_method(changed, method)?;
        }
    }
    Ok(ty)
}

/// Properties and events get map rows, contiguous lists and accessor semantics.
#[test]
fn test_viewmodel_with_properties_and_events() -> Result<()> {
    let mut module = module("ViewModels.dll")?;
    let first = viewmodel(&mut module)?;
    let second = module.define_type("MyApp", "Empty", TypeAttributes::PUBLIC, None)?;
    let count = module.define_property(second, "Count", 0, TypeSignature::I4, Vec::new())?;
    let get_count = module.define_method(
        second,
        "get_Count",
        ACCESSOR,
        SignatureMethod::instance(TypeSignature::I4, Vec::new()),
    )?;
    {
        let mut il = module.il_generator(get_count)?;
        il.emit_ldc_i4(0)?;
        il.emit(OpCode::RET)?;
    }
    module.set_get_method(count, get_count)?;

    let emitted = module.bake()?;
    let tables = &emitted.tables;
    assert_eq!(tables.property_map.len(), 2);
    assert!(tables.property_map[0].parent < tables.property_map[1].parent);
    assert_eq!(tables.property_map[0].property_list, 1);
    assert_eq!(tables.property_map[1].property_list, 2);
    assert_eq!(tables.event_map.len(), 1);
    assert_eq!(tables.event_map[0].parent, first_row(first));
    assert_eq!(tables.event.len(), 1);
    assert_eq!(tables.event[0].event_type.tag, TableId::TypeRef);

    let roles: Vec<u16> = tables.method_semantics.iter().map(|row| row.semantics).collect();
    assert_eq!(roles.len(), 4);
    assert!(roles.contains(&MethodSemanticsAttributes::GETTER));
    assert!(roles.contains(&MethodSemanticsAttributes::ADD_ON));
    assert!(roles.contains(&MethodSemanticsAttributes::REMOVE_ON));
    let associations: Vec<u32> = tables
        .method_semantics
        .iter()
        .map(|row| row.association.encode(CodedIndexType::HasSemantics))
        .collect::<Result<_>>()?;
    assert!(associations.windows(2).all(|pair| pair[0] <= pair[1]));
    Ok(())
}

fn first_row(ty: TypeId) -> u32 {
    ty.index() as u32 + 2
}

/// Nested types get a `NestedClass` row pointing at their enclosing type.
#[test]
fn test_nested_types() -> Result<()> {
    let mut module = module("Nested.dll")?;
    let outer = module.define_type("App", "Outer", TypeAttributes::PUBLIC, None)?;
    let inner = module.define_nested_type(outer, "Inner", TypeAttributes::PUBLIC, None)?;

    let emitted = module.bake()?;
    let tables = &emitted.tables;
    assert_eq!(tables.nested_class.len(), 1);
    assert_eq!(tables.nested_class[0].nested_class, first_row(inner));
    assert_eq!(tables.nested_class[0].enclosing_class, first_row(outer));
    assert_eq!(
        tables.type_def[2].flags & TypeAttributes::VISIBILITY_MASK,
        TypeAttributes::NESTED_PUBLIC
    );
    Ok(())
}

/// Enum literals become `Constant` rows owned by their fields.
#[test]
fn test_enum_with_literals() -> Result<()> {
    let mut module = module("Enums.dll")?;
    let color = module.define_enum("App", "Color", TypeAttributes::PUBLIC, TypeSignature::I4)?;
    module.define_literal(color, "Red", TypeSignature::I4, ConstantValue::I4(1))?;
    module.define_literal(color, "Green", TypeSignature::I4, ConstantValue::I4(2))?;

    let emitted = module.bake()?;
    let tables = &emitted.tables;
    assert_eq!(tables.field.len(), 3);
    assert!(tables.method_def.is_empty());
    assert_eq!(tables.constant.len(), 2);
    assert_eq!(tables.constant[0].parent, CodedIndex::new(TableId::Field, 2));
    assert_eq!(emitted.blob(tables.constant[1].value)?, &[2, 0, 0, 0]);
    Ok(())
}

/// P/Invoke methods carry no body and map to a `ModuleRef`.
#[test]
fn test_pinvoke_method() -> Result<()> {
    let mut module = module("Native.dll")?;
    let ty = module.define_type("App", "NativeMethods", TypeAttributes::PUBLIC, None)?;
    module.define_pinvoke_method(
        ty,
        "GetTickCount",
        "kernel32.dll",
        None,
        STATIC,
        SignatureMethod::static_method(TypeSignature::U4, Vec::new()),
        PInvokeAttributes::CHAR_SET_AUTO | PInvokeAttributes::CALL_CONV_WINAPI,
    )?;

    let emitted = module.bake()?;
    let tables = &emitted.tables;
    assert_eq!(tables.method_def[0].rva, 0);
    assert_eq!(
        tables.impl_map[0].mapping_flags,
        PInvokeAttributes::CHAR_SET_AUTO | PInvokeAttributes::CALL_CONV_WINAPI
    );
    assert_eq!(tables.impl_map.len(), 1);
    assert_eq!(tables.module_ref.len(), 1);
    assert_eq!(tables.impl_map[0].import_scope, 1);
    assert_eq!(emitted.string(tables.impl_map[0].import_name), Some("GetTickCount"));
    Ok(())
}

/// Named field and property arguments survive encode, bake and decode.
#[test]
fn test_custom_attribute_round_trip() -> Result<()> {
    let mut module = module("Attributes.dll")?;
    let ty = module.define_type("App", "Marked", TypeAttributes::PUBLIC, None)?;
    let ctor = MethodTarget::external(
        TypeName::new("Attributes.Core", "App", "NoteAttribute"),
        ".ctor",
        SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::String]),
    );
    let attribute = CustomAttributeBuilder::new(
        ctor,
        vec![CustomAttributeType::String],
        vec![CustomAttributeArgument::string("reviewed")],
    )?
    .named_field("Level", CustomAttributeArgument::I4(3))?
    .named_property("Enabled", CustomAttributeArgument::Bool(true))?;
    let expected = attribute.value().cloned();
    module.set_custom_attribute(ty, attribute)?;

    let emitted = module.bake()?;
    let row = &emitted.tables.custom_attribute[0];
    assert_eq!(row.parent, CodedIndex::new(TableId::TypeDef, 2));
    assert_eq!(row.constructor.tag, TableId::MemberRef);
    assert!(emitted.tables.contains(row.constructor.token));

    let decoded = decode_custom_attribute(emitted.blob(row.value)?, &[CustomAttributeType::String])?;
    assert_eq!(Some(decoded), expected);
    Ok(())
}

/// Assembly level attributes hang off the single `Assembly` row.
#[test]
fn test_assembly_manifest() -> Result<()> {
    let mut assembly = AssemblyBuilder::new(
        AssemblyName::new("Calc", AssemblyVersion::new(1, 2, 3, 4)),
        BuilderConfig::default(),
    );
    let module = assembly.define_module("Calc.dll")?;
    let ty = module.define_type("Calc", "Program", TypeAttributes::PUBLIC, None)?;
    let main = module.define_method(
        ty,
        "Main",
        STATIC,
        SignatureMethod::static_method(TypeSignature::Void, Vec::new()),
    )?;
    module.il_generator(main)?.emit(OpCode::RET)?;
    module.set_entry_point(main)?;

    let title = MethodTarget::external(
        TypeName::core("System.Reflection", "AssemblyTitleAttribute"),
        ".ctor",
        SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::String]),
    );
    assembly.set_custom_attribute(CustomAttributeBuilder::new(
        title,
        vec![CustomAttributeType::String],
        vec![CustomAttributeArgument::string("Calculator")],
    )?)?;

    let emitted = assembly.bake()?;
    let tables = &emitted.tables;
    assert_eq!(tables.assembly.len(), 1);
    assert_eq!(emitted.string(tables.assembly[0].name), Some("Calc"));
    assert_eq!(tables.assembly[0].revision_number, 4);
    assert_eq!(tables.custom_attribute[0].parent, CodedIndex::new(TableId::Assembly, 1));
    assert_eq!(emitted.entry_point, Some(Token::new(0x0600_0001)));
    Ok(())
}

fn build_library() -> Result<EmittedModule> {
    let mut module = module("Library.dll")?;
    viewmodel(&mut module)?;
    let ty = module.define_type("", "T", TypeAttributes::PUBLIC, None)?;
    add_method(&mut module, ty, STATIC)?;
    let color = module.define_enum("App", "Color", TypeAttributes::PUBLIC, TypeSignature::U1)?;
    module.define_literal(color, "Red", TypeSignature::U1, ConstantValue::U1(1))?;
    module.bake()
}

/// Two independently built, identical graphs bake to identical output.
#[test]
fn test_bake_is_deterministic() -> Result<()> {
    let first = build_library()?;
    let second = build_library()?;
    assert_eq!(first, second);
    assert_eq!(first.blobs, second.blobs);
    assert_eq!(first.il, second.il);
    Ok(())
}
