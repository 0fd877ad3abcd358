//! Signature blob encoding.
//!
//! [`SignatureWriter`] is the single place where signature bytes are produced. The free
//! `encode_*` functions wrap it for complete signature values; [`super::SignatureHelper`]
//! drives it later for signatures assembled piece by piece.

use crate::{
    metadata::{
        signatures::{
            CallingConvention, CustomModifier, MemberSignature, PrimitiveKind, SignatureField,
            SignatureLocalVariable, SignatureLocalVariables, SignatureMethod, SignatureMethodSpec,
            SignatureParameter, SignatureProperty, TypeHandle, TypeSignature, CALLING_CONVENTION,
            ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        tables::CodedIndexType,
        token::Token,
    },
    utils::ByteBuffer,
    Error, Result,
};

/// Binds abstract [`TypeHandle`]s to `TypeDef`, `TypeRef` or `TypeSpec` tokens.
///
/// The module builder is the resolver used in practice: it hands out rows for its own types
/// and imports external names as `TypeRef`s on first use.
pub trait TypeResolver {
    /// Produce the token that `handle` is encoded as.
    ///
    /// # Errors
    /// Returns an error if the handle cannot be bound.
    fn resolve_type(&mut self, handle: &TypeHandle) -> Result<Token>;

    /// The primitive `handle` denotes, if it should be encoded as an element type code.
    fn primitive_of(&self, handle: &TypeHandle) -> Option<PrimitiveKind> {
        match handle {
            TypeHandle::Named(name) => name.primitive(),
            _ => None,
        }
    }
}

/// Resolver for handles that are already tokens.
///
/// Useful for signatures built only from primitives and known tokens; anything else is
/// rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl TypeResolver for NullResolver {
    fn resolve_type(&mut self, handle: &TypeHandle) -> Result<Token> {
        match handle {
            TypeHandle::Token(token) => Ok(*token),
            other => Err(Error::NotSupported(format!(
                "Type {:?} requires a module to resolve",
                other
            ))),
        }
    }
}

/// Which counted list a writer is building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountedList {
    None,
    Parameters,
    Locals,
}

/// Eager signature writer.
///
/// The leading header is written on construction. Arguments or locals are appended one at a
/// time, and their count, whose compressed width is only known at the end, is inserted at the
/// recorded position by [`SignatureWriter::finish`].
pub struct SignatureWriter<'r> {
    resolver: &'r mut dyn TypeResolver,
    buffer: ByteBuffer,
    count_position: usize,
    count: u32,
    list: CountedList,
    sentinel: bool,
}

impl<'r> SignatureWriter<'r> {
    fn start(resolver: &'r mut dyn TypeResolver, list: CountedList) -> Self {
        SignatureWriter {
            resolver,
            buffer: ByteBuffer::with_capacity(16),
            count_position: 0,
            count: 0,
            list,
            sentinel: false,
        }
    }

    /// Start a method signature with its convention byte and return type.
    ///
    /// # Errors
    /// Returns an error if the return type cannot be encoded.
    pub fn method(
        resolver: &'r mut dyn TypeResolver,
        convention: u8,
        generic_param_count: u32,
        return_type: &SignatureParameter,
    ) -> Result<Self> {
        let mut writer = Self::start(resolver, CountedList::Parameters);
        writer.buffer.write_u8(convention);
        if convention & CALLING_CONVENTION::GENERIC != 0 {
            writer.buffer.write_compressed_uint(generic_param_count)?;
        }
        writer.count_position = writer.buffer.len();
        writer.write_parameter(return_type)?;
        Ok(writer)
    }

    /// Start a property signature with its type.
    ///
    /// # Errors
    /// Returns an error if the property type cannot be encoded.
    pub fn property(
        resolver: &'r mut dyn TypeResolver,
        has_this: bool,
        modifiers: &[CustomModifier],
        base: &TypeSignature,
    ) -> Result<Self> {
        let mut writer = Self::start(resolver, CountedList::Parameters);
        let mut header = SIGNATURE_HEADER::PROPERTY;
        if has_this {
            header |= CALLING_CONVENTION::HASTHIS;
        }
        writer.buffer.write_u8(header);
        writer.count_position = writer.buffer.len();
        writer.write_modifiers(modifiers)?;
        writer.write_type(base)?;
        Ok(writer)
    }

    /// Start a local variable signature.
    #[must_use]
    pub fn local_vars(resolver: &'r mut dyn TypeResolver) -> Self {
        let mut writer = Self::start(resolver, CountedList::Locals);
        writer.buffer.write_u8(SIGNATURE_HEADER::LOCAL_SIG);
        writer.count_position = writer.buffer.len();
        writer
    }

    /// Write a complete field signature.
    ///
    /// # Errors
    /// Returns an error if the field type cannot be encoded.
    pub fn field(resolver: &'r mut dyn TypeResolver, field: &SignatureField) -> Result<Self> {
        let mut writer = Self::start(resolver, CountedList::None);
        writer.buffer.write_u8(SIGNATURE_HEADER::FIELD);
        writer.write_modifiers(&field.modifiers)?;
        writer.write_type(&field.base)?;
        Ok(writer)
    }

    /// Append a method or property parameter.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] on a local or field signature, or an encoding error.
    pub fn add_argument(&mut self, parameter: &SignatureParameter) -> Result<()> {
        if self.list != CountedList::Parameters {
            return Err(Error::InvalidState(
                "Arguments can only be added to method or property signatures".to_string(),
            ));
        }
        self.write_parameter(parameter)?;
        self.count += 1;
        Ok(())
    }

    /// Append the vararg sentinel; later arguments are the optional ones.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if a sentinel was already written.
    pub fn add_sentinel(&mut self) -> Result<()> {
        if self.sentinel || self.list != CountedList::Parameters {
            return Err(Error::InvalidState(
                "Sentinel already present or not a method signature".to_string(),
            ));
        }
        self.buffer.write_u8(ELEMENT_TYPE::SENTINEL);
        self.sentinel = true;
        Ok(())
    }

    /// Append a local.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] on a non-local signature, or an encoding error.
    pub fn add_local(&mut self, local: &SignatureLocalVariable) -> Result<()> {
        if self.list != CountedList::Locals {
            return Err(Error::InvalidState(
                "Locals can only be added to local variable signatures".to_string(),
            ));
        }
        self.write_modifiers(&local.modifiers)?;
        if local.is_pinned {
            self.buffer.write_u8(ELEMENT_TYPE::PINNED);
        }
        if local.is_byref {
            self.buffer.write_u8(ELEMENT_TYPE::BYREF);
        }
        self.write_type(&local.base)?;
        self.count += 1;
        Ok(())
    }

    /// Insert the count and return the finished blob.
    ///
    /// # Errors
    /// Returns an error if the count does not fit a compressed integer.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.list != CountedList::None {
            self.buffer
                .insert_compressed_uint(self.count_position, self.count)?;
        }
        Ok(self.buffer.into_inner())
    }

    fn write_parameter(&mut self, parameter: &SignatureParameter) -> Result<()> {
        self.write_modifiers(&parameter.modifiers)?;
        if parameter.by_ref {
            self.buffer.write_u8(ELEMENT_TYPE::BYREF);
        }
        self.write_type(&parameter.base)
    }

    fn write_modifiers(&mut self, modifiers: &[CustomModifier]) -> Result<()> {
        for modifier in modifiers {
            self.buffer.write_u8(if modifier.is_required {
                ELEMENT_TYPE::CMOD_REQD
            } else {
                ELEMENT_TYPE::CMOD_OPT
            });
            self.write_type_handle(&modifier.modifier_type)?;
        }
        Ok(())
    }

    fn write_type_handle(&mut self, handle: &TypeHandle) -> Result<()> {
        let token = self.resolver.resolve_type(handle)?;
        let coded = CodedIndexType::TypeDefOrRef.encode(token).map_err(|_| {
            malformed_error!(
                "Token {} cannot be used as a TypeDefOrRef coded index",
                token
            )
        })?;
        self.buffer.write_compressed_uint(coded)
    }

    fn write_type(&mut self, signature: &TypeSignature) -> Result<()> {
        match signature {
            TypeSignature::Void => self.buffer.write_u8(ELEMENT_TYPE::VOID),
            TypeSignature::Boolean => self.buffer.write_u8(ELEMENT_TYPE::BOOLEAN),
            TypeSignature::Char => self.buffer.write_u8(ELEMENT_TYPE::CHAR),
            TypeSignature::I1 => self.buffer.write_u8(ELEMENT_TYPE::I1),
            TypeSignature::U1 => self.buffer.write_u8(ELEMENT_TYPE::U1),
            TypeSignature::I2 => self.buffer.write_u8(ELEMENT_TYPE::I2),
            TypeSignature::U2 => self.buffer.write_u8(ELEMENT_TYPE::U2),
            TypeSignature::I4 => self.buffer.write_u8(ELEMENT_TYPE::I4),
            TypeSignature::U4 => self.buffer.write_u8(ELEMENT_TYPE::U4),
            TypeSignature::I8 => self.buffer.write_u8(ELEMENT_TYPE::I8),
            TypeSignature::U8 => self.buffer.write_u8(ELEMENT_TYPE::U8),
            TypeSignature::R4 => self.buffer.write_u8(ELEMENT_TYPE::R4),
            TypeSignature::R8 => self.buffer.write_u8(ELEMENT_TYPE::R8),
            TypeSignature::I => self.buffer.write_u8(ELEMENT_TYPE::I),
            TypeSignature::U => self.buffer.write_u8(ELEMENT_TYPE::U),
            TypeSignature::String => self.buffer.write_u8(ELEMENT_TYPE::STRING),
            TypeSignature::Object => self.buffer.write_u8(ELEMENT_TYPE::OBJECT),
            TypeSignature::TypedByRef => self.buffer.write_u8(ELEMENT_TYPE::TYPEDBYREF),
            TypeSignature::Ptr(inner) => {
                self.buffer.write_u8(ELEMENT_TYPE::PTR);
                self.write_type(inner)?;
            }
            TypeSignature::ByRef(inner) => {
                self.buffer.write_u8(ELEMENT_TYPE::BYREF);
                self.write_type(inner)?;
            }
            TypeSignature::ValueType(handle) | TypeSignature::Class(handle) => {
                if let Some(primitive) = self.resolver.primitive_of(handle) {
                    self.buffer.write_u8(primitive.element_type());
                } else {
                    self.buffer.write_u8(if matches!(signature, TypeSignature::ValueType(_)) {
                        ELEMENT_TYPE::VALUETYPE
                    } else {
                        ELEMENT_TYPE::CLASS
                    });
                    self.write_type_handle(handle)?;
                }
            }
            TypeSignature::GenericParamType(index) => {
                self.buffer.write_u8(ELEMENT_TYPE::VAR);
                self.buffer.write_compressed_uint(*index)?;
            }
            TypeSignature::GenericParamMethod(index) => {
                self.buffer.write_u8(ELEMENT_TYPE::MVAR);
                self.buffer.write_compressed_uint(*index)?;
            }
            TypeSignature::Array(array) => {
                self.buffer.write_u8(ELEMENT_TYPE::ARRAY);
                self.write_type(&array.base)?;
                self.buffer.write_compressed_uint(array.rank)?;
                self.buffer.write_compressed_uint(array.sizes.len() as u32)?;
                for size in &array.sizes {
                    self.buffer.write_compressed_uint(*size)?;
                }
                self.buffer
                    .write_compressed_uint(array.lower_bounds.len() as u32)?;
                for bound in &array.lower_bounds {
                    self.buffer.write_compressed_int(*bound)?;
                }
            }
            TypeSignature::SzArray(element) => {
                self.buffer.write_u8(ELEMENT_TYPE::SZARRAY);
                self.write_type(element)?;
            }
            TypeSignature::GenericInst(definition, arguments) => {
                self.buffer.write_u8(ELEMENT_TYPE::GENERICINST);
                self.write_type(definition)?;
                self.buffer.write_compressed_uint(arguments.len() as u32)?;
                for argument in arguments {
                    self.write_type(argument)?;
                }
            }
            TypeSignature::FnPtr(method) => {
                self.buffer.write_u8(ELEMENT_TYPE::FNPTR);
                let nested = encode_method_signature(method, &mut *self.resolver)?;
                self.buffer.write_bytes(&nested);
            }
            TypeSignature::Modified(modifiers, inner) => {
                self.write_modifiers(modifiers)?;
                self.write_type(inner)?;
            }
        }
        Ok(())
    }
}

/// The leading byte of a method signature.
///
/// A vararg parameter list forces `VARARG`, generic parameters force `GENERIC`; otherwise the
/// declared convention kind is used.
#[must_use]
pub fn method_convention_byte(signature: &SignatureMethod) -> u8 {
    let mut byte = if !signature.varargs.is_empty() {
        CALLING_CONVENTION::VARARG
    } else if signature.generic_param_count > 0 {
        CALLING_CONVENTION::GENERIC
    } else {
        signature.calling_convention.code()
    };
    if signature.has_this {
        byte |= CALLING_CONVENTION::HASTHIS;
    }
    if signature.explicit_this {
        byte |= CALLING_CONVENTION::EXPLICITTHIS;
    }
    byte
}

/// Encode a method signature.
///
/// # Errors
/// Returns an error if a type handle cannot be resolved or a value is out of range.
pub fn encode_method_signature(
    signature: &SignatureMethod,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    let convention = method_convention_byte(signature);
    if signature.calling_convention == CallingConvention::VarArg
        && signature.generic_param_count > 0
    {
        return Err(Error::NotSupported(
            "Generic methods cannot use the vararg convention".to_string(),
        ));
    }

    let mut writer = SignatureWriter::method(
        resolver,
        convention,
        signature.generic_param_count,
        &signature.return_type,
    )?;
    for parameter in &signature.params {
        writer.add_argument(parameter)?;
    }
    if !signature.varargs.is_empty() {
        writer.add_sentinel()?;
        for parameter in &signature.varargs {
            writer.add_argument(parameter)?;
        }
    }
    writer.finish()
}

/// Encode a field signature.
///
/// # Errors
/// Returns an error if the field type cannot be encoded.
pub fn encode_field_signature(
    signature: &SignatureField,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    SignatureWriter::field(resolver, signature)?.finish()
}

/// Encode a property signature.
///
/// # Errors
/// Returns an error if a type cannot be encoded.
pub fn encode_property_signature(
    signature: &SignatureProperty,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    let mut writer = SignatureWriter::property(
        resolver,
        signature.has_this,
        &signature.modifiers,
        &signature.base,
    )?;
    for parameter in &signature.params {
        writer.add_argument(parameter)?;
    }
    writer.finish()
}

/// Encode a local variable signature.
///
/// # Errors
/// Returns an error if a local type cannot be encoded.
pub fn encode_local_var_signature(
    signature: &SignatureLocalVariables,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    let mut writer = SignatureWriter::local_vars(resolver);
    for local in &signature.locals {
        writer.add_local(local)?;
    }
    writer.finish()
}

/// Encode a `TypeSpec` blob: the bare type without any header.
///
/// # Errors
/// Returns an error if the type cannot be encoded.
pub fn encode_typespec_signature(
    signature: &TypeSignature,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    let mut writer = SignatureWriter::start(resolver, CountedList::None);
    writer.write_type(signature)?;
    writer.finish()
}

/// Encode a `MethodSpec` instantiation.
///
/// # Errors
/// Returns an error if an argument type cannot be encoded.
pub fn encode_method_spec_signature(
    signature: &SignatureMethodSpec,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    let mut writer = SignatureWriter::start(resolver, CountedList::None);
    writer.buffer.write_u8(SIGNATURE_HEADER::GENERIC_INST);
    writer
        .buffer
        .write_compressed_uint(signature.generic_args.len() as u32)?;
    for argument in &signature.generic_args {
        writer.write_type(argument)?;
    }
    writer.finish()
}

/// Encode the signature of a `MemberRef`.
///
/// # Errors
/// Returns an error if the signature cannot be encoded.
pub fn encode_member_signature(
    signature: &MemberSignature,
    resolver: &mut dyn TypeResolver,
) -> Result<Vec<u8>> {
    match signature {
        MemberSignature::Method(method) => encode_method_signature(method, resolver),
        MemberSignature::Field(field) => encode_field_signature(field, resolver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        signatures::{SignatureArray, TypeName},
        tables::TableId,
    };

    struct FixedResolver;

    impl TypeResolver for FixedResolver {
        fn resolve_type(&mut self, handle: &TypeHandle) -> Result<Token> {
            match handle {
                TypeHandle::Token(token) => Ok(*token),
                TypeHandle::Named(_) => Ok(Token::from_parts(TableId::TypeRef, 3)),
                TypeHandle::Defined(_) => Ok(Token::from_parts(TableId::TypeDef, 2)),
            }
        }
    }

    #[test]
    fn instance_method() -> Result<()> {
        let add = SignatureMethod::instance(
            TypeSignature::I4,
            vec![TypeSignature::I4, TypeSignature::I4],
        );
        assert_eq!(
            encode_method_signature(&add, &mut NullResolver)?,
            [0x20, 0x02, 0x08, 0x08, 0x08]
        );
        Ok(())
    }

    #[test]
    fn generic_method() -> Result<()> {
        let method = SignatureMethod::static_method(
            TypeSignature::GenericParamMethod(0),
            vec![TypeSignature::GenericParamMethod(0)],
        )
        .with_generic_params(1);
        assert_eq!(
            encode_method_signature(&method, &mut NullResolver)?,
            [0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00]
        );
        Ok(())
    }

    #[test]
    fn vararg_call_site() -> Result<()> {
        let mut method = SignatureMethod::static_method(TypeSignature::Void, vec![TypeSignature::String]);
        method.varargs.push(SignatureParameter::new(TypeSignature::I4));
        assert_eq!(
            encode_method_signature(&method, &mut NullResolver)?,
            [0x05, 0x02, 0x01, 0x0E, 0x41, 0x08]
        );
        Ok(())
    }

    #[test]
    fn count_wider_than_one_byte() -> Result<()> {
        let params = vec![TypeSignature::I4; 200];
        let method = SignatureMethod::static_method(TypeSignature::Void, params);
        let blob = encode_method_signature(&method, &mut NullResolver)?;
        assert_eq!(&blob[..4], &[0x00, 0x80, 0xC8, 0x01]);
        assert_eq!(blob.len(), 4 + 200);
        Ok(())
    }

    #[test]
    fn core_names_become_primitives() -> Result<()> {
        let field = SignatureField::new(TypeSignature::core_value_type("System", "Int32"));
        assert_eq!(encode_field_signature(&field, &mut FixedResolver)?, [0x06, 0x08]);

        let field = SignatureField::new(TypeSignature::core_class("System", "Exception"));
        assert_eq!(
            encode_field_signature(&field, &mut FixedResolver)?,
            [0x06, 0x12, 0x0D]
        );
        Ok(())
    }

    #[test]
    fn modifiers_and_byref() -> Result<()> {
        let mut param = SignatureParameter::by_ref(TypeSignature::I4);
        param
            .modifiers
            .push(CustomModifier::required(TypeName::core("System.Runtime.InteropServices", "InAttribute")));
        let mut method = SignatureMethod::static_method(TypeSignature::Void, vec![]);
        method.params.push(param);
        assert_eq!(
            encode_method_signature(&method, &mut FixedResolver)?,
            [0x00, 0x01, 0x01, 0x1F, 0x0D, 0x10, 0x08]
        );
        Ok(())
    }

    #[test]
    fn arrays_and_generics() -> Result<()> {
        let array = TypeSignature::Array(SignatureArray {
            base: Box::new(TypeSignature::I4),
            rank: 2,
            sizes: vec![3],
            lower_bounds: vec![0, -1],
        });
        assert_eq!(
            encode_typespec_signature(&array, &mut NullResolver)?,
            [0x14, 0x08, 0x02, 0x01, 0x03, 0x02, 0x00, 0x7F]
        );

        let list = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(TypeHandle::Token(Token::from_parts(
                TableId::TypeRef,
                1,
            )))),
            vec![TypeSignature::String],
        );
        assert_eq!(
            encode_typespec_signature(&list, &mut NullResolver)?,
            [0x15, 0x12, 0x05, 0x01, 0x0E]
        );
        Ok(())
    }

    #[test]
    fn locals_and_properties() -> Result<()> {
        let mut pinned = SignatureLocalVariable::new(TypeSignature::ByRef(Box::new(TypeSignature::U1)));
        pinned.is_pinned = true;
        let locals = SignatureLocalVariables {
            locals: vec![SignatureLocalVariable::new(TypeSignature::String), pinned],
        };
        assert_eq!(
            encode_local_var_signature(&locals, &mut NullResolver)?,
            [0x07, 0x02, 0x0E, 0x45, 0x10, 0x05]
        );

        let property = SignatureProperty {
            has_this: true,
            modifiers: vec![],
            base: TypeSignature::String,
            params: vec![SignatureParameter::new(TypeSignature::I4)],
        };
        assert_eq!(
            encode_property_signature(&property, &mut NullResolver)?,
            [0x28, 0x01, 0x0E, 0x08]
        );
        Ok(())
    }

    #[test]
    fn method_spec() -> Result<()> {
        let spec = SignatureMethodSpec {
            generic_args: vec![TypeSignature::I4, TypeSignature::Object],
        };
        assert_eq!(
            encode_method_spec_signature(&spec, &mut NullResolver)?,
            [0x0A, 0x02, 0x08, 0x1C]
        );
        Ok(())
    }

    #[test]
    fn unresolvable_handles_fail() {
        let field = SignatureField::new(TypeSignature::core_class("System", "Exception"));
        assert!(matches!(
            encode_field_signature(&field, &mut NullResolver),
            Err(Error::NotSupported(_))
        ));
    }
}
