//! Signature blob decoding.
//!
//! Decoded type references are always [`TypeHandle::Token`]s since a blob carries no names.
//! Primitive element codes decode to their [`TypeSignature`] primitive variants.

use crate::{
    metadata::signatures::{
        CallingConvention, CustomModifier, SignatureArray, SignatureField,
        SignatureLocalVariable, SignatureLocalVariables, SignatureMethod, SignatureMethodSpec,
        SignatureParameter, SignatureProperty, TypeHandle, TypeSignature, CALLING_CONVENTION,
        ELEMENT_TYPE, SIGNATURE_HEADER,
    },
    utils::Parser,
    Result,
};

/// Nesting limit for recursive type shapes.
const MAX_RECURSION_DEPTH: usize = 50;

/// Decoder over a single signature blob.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a decoder over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    fn parse_type(&mut self) -> Result<TypeSignature> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(malformed_error!(
                "Signature nesting exceeds {} levels",
                MAX_RECURSION_DEPTH
            ));
        }
        let result = self.parse_type_inner();
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        let code = self.parser.read_le::<u8>()?;
        let signature = match code {
            ELEMENT_TYPE::VOID => TypeSignature::Void,
            ELEMENT_TYPE::BOOLEAN => TypeSignature::Boolean,
            ELEMENT_TYPE::CHAR => TypeSignature::Char,
            ELEMENT_TYPE::I1 => TypeSignature::I1,
            ELEMENT_TYPE::U1 => TypeSignature::U1,
            ELEMENT_TYPE::I2 => TypeSignature::I2,
            ELEMENT_TYPE::U2 => TypeSignature::U2,
            ELEMENT_TYPE::I4 => TypeSignature::I4,
            ELEMENT_TYPE::U4 => TypeSignature::U4,
            ELEMENT_TYPE::I8 => TypeSignature::I8,
            ELEMENT_TYPE::U8 => TypeSignature::U8,
            ELEMENT_TYPE::R4 => TypeSignature::R4,
            ELEMENT_TYPE::R8 => TypeSignature::R8,
            ELEMENT_TYPE::I => TypeSignature::I,
            ELEMENT_TYPE::U => TypeSignature::U,
            ELEMENT_TYPE::STRING => TypeSignature::String,
            ELEMENT_TYPE::OBJECT => TypeSignature::Object,
            ELEMENT_TYPE::TYPEDBYREF => TypeSignature::TypedByRef,
            ELEMENT_TYPE::PTR => TypeSignature::Ptr(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::BYREF => TypeSignature::ByRef(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::VALUETYPE => {
                TypeSignature::ValueType(TypeHandle::Token(self.parser.read_compressed_token()?))
            }
            ELEMENT_TYPE::CLASS => {
                TypeSignature::Class(TypeHandle::Token(self.parser.read_compressed_token()?))
            }
            ELEMENT_TYPE::VAR => {
                TypeSignature::GenericParamType(self.parser.read_compressed_uint()?)
            }
            ELEMENT_TYPE::MVAR => {
                TypeSignature::GenericParamMethod(self.parser.read_compressed_uint()?)
            }
            ELEMENT_TYPE::ARRAY => {
                let base = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;
                let size_count = self.parser.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(size_count.min(32) as usize);
                for _ in 0..size_count {
                    sizes.push(self.parser.read_compressed_uint()?);
                }
                let bound_count = self.parser.read_compressed_uint()?;
                let mut lower_bounds = Vec::with_capacity(bound_count.min(32) as usize);
                for _ in 0..bound_count {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }
                TypeSignature::Array(SignatureArray {
                    base: Box::new(base),
                    rank,
                    sizes,
                    lower_bounds,
                })
            }
            ELEMENT_TYPE::SZARRAY => TypeSignature::SzArray(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::GENERICINST => {
                let definition = self.parse_type()?;
                let count = self.parser.read_compressed_uint()?;
                let mut arguments = Vec::with_capacity(count.min(32) as usize);
                for _ in 0..count {
                    arguments.push(self.parse_type()?);
                }
                TypeSignature::GenericInst(Box::new(definition), arguments)
            }
            ELEMENT_TYPE::FNPTR => TypeSignature::FnPtr(Box::new(self.parse_method_signature()?)),
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                let mut modifiers = vec![CustomModifier {
                    is_required: code == ELEMENT_TYPE::CMOD_REQD,
                    modifier_type: TypeHandle::Token(self.parser.read_compressed_token()?),
                }];
                modifiers.extend(self.parse_modifiers()?);
                TypeSignature::Modified(modifiers, Box::new(self.parse_type()?))
            }
            other => {
                return Err(malformed_error!(
                    "Unsupported element type 0x{:02X} at offset {}",
                    other,
                    self.parser.pos() - 1
                ))
            }
        };
        Ok(signature)
    }

    fn parse_modifiers(&mut self) -> Result<Vec<CustomModifier>> {
        let mut modifiers = Vec::new();
        while self.parser.has_more_data() {
            let code = self.parser.peek_byte()?;
            if code != ELEMENT_TYPE::CMOD_REQD && code != ELEMENT_TYPE::CMOD_OPT {
                break;
            }
            self.parser.advance_by(1)?;
            modifiers.push(CustomModifier {
                is_required: code == ELEMENT_TYPE::CMOD_REQD,
                modifier_type: TypeHandle::Token(self.parser.read_compressed_token()?),
            });
        }
        Ok(modifiers)
    }

    fn parse_param(&mut self) -> Result<SignatureParameter> {
        let modifiers = self.parse_modifiers()?;
        let by_ref = self.parser.peek_byte()? == ELEMENT_TYPE::BYREF;
        if by_ref {
            self.parser.advance_by(1)?;
        }
        Ok(SignatureParameter {
            modifiers,
            by_ref,
            base: self.parse_type()?,
        })
    }

    /// Decode a method signature.
    ///
    /// # Errors
    /// Returns an error if the blob is truncated or malformed.
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let convention = self.parser.read_le::<u8>()?;
        let kind = convention & CALLING_CONVENTION::KIND_MASK;
        let generic = convention & CALLING_CONVENTION::GENERIC != 0;
        let calling_convention = if generic {
            CallingConvention::Default
        } else {
            CallingConvention::from_code(kind)
                .ok_or_else(|| malformed_error!("Invalid calling convention 0x{:02X}", convention))?
        };

        let generic_param_count = if generic {
            self.parser.read_compressed_uint()?
        } else {
            0
        };
        let count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_param()?;

        let mut params = Vec::with_capacity(count.min(64) as usize);
        let mut varargs = Vec::new();
        let mut after_sentinel = false;
        for _ in 0..count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.parser.advance_by(1)?;
                after_sentinel = true;
            }
            let param = self.parse_param()?;
            if after_sentinel {
                varargs.push(param);
            } else {
                params.push(param);
            }
        }

        Ok(SignatureMethod {
            has_this: convention & CALLING_CONVENTION::HASTHIS != 0,
            explicit_this: convention & CALLING_CONVENTION::EXPLICITTHIS != 0,
            calling_convention,
            generic_param_count,
            return_type,
            params,
            varargs,
        })
    }

    /// Decode a field signature.
    ///
    /// # Errors
    /// Returns an error if the header is not `FIELD` or the blob is malformed.
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let header = self.parser.read_le::<u8>()?;
        if header != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!("Expected field signature, found 0x{:02X}", header));
        }
        Ok(SignatureField {
            modifiers: self.parse_modifiers()?,
            base: self.parse_type()?,
        })
    }

    /// Decode a property signature.
    ///
    /// # Errors
    /// Returns an error if the header is not `PROPERTY` or the blob is malformed.
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let header = self.parser.read_le::<u8>()?;
        if header & !CALLING_CONVENTION::HASTHIS != SIGNATURE_HEADER::PROPERTY {
            return Err(malformed_error!("Expected property signature, found 0x{:02X}", header));
        }
        let count = self.parser.read_compressed_uint()?;
        let modifiers = self.parse_modifiers()?;
        let base = self.parse_type()?;
        let mut params = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            params.push(self.parse_param()?);
        }
        Ok(SignatureProperty {
            has_this: header & CALLING_CONVENTION::HASTHIS != 0,
            modifiers,
            base,
            params,
        })
    }

    /// Decode a local variable signature.
    ///
    /// # Errors
    /// Returns an error if the header is not `LOCAL_SIG` or the blob is malformed.
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let header = self.parser.read_le::<u8>()?;
        if header != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!("Expected local signature, found 0x{:02X}", header));
        }
        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            let modifiers = self.parse_modifiers()?;
            let is_pinned = self.parser.peek_byte()? == ELEMENT_TYPE::PINNED;
            if is_pinned {
                self.parser.advance_by(1)?;
            }
            let is_byref = self.parser.peek_byte()? == ELEMENT_TYPE::BYREF;
            if is_byref {
                self.parser.advance_by(1)?;
            }
            locals.push(SignatureLocalVariable {
                modifiers,
                is_byref,
                is_pinned,
                base: self.parse_type()?,
            });
        }
        Ok(SignatureLocalVariables { locals })
    }

    /// Decode a `TypeSpec` blob.
    ///
    /// # Errors
    /// Returns an error if the blob is malformed.
    pub fn parse_type_spec_signature(&mut self) -> Result<TypeSignature> {
        self.parse_type()
    }

    /// Decode a `MethodSpec` instantiation.
    ///
    /// # Errors
    /// Returns an error if the header is not `GENERIC_INST` or the blob is malformed.
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        let header = self.parser.read_le::<u8>()?;
        if header != SIGNATURE_HEADER::GENERIC_INST {
            return Err(malformed_error!("Expected method spec, found 0x{:02X}", header));
        }
        let count = self.parser.read_compressed_uint()?;
        let mut generic_args = Vec::with_capacity(count.min(32) as usize);
        for _ in 0..count {
            generic_args.push(self.parse_type()?);
        }
        Ok(SignatureMethodSpec { generic_args })
    }
}

/// Decode a method signature blob.
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Decode a field signature blob.
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Decode a property signature blob.
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Decode a local variable signature blob.
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Decode a `TypeSpec` blob.
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_type_spec_signature(data: &[u8]) -> Result<TypeSignature> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Decode a `MethodSpec` instantiation blob.
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{tables::TableId, token::Token};

    #[test]
    fn add_signature() -> Result<()> {
        let method = parse_method_signature(&[0x20, 0x02, 0x08, 0x08, 0x08])?;
        assert!(method.has_this);
        assert_eq!(method.params.len(), 2);
        assert_eq!(method.return_type.base, TypeSignature::I4);
        assert!(method.params.iter().all(|p| p.base == TypeSignature::I4));
        Ok(())
    }

    #[test]
    fn varargs_split_at_sentinel() -> Result<()> {
        let method = parse_method_signature(&[0x05, 0x02, 0x01, 0x0E, 0x41, 0x08])?;
        assert_eq!(method.calling_convention, CallingConvention::VarArg);
        assert_eq!(method.params.len(), 1);
        assert_eq!(method.varargs.len(), 1);
        assert_eq!(method.varargs[0].base, TypeSignature::I4);
        Ok(())
    }

    #[test]
    fn class_tokens() -> Result<()> {
        let field = parse_field_signature(&[0x06, 0x12, 0x0D])?;
        assert_eq!(
            field.base,
            TypeSignature::Class(TypeHandle::Token(Token::from_parts(TableId::TypeRef, 3)))
        );
        Ok(())
    }

    #[test]
    fn locals() -> Result<()> {
        let locals = parse_local_var_signature(&[0x07, 0x02, 0x0E, 0x45, 0x10, 0x05])?;
        assert_eq!(locals.locals.len(), 2);
        assert!(locals.locals[1].is_pinned);
        assert!(locals.locals[1].is_byref);
        assert_eq!(locals.locals[1].base, TypeSignature::U1);
        Ok(())
    }

    #[test]
    fn truncated_and_invalid_blobs() {
        assert!(parse_method_signature(&[0x20, 0x02, 0x08]).is_err());
        assert!(parse_field_signature(&[0x07, 0x08]).is_err());
        assert!(parse_type_spec_signature(&[0x17]).is_err());
    }
}
