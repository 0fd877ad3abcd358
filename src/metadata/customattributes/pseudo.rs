//! Pseudo-custom attributes.
//!
//! A handful of attributes are never stored as `CustomAttribute` rows. Applying them sets
//! flag bits or adds rows to structural tables instead (ECMA-335 II.21.2.1). Recognition is by
//! the namespace and name of the constructor's declaring type.

use crate::{
    metadata::{
        customattributes::{CustomAttributeArgument, CustomAttributeValue, MarshalSpec},
        tables::attributes::{MethodImplAttributes, PInvokeAttributes, TypeAttributes},
    },
    Error, Result,
};

/// A recognized pseudo-custom attribute and the structural change it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoAttribute {
    /// `StructLayoutAttribute`: layout and string format bits plus an optional `ClassLayout` row
    StructLayout {
        /// `TypeAttributes` layout bits
        layout: u32,
        /// `TypeAttributes` string format bits
        string_format: u32,
        /// Field alignment, if given
        pack: Option<u16>,
        /// Total size, if given
        size: Option<u32>,
    },
    /// `FieldOffsetAttribute`: a `FieldLayout` row
    FieldOffset(u32),
    /// `MarshalAsAttribute`: a `FieldMarshal` row
    MarshalAs(MarshalSpec),
    /// `DllImportAttribute`: an `ImplMap` row
    DllImport {
        /// Native library name, becomes a `ModuleRef`
        library: String,
        /// Native entry point, `None` to use the method name
        entry_point: Option<String>,
        /// `PInvokeAttributes` bits
        flags: u16,
        /// Sets `PreserveSig` on the method
        preserve_sig: bool,
    },
    /// `MethodImplAttribute`: implementation flag bits
    MethodImpl(u16),
    /// `SpecialNameAttribute`
    SpecialName,
    /// `SerializableAttribute`
    Serializable,
    /// `NonSerializedAttribute`
    NonSerialized,
    /// `ComImportAttribute`
    ComImport,
    /// `PreserveSigAttribute`
    PreserveSig,
    /// `InAttribute`
    In,
    /// `OutAttribute`
    Out,
    /// `OptionalAttribute`
    Optional,
}

const INTEROP: &str = "System.Runtime.InteropServices";
const COMPILER: &str = "System.Runtime.CompilerServices";

impl PseudoAttribute {
    /// Recognize the attribute whose constructor is declared on `namespace.name`.
    ///
    /// Returns `Ok(None)` for ordinary attributes.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if a pseudo-attribute is missing a required argument.
    pub fn recognize(
        namespace: &str,
        name: &str,
        value: &CustomAttributeValue,
    ) -> Result<Option<PseudoAttribute>> {
        let attribute = match (namespace, name) {
            (INTEROP, "StructLayoutAttribute") => Self::struct_layout(value)?,
            (INTEROP, "FieldOffsetAttribute") => {
                let offset = first_integer(value, name)?;
                PseudoAttribute::FieldOffset(u32::try_from(offset).map_err(|_| {
                    Error::NotSupported(format!("Invalid field offset {}", offset))
                })?)
            }
            (INTEROP, "MarshalAsAttribute") => {
                PseudoAttribute::MarshalAs(MarshalSpec::from_attribute(value)?)
            }
            (INTEROP, "DllImportAttribute") => Self::dll_import(value)?,
            (INTEROP, "ComImportAttribute") => PseudoAttribute::ComImport,
            (INTEROP, "PreserveSigAttribute") => PseudoAttribute::PreserveSig,
            (INTEROP, "InAttribute") => PseudoAttribute::In,
            (INTEROP, "OutAttribute") => PseudoAttribute::Out,
            (INTEROP, "OptionalAttribute") => PseudoAttribute::Optional,
            (COMPILER, "MethodImplAttribute") => {
                let options = match value.fixed_args.first() {
                    Some(arg) => arg.as_i64().unwrap_or(0),
                    None => 0,
                };
                let code_type = value
                    .named("MethodCodeType")
                    .and_then(CustomAttributeArgument::as_i64)
                    .unwrap_or(0);
                PseudoAttribute::MethodImpl(((options | code_type) & 0xFFFF) as u16)
            }
            (COMPILER, "SpecialNameAttribute") => PseudoAttribute::SpecialName,
            ("System", "SerializableAttribute") => PseudoAttribute::Serializable,
            ("System", "NonSerializedAttribute") => PseudoAttribute::NonSerialized,
            _ => return Ok(None),
        };
        Ok(Some(attribute))
    }

    fn struct_layout(value: &CustomAttributeValue) -> Result<PseudoAttribute> {
        let layout = match first_integer(value, "StructLayoutAttribute")? {
            0 => TypeAttributes::SEQUENTIAL_LAYOUT,
            2 => TypeAttributes::EXPLICIT_LAYOUT,
            3 => TypeAttributes::AUTO_LAYOUT,
            other => {
                return Err(Error::NotSupported(format!("Invalid LayoutKind {}", other)));
            }
        };
        let string_format = match named_integer(value, "CharSet") {
            Some(3) => TypeAttributes::UNICODE_CLASS,
            Some(4) => TypeAttributes::AUTO_CLASS,
            _ => TypeAttributes::ANSI_CLASS,
        };
        Ok(PseudoAttribute::StructLayout {
            layout,
            string_format,
            pack: named_integer(value, "Pack").and_then(|v| u16::try_from(v).ok()),
            size: named_integer(value, "Size").and_then(|v| u32::try_from(v).ok()),
        })
    }

    fn dll_import(value: &CustomAttributeValue) -> Result<PseudoAttribute> {
        let library = value
            .fixed_args
            .first()
            .and_then(CustomAttributeArgument::as_str)
            .ok_or_else(|| Error::NotSupported("DllImport requires a library name".to_string()))?
            .to_string();

        let mut flags = match named_integer(value, "CallingConvention").unwrap_or(1) {
            2 => PInvokeAttributes::CALL_CONV_CDECL,
            3 => PInvokeAttributes::CALL_CONV_STDCALL,
            4 => PInvokeAttributes::CALL_CONV_THISCALL,
            5 => PInvokeAttributes::CALL_CONV_FASTCALL,
            _ => PInvokeAttributes::CALL_CONV_WINAPI,
        };
        flags |= match named_integer(value, "CharSet") {
            Some(2) => PInvokeAttributes::CHAR_SET_ANSI,
            Some(3) => PInvokeAttributes::CHAR_SET_UNICODE,
            Some(4) => PInvokeAttributes::CHAR_SET_AUTO,
            _ => 0,
        };
        if named_bool(value, "SetLastError") == Some(true) {
            flags |= PInvokeAttributes::SUPPORTS_LAST_ERROR;
        }
        if named_bool(value, "ExactSpelling") == Some(true) {
            flags |= PInvokeAttributes::NO_MANGLE;
        }
        match named_bool(value, "BestFitMapping") {
            Some(true) => flags |= PInvokeAttributes::BEST_FIT_ENABLED,
            Some(false) => flags |= PInvokeAttributes::BEST_FIT_DISABLED,
            None => {}
        }
        match named_bool(value, "ThrowOnUnmappableChar") {
            Some(true) => flags |= PInvokeAttributes::THROW_ON_UNMAPPABLE_ENABLED,
            Some(false) => flags |= PInvokeAttributes::THROW_ON_UNMAPPABLE_DISABLED,
            None => {}
        }

        Ok(PseudoAttribute::DllImport {
            library,
            entry_point: value
                .named("EntryPoint")
                .and_then(CustomAttributeArgument::as_str)
                .map(str::to_string),
            flags,
            preserve_sig: named_bool(value, "PreserveSig").unwrap_or(true),
        })
    }

    /// `MethodImplAttributes` bits this attribute contributes to a method, if any.
    #[must_use]
    pub fn method_impl_flags(&self) -> Option<u16> {
        match self {
            PseudoAttribute::MethodImpl(flags) => Some(*flags),
            PseudoAttribute::PreserveSig => Some(MethodImplAttributes::PRESERVE_SIG),
            PseudoAttribute::DllImport {
                preserve_sig: true, ..
            } => Some(MethodImplAttributes::PRESERVE_SIG),
            _ => None,
        }
    }
}

fn first_integer(value: &CustomAttributeValue, attribute: &str) -> Result<i64> {
    value
        .fixed_args
        .first()
        .and_then(CustomAttributeArgument::as_i64)
        .ok_or_else(|| Error::NotSupported(format!("{} requires an integer argument", attribute)))
}

fn named_integer(value: &CustomAttributeValue, name: &str) -> Option<i64> {
    value.named(name).and_then(CustomAttributeArgument::as_i64)
}

fn named_bool(value: &CustomAttributeValue, name: &str) -> Option<bool> {
    value.named(name).and_then(CustomAttributeArgument::as_bool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::customattributes::CustomAttributeNamedArgument;

    fn named(name: &str, value: CustomAttributeArgument) -> CustomAttributeNamedArgument {
        CustomAttributeNamedArgument {
            is_field: true,
            name: name.to_string(),
            arg_type: value.attribute_type().unwrap(),
            value,
        }
    }

    #[test]
    fn ordinary_attributes_are_not_recognized() -> Result<()> {
        let value = CustomAttributeValue::default();
        assert_eq!(PseudoAttribute::recognize("System", "ObsoleteAttribute", &value)?, None);
        Ok(())
    }

    #[test]
    fn struct_layout() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::I2(2)],
            named_args: vec![
                named("Pack", CustomAttributeArgument::I4(1)),
                named("CharSet", CustomAttributeArgument::I4(3)),
            ],
        };
        assert_eq!(
            PseudoAttribute::recognize(INTEROP, "StructLayoutAttribute", &value)?,
            Some(PseudoAttribute::StructLayout {
                layout: TypeAttributes::EXPLICIT_LAYOUT,
                string_format: TypeAttributes::UNICODE_CLASS,
                pack: Some(1),
                size: None,
            })
        );
        Ok(())
    }

    #[test]
    fn dll_import_flags() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::string("user32.dll")],
            named_args: vec![
                named("SetLastError", CustomAttributeArgument::Bool(true)),
                named("CallingConvention", CustomAttributeArgument::I4(2)),
                named("EntryPoint", CustomAttributeArgument::string("MessageBoxW")),
            ],
        };
        let Some(PseudoAttribute::DllImport {
            library,
            entry_point,
            flags,
            preserve_sig,
        }) = PseudoAttribute::recognize(INTEROP, "DllImportAttribute", &value)?
        else {
            panic!("DllImport not recognized");
        };
        assert_eq!(library, "user32.dll");
        assert_eq!(entry_point.as_deref(), Some("MessageBoxW"));
        assert_eq!(
            flags,
            PInvokeAttributes::CALL_CONV_CDECL | PInvokeAttributes::SUPPORTS_LAST_ERROR
        );
        assert!(preserve_sig);
        Ok(())
    }

    #[test]
    fn method_impl_and_markers() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::I2(0x08)],
            named_args: vec![],
        };
        let attribute = PseudoAttribute::recognize(COMPILER, "MethodImplAttribute", &value)?;
        assert_eq!(attribute, Some(PseudoAttribute::MethodImpl(0x08)));

        let empty = CustomAttributeValue::default();
        assert_eq!(
            PseudoAttribute::recognize(INTEROP, "OutAttribute", &empty)?,
            Some(PseudoAttribute::Out)
        );
        assert!(PseudoAttribute::recognize(INTEROP, "FieldOffsetAttribute", &empty).is_err());
        Ok(())
    }
}
