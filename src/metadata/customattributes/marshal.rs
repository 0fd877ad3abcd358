//! Marshalling descriptors for the `FieldMarshal` table (ECMA-335 II.23.4).

use crate::{
    metadata::customattributes::{CustomAttributeArgument, CustomAttributeValue},
    utils::ByteBuffer,
    Error, Result,
};

#[allow(non_snake_case)]
/// Native type codes used in marshalling descriptors; identical to `UnmanagedType` values.
pub mod NATIVE_TYPE {
    /// 4-byte boolean
    pub const BOOLEAN: u8 = 0x02;
    /// Signed 8-bit integer
    pub const I1: u8 = 0x03;
    /// Unsigned 8-bit integer
    pub const U1: u8 = 0x04;
    /// Signed 16-bit integer
    pub const I2: u8 = 0x05;
    /// Unsigned 16-bit integer
    pub const U2: u8 = 0x06;
    /// Signed 32-bit integer
    pub const I4: u8 = 0x07;
    /// Unsigned 32-bit integer
    pub const U4: u8 = 0x08;
    /// Signed 64-bit integer
    pub const I8: u8 = 0x09;
    /// Unsigned 64-bit integer
    pub const U8: u8 = 0x0a;
    /// 32-bit float
    pub const R4: u8 = 0x0b;
    /// 64-bit float
    pub const R8: u8 = 0x0c;
    /// COM `BSTR`
    pub const BSTR: u8 = 0x13;
    /// ANSI string pointer
    pub const LPSTR: u8 = 0x14;
    /// UTF-16 string pointer
    pub const LPWSTR: u8 = 0x15;
    /// Platform string pointer
    pub const LPTSTR: u8 = 0x16;
    /// Fixed length in-line string
    pub const FIXEDSYSSTRING: u8 = 0x17;
    /// `IUnknown` pointer
    pub const IUNKNOWN: u8 = 0x19;
    /// `IDispatch` pointer
    pub const IDISPATCH: u8 = 0x1a;
    /// Native structure
    pub const STRUCT: u8 = 0x1b;
    /// COM interface
    pub const INTERFACE: u8 = 0x1c;
    /// COM `SAFEARRAY`
    pub const SAFEARRAY: u8 = 0x1d;
    /// Fixed length in-line array
    pub const FIXEDARRAY: u8 = 0x1e;
    /// Native signed integer
    pub const INT: u8 = 0x1f;
    /// Native unsigned integer
    pub const UINT: u8 = 0x20;
    /// `VARIANT_BOOL`
    pub const VARIANTBOOL: u8 = 0x25;
    /// Function pointer
    pub const FUNC: u8 = 0x26;
    /// Marshal as any type
    pub const ASANY: u8 = 0x28;
    /// Array pointer with size information
    pub const ARRAY: u8 = 0x2a;
    /// Pointer to a structure
    pub const LPSTRUCT: u8 = 0x2b;
    /// User supplied marshaler
    pub const CUSTOMMARSHALER: u8 = 0x2c;
    /// HRESULT
    pub const ERROR: u8 = 0x2d;
    /// UTF-8 string pointer
    pub const LPUTF8STR: u8 = 0x30;
    /// No element type specified
    pub const MAX: u8 = 0x50;
}

/// A marshalling descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalSpec {
    /// A native type without parameters
    Simple(u8),
    /// In-line string of `size` characters
    FixedString {
        /// Character count
        size: u32,
    },
    /// In-line array of `size` elements
    FixedArray {
        /// Element count
        size: u32,
        /// Element native type
        element: Option<u8>,
    },
    /// Pointer to an array
    Array {
        /// Element native type
        element: Option<u8>,
        /// Parameter holding the element count
        size_param_index: Option<u16>,
        /// Constant element count
        size_const: Option<u32>,
    },
    /// COM safe array
    SafeArray {
        /// `VARENUM` element type
        element: Option<u32>,
    },
    /// User supplied marshaler
    Custom {
        /// Marshaler type name
        marshaler: String,
        /// Cookie passed to the marshaler
        cookie: String,
    },
}

impl MarshalSpec {
    /// Build a descriptor from a `MarshalAsAttribute` value.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the unmanaged type argument is missing or invalid.
    pub fn from_attribute(value: &CustomAttributeValue) -> Result<MarshalSpec> {
        let native = value
            .fixed_args
            .first()
            .and_then(CustomAttributeArgument::as_i64)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| {
                Error::NotSupported("MarshalAs requires an UnmanagedType argument".to_string())
            })?;

        let named_u32 = |name: &str| -> Option<u32> {
            value
                .named(name)
                .and_then(CustomAttributeArgument::as_i64)
                .and_then(|v| u32::try_from(v).ok())
        };
        let element = named_u32("ArraySubType").and_then(|v| u8::try_from(v).ok());

        Ok(match native {
            NATIVE_TYPE::FIXEDSYSSTRING => MarshalSpec::FixedString {
                size: named_u32("SizeConst").unwrap_or(0),
            },
            NATIVE_TYPE::FIXEDARRAY => MarshalSpec::FixedArray {
                size: named_u32("SizeConst").unwrap_or(0),
                element,
            },
            NATIVE_TYPE::ARRAY => MarshalSpec::Array {
                element,
                size_param_index: named_u32("SizeParamIndex").and_then(|v| u16::try_from(v).ok()),
                size_const: named_u32("SizeConst"),
            },
            NATIVE_TYPE::SAFEARRAY => MarshalSpec::SafeArray {
                element: named_u32("SafeArraySubType"),
            },
            NATIVE_TYPE::CUSTOMMARSHALER => MarshalSpec::Custom {
                marshaler: value
                    .named("MarshalType")
                    .or_else(|| value.named("MarshalTypeRef"))
                    .and_then(CustomAttributeArgument::as_str)
                    .unwrap_or_default()
                    .to_string(),
                cookie: value
                    .named("MarshalCookie")
                    .and_then(CustomAttributeArgument::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            other => MarshalSpec::Simple(other),
        })
    }

    /// Encode the descriptor blob.
    ///
    /// # Errors
    /// Returns an error if a count does not fit a compressed integer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = ByteBuffer::with_capacity(8);
        match self {
            MarshalSpec::Simple(native) => buffer.write_u8(*native),
            MarshalSpec::FixedString { size } => {
                buffer.write_u8(NATIVE_TYPE::FIXEDSYSSTRING);
                buffer.write_compressed_uint(*size)?;
            }
            MarshalSpec::FixedArray { size, element } => {
                buffer.write_u8(NATIVE_TYPE::FIXEDARRAY);
                buffer.write_compressed_uint(*size)?;
                if let Some(element) = element {
                    buffer.write_u8(*element);
                }
            }
            MarshalSpec::Array {
                element,
                size_param_index,
                size_const,
            } => {
                buffer.write_u8(NATIVE_TYPE::ARRAY);
                let has_size = size_param_index.is_some() || size_const.is_some();
                if element.is_some() || has_size {
                    buffer.write_u8(element.unwrap_or(NATIVE_TYPE::MAX));
                }
                if has_size {
                    buffer.write_compressed_uint(u32::from(size_param_index.unwrap_or(0)))?;
                    buffer.write_compressed_uint(size_const.unwrap_or(0))?;
                    buffer.write_compressed_uint(u32::from(size_param_index.is_some()))?;
                }
            }
            MarshalSpec::SafeArray { element } => {
                buffer.write_u8(NATIVE_TYPE::SAFEARRAY);
                if let Some(element) = element {
                    buffer.write_compressed_uint(*element)?;
                }
            }
            MarshalSpec::Custom { marshaler, cookie } => {
                buffer.write_u8(NATIVE_TYPE::CUSTOMMARSHALER);
                // GUID and native type name are unused by the runtime and left empty.
                buffer.write_compressed_uint(0)?;
                buffer.write_compressed_uint(0)?;
                for text in [marshaler, cookie] {
                    buffer.write_compressed_uint(text.len() as u32)?;
                    buffer.write_bytes(text.as_bytes());
                }
            }
        }
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::customattributes::{CustomAttributeNamedArgument, CustomAttributeType};

    fn marshal_as(native: i32, named: Vec<(&str, CustomAttributeArgument)>) -> CustomAttributeValue {
        CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::I4(native)],
            named_args: named
                .into_iter()
                .map(|(name, value)| CustomAttributeNamedArgument {
                    is_field: true,
                    name: name.to_string(),
                    arg_type: CustomAttributeType::I4,
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn simple_and_fixed() -> Result<()> {
        let spec = MarshalSpec::from_attribute(&marshal_as(0x15, vec![]))?;
        assert_eq!(spec.encode()?, [0x15]);

        let spec = MarshalSpec::from_attribute(&marshal_as(
            0x17,
            vec![("SizeConst", CustomAttributeArgument::I4(32))],
        ))?;
        assert_eq!(spec.encode()?, [0x17, 0x20]);
        Ok(())
    }

    #[test]
    fn lp_array_with_size_param() -> Result<()> {
        let spec = MarshalSpec::from_attribute(&marshal_as(
            0x2a,
            vec![
                ("ArraySubType", CustomAttributeArgument::I4(0x07)),
                ("SizeParamIndex", CustomAttributeArgument::I4(1)),
            ],
        ))?;
        assert_eq!(spec.encode()?, [0x2a, 0x07, 0x01, 0x00, 0x01]);

        let bare = MarshalSpec::Array {
            element: None,
            size_param_index: None,
            size_const: None,
        };
        assert_eq!(bare.encode()?, [0x2a]);
        Ok(())
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(MarshalSpec::from_attribute(&CustomAttributeValue::default()).is_err());
    }
}
