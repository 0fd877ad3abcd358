//! Custom attribute value model.
//!
//! These types describe the content of a custom attribute blob (ECMA-335 II.23.3): the
//! constructor's fixed arguments and any named field or property arguments. The same model is
//! used to encode a blob and to describe what a decoded blob contained.

use crate::{
    metadata::{customattributes::SERIALIZATION_TYPE, signatures::PrimitiveKind},
    Error, Result,
};

/// The declared type of a custom attribute argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomAttributeType {
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `string`
    String,
    /// `System.Type`, serialized as a type name
    Type,
    /// `object`, serialized with a leading type tag
    Boxed,
    /// An enum, serialized as its underlying integral value
    Enum {
        /// Assembly qualified name of the enum type
        type_name: String,
        /// Underlying integral type
        underlying: PrimitiveKind,
    },
    /// Single dimension array of the inner type
    SzArray(Box<CustomAttributeType>),
}

impl CustomAttributeType {
    /// The attribute type for a primitive, if the primitive can appear in a blob.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for primitives without a serialization code.
    pub fn from_primitive(kind: PrimitiveKind) -> Result<CustomAttributeType> {
        Ok(match kind {
            PrimitiveKind::Boolean => CustomAttributeType::Boolean,
            PrimitiveKind::Char => CustomAttributeType::Char,
            PrimitiveKind::I1 => CustomAttributeType::I1,
            PrimitiveKind::U1 => CustomAttributeType::U1,
            PrimitiveKind::I2 => CustomAttributeType::I2,
            PrimitiveKind::U2 => CustomAttributeType::U2,
            PrimitiveKind::I4 => CustomAttributeType::I4,
            PrimitiveKind::U4 => CustomAttributeType::U4,
            PrimitiveKind::I8 => CustomAttributeType::I8,
            PrimitiveKind::U8 => CustomAttributeType::U8,
            PrimitiveKind::R4 => CustomAttributeType::R4,
            PrimitiveKind::R8 => CustomAttributeType::R8,
            PrimitiveKind::String => CustomAttributeType::String,
            PrimitiveKind::Object => CustomAttributeType::Boxed,
            other => {
                return Err(Error::NotSupported(format!(
                    "System.{} cannot be used in a custom attribute",
                    other.name()
                )))
            }
        })
    }

    /// The serialization code written for this type in named arguments and boxed values.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            CustomAttributeType::Boolean => SERIALIZATION_TYPE::BOOLEAN,
            CustomAttributeType::Char => SERIALIZATION_TYPE::CHAR,
            CustomAttributeType::I1 => SERIALIZATION_TYPE::I1,
            CustomAttributeType::U1 => SERIALIZATION_TYPE::U1,
            CustomAttributeType::I2 => SERIALIZATION_TYPE::I2,
            CustomAttributeType::U2 => SERIALIZATION_TYPE::U2,
            CustomAttributeType::I4 => SERIALIZATION_TYPE::I4,
            CustomAttributeType::U4 => SERIALIZATION_TYPE::U4,
            CustomAttributeType::I8 => SERIALIZATION_TYPE::I8,
            CustomAttributeType::U8 => SERIALIZATION_TYPE::U8,
            CustomAttributeType::R4 => SERIALIZATION_TYPE::R4,
            CustomAttributeType::R8 => SERIALIZATION_TYPE::R8,
            CustomAttributeType::String => SERIALIZATION_TYPE::STRING,
            CustomAttributeType::Type => SERIALIZATION_TYPE::TYPE,
            CustomAttributeType::Boxed => SERIALIZATION_TYPE::TAGGED_OBJECT,
            CustomAttributeType::Enum { .. } => SERIALIZATION_TYPE::ENUM,
            CustomAttributeType::SzArray(_) => SERIALIZATION_TYPE::SZARRAY,
        }
    }

    /// The attribute type for a primitive serialization code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<CustomAttributeType> {
        Some(match code {
            SERIALIZATION_TYPE::BOOLEAN => CustomAttributeType::Boolean,
            SERIALIZATION_TYPE::CHAR => CustomAttributeType::Char,
            SERIALIZATION_TYPE::I1 => CustomAttributeType::I1,
            SERIALIZATION_TYPE::U1 => CustomAttributeType::U1,
            SERIALIZATION_TYPE::I2 => CustomAttributeType::I2,
            SERIALIZATION_TYPE::U2 => CustomAttributeType::U2,
            SERIALIZATION_TYPE::I4 => CustomAttributeType::I4,
            SERIALIZATION_TYPE::U4 => CustomAttributeType::U4,
            SERIALIZATION_TYPE::I8 => CustomAttributeType::I8,
            SERIALIZATION_TYPE::U8 => CustomAttributeType::U8,
            SERIALIZATION_TYPE::R4 => CustomAttributeType::R4,
            SERIALIZATION_TYPE::R8 => CustomAttributeType::R8,
            SERIALIZATION_TYPE::STRING => CustomAttributeType::String,
            SERIALIZATION_TYPE::TYPE => CustomAttributeType::Type,
            SERIALIZATION_TYPE::TAGGED_OBJECT => CustomAttributeType::Boxed,
            _ => return None,
        })
    }
}

/// A single custom attribute argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Character value (one UTF-16 code unit)
    Char(char),
    /// Signed 8-bit integer
    I1(i8),
    /// Unsigned 8-bit integer
    U1(u8),
    /// Signed 16-bit integer
    I2(i16),
    /// Unsigned 16-bit integer
    U2(u16),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// Signed 64-bit integer
    I8(i64),
    /// Unsigned 64-bit integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// String, `None` for null
    String(Option<String>),
    /// Type reference by assembly qualified name, `None` for null
    Type(Option<String>),
    /// Enum value: enum type name and underlying integral value
    Enum(String, Box<CustomAttributeArgument>),
    /// Array with its element type, `None` for null
    Array(CustomAttributeType, Option<Vec<CustomAttributeArgument>>),
    /// Value passed through an `object` parameter
    Boxed(Box<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// A non-null string argument.
    pub fn string(value: impl Into<String>) -> Self {
        CustomAttributeArgument::String(Some(value.into()))
    }

    /// The attribute type describing this value.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for an enum whose value is not integral.
    pub fn attribute_type(&self) -> Result<CustomAttributeType> {
        Ok(match self {
            CustomAttributeArgument::Bool(_) => CustomAttributeType::Boolean,
            CustomAttributeArgument::Char(_) => CustomAttributeType::Char,
            CustomAttributeArgument::I1(_) => CustomAttributeType::I1,
            CustomAttributeArgument::U1(_) => CustomAttributeType::U1,
            CustomAttributeArgument::I2(_) => CustomAttributeType::I2,
            CustomAttributeArgument::U2(_) => CustomAttributeType::U2,
            CustomAttributeArgument::I4(_) => CustomAttributeType::I4,
            CustomAttributeArgument::U4(_) => CustomAttributeType::U4,
            CustomAttributeArgument::I8(_) => CustomAttributeType::I8,
            CustomAttributeArgument::U8(_) => CustomAttributeType::U8,
            CustomAttributeArgument::R4(_) => CustomAttributeType::R4,
            CustomAttributeArgument::R8(_) => CustomAttributeType::R8,
            CustomAttributeArgument::String(_) => CustomAttributeType::String,
            CustomAttributeArgument::Type(_) => CustomAttributeType::Type,
            CustomAttributeArgument::Enum(type_name, value) => CustomAttributeType::Enum {
                type_name: type_name.clone(),
                underlying: value.integral_kind().ok_or_else(|| {
                    Error::NotSupported(format!("Enum {} must have an integral value", type_name))
                })?,
            },
            CustomAttributeArgument::Array(element, _) => {
                CustomAttributeType::SzArray(Box::new(element.clone()))
            }
            CustomAttributeArgument::Boxed(_) => CustomAttributeType::Boxed,
        })
    }

    /// The integral primitive this value holds, if any.
    #[must_use]
    pub fn integral_kind(&self) -> Option<PrimitiveKind> {
        match self {
            CustomAttributeArgument::Bool(_) => Some(PrimitiveKind::Boolean),
            CustomAttributeArgument::Char(_) => Some(PrimitiveKind::Char),
            CustomAttributeArgument::I1(_) => Some(PrimitiveKind::I1),
            CustomAttributeArgument::U1(_) => Some(PrimitiveKind::U1),
            CustomAttributeArgument::I2(_) => Some(PrimitiveKind::I2),
            CustomAttributeArgument::U2(_) => Some(PrimitiveKind::U2),
            CustomAttributeArgument::I4(_) => Some(PrimitiveKind::I4),
            CustomAttributeArgument::U4(_) => Some(PrimitiveKind::U4),
            CustomAttributeArgument::I8(_) => Some(PrimitiveKind::I8),
            CustomAttributeArgument::U8(_) => Some(PrimitiveKind::U8),
            _ => None,
        }
    }

    /// The value as an `i64`, looking through enums and boxes.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CustomAttributeArgument::Bool(v) => Some(i64::from(*v)),
            CustomAttributeArgument::Char(v) => Some(i64::from(u32::from(*v))),
            CustomAttributeArgument::I1(v) => Some(i64::from(*v)),
            CustomAttributeArgument::U1(v) => Some(i64::from(*v)),
            CustomAttributeArgument::I2(v) => Some(i64::from(*v)),
            CustomAttributeArgument::U2(v) => Some(i64::from(*v)),
            CustomAttributeArgument::I4(v) => Some(i64::from(*v)),
            CustomAttributeArgument::U4(v) => Some(i64::from(*v)),
            CustomAttributeArgument::I8(v) => Some(*v),
            CustomAttributeArgument::U8(v) => i64::try_from(*v).ok(),
            CustomAttributeArgument::Enum(_, inner) | CustomAttributeArgument::Boxed(inner) => {
                inner.as_i64()
            }
            _ => None,
        }
    }

    /// The value as a boolean, looking through boxes.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CustomAttributeArgument::Bool(v) => Some(*v),
            CustomAttributeArgument::Boxed(inner) => inner.as_bool(),
            _ => None,
        }
    }

    /// The value as a string slice; null strings and non-strings yield `None`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CustomAttributeArgument::String(Some(v)) | CustomAttributeArgument::Type(Some(v)) => {
                Some(v)
            }
            CustomAttributeArgument::Boxed(inner) => inner.as_str(),
            _ => None,
        }
    }
}

/// A named field or property argument.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Whether this is a field (true) or property (false)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Declared type of the field or property
    pub arg_type: CustomAttributeType,
    /// Value of the argument
    pub value: CustomAttributeArgument,
}

/// The full content of a custom attribute blob.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomAttributeValue {
    /// Constructor arguments in parameter order
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named field and property arguments in blob order
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttributeValue {
    /// The named argument called `name`, if present.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&CustomAttributeArgument> {
        self.named_args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }
}
