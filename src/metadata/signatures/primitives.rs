//! The closed set of well-known core library types.
//!
//! Signature and custom attribute encoding need to recognise types like `System.Int32` and emit
//! a primitive element code for them instead of a class token. Rather than comparing against
//! cached type objects, every such type is a [`PrimitiveKind`] variant resolved once from its
//! namespace and name and matched on directly afterwards.

use strum::{EnumIter, IntoEnumIterator};

use crate::metadata::{customattributes::SERIALIZATION_TYPE, signatures::ELEMENT_TYPE};

/// Core library types with a dedicated element type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum PrimitiveKind {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.IntPtr`
    I,
    /// `System.UIntPtr`
    U,
    /// `System.Object`
    Object,
    /// `System.String`
    String,
    /// `System.TypedReference`
    TypedReference,
}

impl PrimitiveKind {
    /// Resolve a core library type by namespace and name.
    #[must_use]
    pub fn from_name(namespace: &str, name: &str) -> Option<PrimitiveKind> {
        if namespace != "System" {
            return None;
        }
        PrimitiveKind::iter().find(|kind| kind.name() == name)
    }

    /// Resolve an element type code.
    #[must_use]
    pub fn from_element_type(code: u8) -> Option<PrimitiveKind> {
        PrimitiveKind::iter().find(|kind| kind.element_type() == code)
    }

    /// The type's simple name in the `System` namespace.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::I1 => "SByte",
            PrimitiveKind::U1 => "Byte",
            PrimitiveKind::I2 => "Int16",
            PrimitiveKind::U2 => "UInt16",
            PrimitiveKind::I4 => "Int32",
            PrimitiveKind::U4 => "UInt32",
            PrimitiveKind::I8 => "Int64",
            PrimitiveKind::U8 => "UInt64",
            PrimitiveKind::R4 => "Single",
            PrimitiveKind::R8 => "Double",
            PrimitiveKind::I => "IntPtr",
            PrimitiveKind::U => "UIntPtr",
            PrimitiveKind::Object => "Object",
            PrimitiveKind::String => "String",
            PrimitiveKind::TypedReference => "TypedReference",
        }
    }

    /// The `ELEMENT_TYPE` code used in signatures.
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            PrimitiveKind::Void => ELEMENT_TYPE::VOID,
            PrimitiveKind::Boolean => ELEMENT_TYPE::BOOLEAN,
            PrimitiveKind::Char => ELEMENT_TYPE::CHAR,
            PrimitiveKind::I1 => ELEMENT_TYPE::I1,
            PrimitiveKind::U1 => ELEMENT_TYPE::U1,
            PrimitiveKind::I2 => ELEMENT_TYPE::I2,
            PrimitiveKind::U2 => ELEMENT_TYPE::U2,
            PrimitiveKind::I4 => ELEMENT_TYPE::I4,
            PrimitiveKind::U4 => ELEMENT_TYPE::U4,
            PrimitiveKind::I8 => ELEMENT_TYPE::I8,
            PrimitiveKind::U8 => ELEMENT_TYPE::U8,
            PrimitiveKind::R4 => ELEMENT_TYPE::R4,
            PrimitiveKind::R8 => ELEMENT_TYPE::R8,
            PrimitiveKind::I => ELEMENT_TYPE::I,
            PrimitiveKind::U => ELEMENT_TYPE::U,
            PrimitiveKind::Object => ELEMENT_TYPE::OBJECT,
            PrimitiveKind::String => ELEMENT_TYPE::STRING,
            PrimitiveKind::TypedReference => ELEMENT_TYPE::TYPEDBYREF,
        }
    }

    /// The custom attribute serialization code, if the type may appear in an attribute blob.
    #[must_use]
    pub fn serialization_type(&self) -> Option<u8> {
        match self {
            PrimitiveKind::Boolean => Some(SERIALIZATION_TYPE::BOOLEAN),
            PrimitiveKind::Char => Some(SERIALIZATION_TYPE::CHAR),
            PrimitiveKind::I1 => Some(SERIALIZATION_TYPE::I1),
            PrimitiveKind::U1 => Some(SERIALIZATION_TYPE::U1),
            PrimitiveKind::I2 => Some(SERIALIZATION_TYPE::I2),
            PrimitiveKind::U2 => Some(SERIALIZATION_TYPE::U2),
            PrimitiveKind::I4 => Some(SERIALIZATION_TYPE::I4),
            PrimitiveKind::U4 => Some(SERIALIZATION_TYPE::U4),
            PrimitiveKind::I8 => Some(SERIALIZATION_TYPE::I8),
            PrimitiveKind::U8 => Some(SERIALIZATION_TYPE::U8),
            PrimitiveKind::R4 => Some(SERIALIZATION_TYPE::R4),
            PrimitiveKind::R8 => Some(SERIALIZATION_TYPE::R8),
            PrimitiveKind::String => Some(SERIALIZATION_TYPE::STRING),
            PrimitiveKind::Object => Some(SERIALIZATION_TYPE::TAGGED_OBJECT),
            _ => None,
        }
    }

    /// Returns `true` for types that are value types in the CLI type system.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Object | PrimitiveKind::String | PrimitiveKind::Void
        )
    }

    /// Size in bytes of an integral or floating point primitive.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::I1 | PrimitiveKind::U1 => Some(1),
            PrimitiveKind::Char | PrimitiveKind::I2 | PrimitiveKind::U2 => Some(2),
            PrimitiveKind::I4 | PrimitiveKind::U4 | PrimitiveKind::R4 => Some(4),
            PrimitiveKind::I8 | PrimitiveKind::U8 | PrimitiveKind::R8 => Some(8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup() {
        assert_eq!(PrimitiveKind::from_name("System", "Int32"), Some(PrimitiveKind::I4));
        assert_eq!(PrimitiveKind::from_name("System", "String"), Some(PrimitiveKind::String));
        assert_eq!(PrimitiveKind::from_name("System", "Guid"), None);
        assert_eq!(PrimitiveKind::from_name("Other", "Int32"), None);
    }

    #[test]
    fn codes() {
        assert_eq!(PrimitiveKind::I4.element_type(), 0x08);
        assert_eq!(PrimitiveKind::from_element_type(0x0E), Some(PrimitiveKind::String));
        assert_eq!(PrimitiveKind::Object.serialization_type(), Some(0x51));
        assert_eq!(PrimitiveKind::I.serialization_type(), None);
        assert_eq!(PrimitiveKind::U8.size(), Some(8));
        assert!(!PrimitiveKind::String.is_value_type());
    }
}
