//! Default values stored in the `Constant` table.

use widestring::U16String;

use crate::{
    metadata::signatures::{TypeSignature, ELEMENT_TYPE},
    Error, Result,
};

/// A literal value of a field, parameter or property.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// Boolean value
    Boolean(bool),
    /// Character value (one UTF-16 code unit)
    Char(char),
    /// 8-bit signed integer
    I1(i8),
    /// 8-bit unsigned integer
    U1(u8),
    /// 16-bit signed integer
    I2(i16),
    /// 16-bit unsigned integer
    U2(u16),
    /// 32-bit signed integer
    I4(i32),
    /// 32-bit unsigned integer
    U4(u32),
    /// 64-bit signed integer
    I8(i64),
    /// 64-bit unsigned integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// String, stored as UTF-16
    String(String),
    /// Null reference
    Null,
}

impl ConstantValue {
    /// Element type code written to the `Constant.Type` column.
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            ConstantValue::Boolean(_) => ELEMENT_TYPE::BOOLEAN,
            ConstantValue::Char(_) => ELEMENT_TYPE::CHAR,
            ConstantValue::I1(_) => ELEMENT_TYPE::I1,
            ConstantValue::U1(_) => ELEMENT_TYPE::U1,
            ConstantValue::I2(_) => ELEMENT_TYPE::I2,
            ConstantValue::U2(_) => ELEMENT_TYPE::U2,
            ConstantValue::I4(_) => ELEMENT_TYPE::I4,
            ConstantValue::U4(_) => ELEMENT_TYPE::U4,
            ConstantValue::I8(_) => ELEMENT_TYPE::I8,
            ConstantValue::U8(_) => ELEMENT_TYPE::U8,
            ConstantValue::R4(_) => ELEMENT_TYPE::R4,
            ConstantValue::R8(_) => ELEMENT_TYPE::R8,
            ConstantValue::String(_) => ELEMENT_TYPE::STRING,
            ConstantValue::Null => ELEMENT_TYPE::CLASS,
        }
    }

    /// Value bytes stored in the `#Blob` heap.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for a `char` outside the basic multilingual plane.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(match self {
            ConstantValue::Boolean(value) => vec![u8::from(*value)],
            ConstantValue::Char(value) => {
                let code = u16::try_from(u32::from(*value)).map_err(|_| {
                    Error::NotSupported(format!("'{}' is not a single UTF-16 code unit", value))
                })?;
                code.to_le_bytes().to_vec()
            }
            ConstantValue::I1(value) => value.to_le_bytes().to_vec(),
            ConstantValue::U1(value) => vec![*value],
            ConstantValue::I2(value) => value.to_le_bytes().to_vec(),
            ConstantValue::U2(value) => value.to_le_bytes().to_vec(),
            ConstantValue::I4(value) => value.to_le_bytes().to_vec(),
            ConstantValue::U4(value) => value.to_le_bytes().to_vec(),
            ConstantValue::I8(value) => value.to_le_bytes().to_vec(),
            ConstantValue::U8(value) => value.to_le_bytes().to_vec(),
            ConstantValue::R4(value) => value.to_le_bytes().to_vec(),
            ConstantValue::R8(value) => value.to_le_bytes().to_vec(),
            ConstantValue::String(value) => U16String::from_str(value)
                .as_slice()
                .iter()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
            ConstantValue::Null => vec![0, 0, 0, 0],
        })
    }

    /// Check that the value can initialize a member of type `target`.
    ///
    /// Enum-typed members accept any integral value; the enum's underlying type is not checked.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the value does not fit the declared type.
    pub fn check_assignable(&self, target: &TypeSignature) -> Result<()> {
        let matches = match (self, target) {
            (ConstantValue::Null, TypeSignature::String | TypeSignature::Object)
            | (ConstantValue::Null, TypeSignature::Class(_))
            | (ConstantValue::Null, TypeSignature::SzArray(_))
            | (ConstantValue::Null, TypeSignature::GenericInst(..)) => true,
            (ConstantValue::String(_), TypeSignature::String | TypeSignature::Object) => true,
            (_, TypeSignature::ValueType(_)) => self.is_integral(),
            (value, target) => match target.as_primitive() {
                Some(kind) => kind.element_type() == value.element_type(),
                None => false,
            },
        };

        if matches {
            Ok(())
        } else {
            Err(Error::NotSupported(format!(
                "Constant {:?} cannot initialize a member of type {:?}",
                self, target
            )))
        }
    }

    fn is_integral(&self) -> bool {
        matches!(
            self,
            ConstantValue::Boolean(_)
                | ConstantValue::Char(_)
                | ConstantValue::I1(_)
                | ConstantValue::U1(_)
                | ConstantValue::I2(_)
                | ConstantValue::U2(_)
                | ConstantValue::I4(_)
                | ConstantValue::U4(_)
                | ConstantValue::I8(_)
                | ConstantValue::U8(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings() -> Result<()> {
        assert_eq!(ConstantValue::I4(-2).to_bytes()?, [0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(ConstantValue::Char('A').to_bytes()?, [0x41, 0x00]);
        assert_eq!(
            ConstantValue::String("hi".to_string()).to_bytes()?,
            [0x68, 0x00, 0x69, 0x00]
        );
        assert_eq!(ConstantValue::Null.element_type(), ELEMENT_TYPE::CLASS);
        assert!(ConstantValue::Char('😀').to_bytes().is_err());
        Ok(())
    }

    #[test]
    fn assignability() {
        assert!(ConstantValue::I4(1).check_assignable(&TypeSignature::I4).is_ok());
        assert!(ConstantValue::I4(1).check_assignable(&TypeSignature::I8).is_err());
        assert!(ConstantValue::Null.check_assignable(&TypeSignature::String).is_ok());
        assert!(ConstantValue::Null.check_assignable(&TypeSignature::I4).is_err());
        assert!(ConstantValue::String("x".to_string())
            .check_assignable(&TypeSignature::Object)
            .is_ok());
    }
}
