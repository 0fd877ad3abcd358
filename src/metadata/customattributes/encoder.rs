//! Custom attribute blob encoding (ECMA-335 II.23.3).

use crate::{
    metadata::customattributes::{
        CustomAttributeArgument, CustomAttributeNamedArgument, CustomAttributeType,
        CustomAttributeValue, CUSTOM_ATTRIBUTE_PROLOG, NAMED_ARG_TYPE,
    },
    utils::ByteBuffer,
    Error, Result,
};

/// Length written for a null array.
const NULL_ARRAY: u32 = 0xFFFF_FFFF;

/// Encode `value` against the constructor's parameter types.
///
/// # Errors
/// Returns [`Error::NotSupported`] when an argument does not match its declared type or cannot
/// be represented, and [`Error::Malformed`] when the argument count differs from `ctor_params`.
pub fn encode_custom_attribute_value(
    value: &CustomAttributeValue,
    ctor_params: &[CustomAttributeType],
) -> Result<Vec<u8>> {
    if value.fixed_args.len() != ctor_params.len() {
        return Err(malformed_error!(
            "Constructor takes {} arguments, {} supplied",
            ctor_params.len(),
            value.fixed_args.len()
        ));
    }

    let mut buffer = ByteBuffer::with_capacity(32);
    buffer.write_u16(CUSTOM_ATTRIBUTE_PROLOG);
    for (argument, declared) in value.fixed_args.iter().zip(ctor_params) {
        write_element(&mut buffer, declared, argument)?;
    }

    let named_count = u16::try_from(value.named_args.len()).map_err(|_| {
        Error::NotSupported(format!(
            "{} named arguments exceed the u16 count",
            value.named_args.len()
        ))
    })?;
    buffer.write_u16(named_count);
    for named in &value.named_args {
        write_named_argument(&mut buffer, named)?;
    }

    Ok(buffer.into_inner())
}

fn write_named_argument(buffer: &mut ByteBuffer, named: &CustomAttributeNamedArgument) -> Result<()> {
    buffer.write_u8(if named.is_field {
        NAMED_ARG_TYPE::FIELD
    } else {
        NAMED_ARG_TYPE::PROPERTY
    });
    write_field_or_prop_type(buffer, &named.arg_type)?;
    write_ser_string(buffer, Some(&named.name))?;
    write_element(buffer, &named.arg_type, &named.value)
}

/// Writes a `FieldOrPropType`.
fn write_field_or_prop_type(buffer: &mut ByteBuffer, declared: &CustomAttributeType) -> Result<()> {
    buffer.write_u8(declared.code());
    match declared {
        CustomAttributeType::Enum { type_name, .. } => write_ser_string(buffer, Some(type_name)),
        CustomAttributeType::SzArray(element) => write_field_or_prop_type(buffer, element),
        _ => Ok(()),
    }
}

/// Writes a `SerString`: `0xFF` for null, otherwise compressed length and UTF-8 bytes.
fn write_ser_string(buffer: &mut ByteBuffer, value: Option<&str>) -> Result<()> {
    match value {
        None => buffer.write_u8(0xFF),
        Some(value) => {
            let len = u32::try_from(value.len())
                .map_err(|_| Error::NotSupported("String too long".to_string()))?;
            buffer.write_compressed_uint(len)?;
            buffer.write_bytes(value.as_bytes());
        }
    }
    Ok(())
}

fn mismatch(declared: &CustomAttributeType, argument: &CustomAttributeArgument) -> Error {
    Error::NotSupported(format!(
        "Value {:?} cannot be stored as {:?}",
        argument, declared
    ))
}

fn write_element(
    buffer: &mut ByteBuffer,
    declared: &CustomAttributeType,
    argument: &CustomAttributeArgument,
) -> Result<()> {
    match (declared, argument) {
        (CustomAttributeType::Boolean, CustomAttributeArgument::Bool(v)) => {
            buffer.write_u8(u8::from(*v));
        }
        (CustomAttributeType::Char, CustomAttributeArgument::Char(v)) => {
            let unit = u16::try_from(u32::from(*v)).map_err(|_| {
                Error::NotSupported(format!("Character {:?} is outside the BMP", v))
            })?;
            buffer.write_u16(unit);
        }
        (CustomAttributeType::I1, CustomAttributeArgument::I1(v)) => buffer.write_le(*v),
        (CustomAttributeType::U1, CustomAttributeArgument::U1(v)) => buffer.write_le(*v),
        (CustomAttributeType::I2, CustomAttributeArgument::I2(v)) => buffer.write_le(*v),
        (CustomAttributeType::U2, CustomAttributeArgument::U2(v)) => buffer.write_le(*v),
        (CustomAttributeType::I4, CustomAttributeArgument::I4(v)) => buffer.write_le(*v),
        (CustomAttributeType::U4, CustomAttributeArgument::U4(v)) => buffer.write_le(*v),
        (CustomAttributeType::I8, CustomAttributeArgument::I8(v)) => buffer.write_le(*v),
        (CustomAttributeType::U8, CustomAttributeArgument::U8(v)) => buffer.write_le(*v),
        (CustomAttributeType::R4, CustomAttributeArgument::R4(v)) => buffer.write_le(*v),
        (CustomAttributeType::R8, CustomAttributeArgument::R8(v)) => buffer.write_le(*v),
        (CustomAttributeType::String, CustomAttributeArgument::String(v))
        | (CustomAttributeType::Type, CustomAttributeArgument::Type(v)) => {
            write_ser_string(buffer, v.as_deref())?;
        }
        (
            CustomAttributeType::Enum {
                type_name,
                underlying,
            },
            CustomAttributeArgument::Enum(value_type, value),
        ) => {
            if type_name != value_type {
                return Err(mismatch(declared, argument));
            }
            let underlying = CustomAttributeType::from_primitive(*underlying)?;
            write_element(buffer, &underlying, value)?;
        }
        (CustomAttributeType::Enum { underlying, .. }, plain) => {
            let underlying = CustomAttributeType::from_primitive(*underlying)?;
            write_element(buffer, &underlying, plain)?;
        }
        (CustomAttributeType::SzArray(element), CustomAttributeArgument::Array(value_type, items)) => {
            if element.as_ref() != value_type {
                return Err(mismatch(declared, argument));
            }
            match items {
                None => buffer.write_u32(NULL_ARRAY),
                Some(items) => {
                    let count = u32::try_from(items.len())
                        .ok()
                        .filter(|count| *count != NULL_ARRAY)
                        .ok_or_else(|| Error::NotSupported("Array too long".to_string()))?;
                    buffer.write_u32(count);
                    for item in items {
                        write_element(buffer, element, item)?;
                    }
                }
            }
        }
        (CustomAttributeType::Boxed, CustomAttributeArgument::Boxed(inner)) => {
            write_boxed(buffer, inner)?;
        }
        (CustomAttributeType::Boxed, plain) => write_boxed(buffer, plain)?,
        _ => return Err(mismatch(declared, argument)),
    }
    Ok(())
}

fn write_boxed(buffer: &mut ByteBuffer, inner: &CustomAttributeArgument) -> Result<()> {
    if matches!(inner, CustomAttributeArgument::Boxed(_)) {
        return Err(Error::NotSupported(
            "A boxed value cannot contain another boxed value".to_string(),
        ));
    }
    let inner_type = inner.attribute_type()?;
    write_field_or_prop_type(buffer, &inner_type)?;
    write_element(buffer, &inner_type, inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::PrimitiveKind;

    #[test]
    fn empty_attribute() -> Result<()> {
        let blob = encode_custom_attribute_value(&CustomAttributeValue::default(), &[])?;
        assert_eq!(blob, [0x01, 0x00, 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn fixed_string_and_int() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![
                CustomAttributeArgument::string("ab"),
                CustomAttributeArgument::I4(7),
                CustomAttributeArgument::String(None),
            ],
            named_args: vec![],
        };
        let blob = encode_custom_attribute_value(
            &value,
            &[
                CustomAttributeType::String,
                CustomAttributeType::I4,
                CustomAttributeType::String,
            ],
        )?;
        assert_eq!(
            blob,
            [0x01, 0x00, 0x02, b'a', b'b', 0x07, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00]
        );
        Ok(())
    }

    #[test]
    fn named_enum_property() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![],
            named_args: vec![CustomAttributeNamedArgument {
                is_field: false,
                name: "K".to_string(),
                arg_type: CustomAttributeType::Enum {
                    type_name: "E".to_string(),
                    underlying: PrimitiveKind::U1,
                },
                value: CustomAttributeArgument::Enum(
                    "E".to_string(),
                    Box::new(CustomAttributeArgument::U1(3)),
                ),
            }],
        };
        let blob = encode_custom_attribute_value(&value, &[])?;
        assert_eq!(
            blob,
            [0x01, 0x00, 0x01, 0x00, 0x54, 0x55, 0x01, b'E', 0x01, b'K', 0x03]
        );
        Ok(())
    }

    #[test]
    fn boxed_and_arrays() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![
                CustomAttributeArgument::Boxed(Box::new(CustomAttributeArgument::I2(-1))),
                CustomAttributeArgument::Array(CustomAttributeType::U1, None),
                CustomAttributeArgument::Array(
                    CustomAttributeType::U1,
                    Some(vec![CustomAttributeArgument::U1(9)]),
                ),
            ],
            named_args: vec![],
        };
        let u1_array = CustomAttributeType::SzArray(Box::new(CustomAttributeType::U1));
        let blob = encode_custom_attribute_value(
            &value,
            &[CustomAttributeType::Boxed, u1_array.clone(), u1_array],
        )?;
        assert_eq!(
            blob,
            [
                0x01, 0x00, 0x06, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, 0x09,
                0x00, 0x00
            ]
        );
        Ok(())
    }

    #[test]
    fn mismatches_are_rejected() {
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::Bool(true)],
            named_args: vec![],
        };
        assert!(matches!(
            encode_custom_attribute_value(&value, &[CustomAttributeType::I4]),
            Err(Error::NotSupported(_))
        ));
        assert!(encode_custom_attribute_value(&value, &[]).is_err());
    }
}
