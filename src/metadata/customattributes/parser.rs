//! Custom attribute blob decoding.
//!
//! Fixed arguments need the constructor's parameter types to be decoded; named arguments carry
//! their own type. Enum types are only recorded by name in a blob, so the width of a named enum
//! argument comes from a caller supplied lookup, falling back to `int`.

use crate::{
    metadata::{
        customattributes::{
            CustomAttributeArgument, CustomAttributeNamedArgument, CustomAttributeType,
            CustomAttributeValue, CUSTOM_ATTRIBUTE_PROLOG, NAMED_ARG_TYPE, SERIALIZATION_TYPE,
        },
        signatures::PrimitiveKind,
    },
    utils::Parser,
    Result,
};

/// Nesting limit for arrays and boxed values.
const MAX_NESTING_DEPTH: usize = 16;

/// Decode a custom attribute blob.
///
/// Named enum arguments are assumed to have an `int` underlying type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a blob that does not match `ctor_params` or is
/// otherwise invalid.
///
/// # Examples
///
/// ```rust
/// use dotemit::metadata::customattributes::{
///     decode_custom_attribute, CustomAttributeArgument, CustomAttributeType,
/// };
///
/// let blob = [0x01, 0x00, 0x02, b'h', b'i', 0x00, 0x00];
/// let value = decode_custom_attribute(&blob, &[CustomAttributeType::String])?;
/// assert_eq!(value.fixed_args, vec![CustomAttributeArgument::string("hi")]);
/// # Ok::<(), dotemit::Error>(())
/// ```
pub fn decode_custom_attribute(
    blob: &[u8],
    ctor_params: &[CustomAttributeType],
) -> Result<CustomAttributeValue> {
    decode_custom_attribute_with(blob, ctor_params, |_| None)
}

/// Decode a custom attribute blob, resolving named enum types through `enum_underlying`.
///
/// # Errors
/// See [`decode_custom_attribute`].
pub fn decode_custom_attribute_with<F>(
    blob: &[u8],
    ctor_params: &[CustomAttributeType],
    enum_underlying: F,
) -> Result<CustomAttributeValue>
where
    F: Fn(&str) -> Option<PrimitiveKind>,
{
    let mut decoder = Decoder {
        parser: Parser::new(blob),
        enum_underlying: &enum_underlying,
        depth: 0,
    };
    decoder.decode(ctor_params)
}

struct Decoder<'a, 'f> {
    parser: Parser<'a>,
    enum_underlying: &'f dyn Fn(&str) -> Option<PrimitiveKind>,
    depth: usize,
}

impl Decoder<'_, '_> {
    fn decode(&mut self, ctor_params: &[CustomAttributeType]) -> Result<CustomAttributeValue> {
        let prolog = self.parser.read_le::<u16>()?;
        if prolog != CUSTOM_ATTRIBUTE_PROLOG {
            return Err(malformed_error!(
                "Invalid custom attribute prolog - expected 0x0001, got 0x{:04X}",
                prolog
            ));
        }

        let mut fixed_args = Vec::with_capacity(ctor_params.len());
        for declared in ctor_params {
            fixed_args.push(self.read_element(declared)?);
        }

        let named_count = self.parser.read_le::<u16>()?;
        let mut named_args = Vec::with_capacity(usize::from(named_count.min(64)));
        for _ in 0..named_count {
            let kind = self.parser.read_le::<u8>()?;
            let is_field = match kind {
                NAMED_ARG_TYPE::FIELD => true,
                NAMED_ARG_TYPE::PROPERTY => false,
                other => {
                    return Err(malformed_error!(
                        "Invalid named argument kind 0x{:02X}",
                        other
                    ))
                }
            };
            let arg_type = self.read_field_or_prop_type()?;
            let name = self
                .parser
                .read_ser_string()?
                .ok_or_else(|| malformed_error!("Named argument without a name"))?;
            let value = self.read_element(&arg_type)?;
            named_args.push(CustomAttributeNamedArgument {
                is_field,
                name,
                arg_type,
                value,
            });
        }

        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after custom attribute",
                self.parser.len() - self.parser.pos()
            ));
        }

        Ok(CustomAttributeValue {
            fixed_args,
            named_args,
        })
    }

    fn read_field_or_prop_type(&mut self) -> Result<CustomAttributeType> {
        let code = self.parser.read_le::<u8>()?;
        match code {
            SERIALIZATION_TYPE::ENUM => {
                let type_name = self
                    .parser
                    .read_ser_string()?
                    .ok_or_else(|| malformed_error!("Enum type without a name"))?;
                let underlying = (self.enum_underlying)(&type_name).unwrap_or(PrimitiveKind::I4);
                Ok(CustomAttributeType::Enum {
                    type_name,
                    underlying,
                })
            }
            SERIALIZATION_TYPE::SZARRAY => Ok(CustomAttributeType::SzArray(Box::new(
                self.read_field_or_prop_type()?,
            ))),
            other => CustomAttributeType::from_code(other)
                .ok_or_else(|| malformed_error!("Invalid serialization type 0x{:02X}", other)),
        }
    }

    fn read_element(&mut self, declared: &CustomAttributeType) -> Result<CustomAttributeArgument> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(malformed_error!("Custom attribute value nested too deeply"));
        }
        let value = self.read_element_inner(declared);
        self.depth -= 1;
        value
    }

    fn read_element_inner(
        &mut self,
        declared: &CustomAttributeType,
    ) -> Result<CustomAttributeArgument> {
        Ok(match declared {
            CustomAttributeType::Boolean => {
                CustomAttributeArgument::Bool(self.parser.read_le::<u8>()? != 0)
            }
            CustomAttributeType::Char => {
                let unit = self.parser.read_le::<u16>()?;
                CustomAttributeArgument::Char(
                    char::from_u32(u32::from(unit))
                        .ok_or_else(|| malformed_error!("Invalid char 0x{:04X}", unit))?,
                )
            }
            CustomAttributeType::I1 => CustomAttributeArgument::I1(self.parser.read_le()?),
            CustomAttributeType::U1 => CustomAttributeArgument::U1(self.parser.read_le()?),
            CustomAttributeType::I2 => CustomAttributeArgument::I2(self.parser.read_le()?),
            CustomAttributeType::U2 => CustomAttributeArgument::U2(self.parser.read_le()?),
            CustomAttributeType::I4 => CustomAttributeArgument::I4(self.parser.read_le()?),
            CustomAttributeType::U4 => CustomAttributeArgument::U4(self.parser.read_le()?),
            CustomAttributeType::I8 => CustomAttributeArgument::I8(self.parser.read_le()?),
            CustomAttributeType::U8 => CustomAttributeArgument::U8(self.parser.read_le()?),
            CustomAttributeType::R4 => CustomAttributeArgument::R4(self.parser.read_le()?),
            CustomAttributeType::R8 => CustomAttributeArgument::R8(self.parser.read_le()?),
            CustomAttributeType::String => {
                CustomAttributeArgument::String(self.parser.read_ser_string()?)
            }
            CustomAttributeType::Type => CustomAttributeArgument::Type(self.parser.read_ser_string()?),
            CustomAttributeType::Enum {
                type_name,
                underlying,
            } => {
                let underlying = CustomAttributeType::from_primitive(*underlying)?;
                CustomAttributeArgument::Enum(
                    type_name.clone(),
                    Box::new(self.read_element(&underlying)?),
                )
            }
            CustomAttributeType::SzArray(element) => {
                let count = self.parser.read_le::<u32>()?;
                if count == 0xFFFF_FFFF {
                    CustomAttributeArgument::Array(element.as_ref().clone(), None)
                } else {
                    let remaining = self.parser.len() - self.parser.pos();
                    if count as usize > remaining {
                        return Err(malformed_error!(
                            "Array of {} elements exceeds remaining {} bytes",
                            count,
                            remaining
                        ));
                    }
                    let mut items = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        items.push(self.read_element(element)?);
                    }
                    CustomAttributeArgument::Array(element.as_ref().clone(), Some(items))
                }
            }
            CustomAttributeType::Boxed => {
                let inner_type = self.read_field_or_prop_type()?;
                if inner_type == CustomAttributeType::Boxed {
                    return Err(malformed_error!("Boxed value tagged as object"));
                }
                CustomAttributeArgument::Boxed(Box::new(self.read_element(&inner_type)?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::customattributes::encode_custom_attribute_value;

    #[test]
    fn named_arguments_round_trip() -> Result<()> {
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::string("x")],
            named_args: vec![
                CustomAttributeNamedArgument {
                    is_field: true,
                    name: "Count".to_string(),
                    arg_type: CustomAttributeType::I4,
                    value: CustomAttributeArgument::I4(42),
                },
                CustomAttributeNamedArgument {
                    is_field: false,
                    name: "Tags".to_string(),
                    arg_type: CustomAttributeType::SzArray(Box::new(CustomAttributeType::String)),
                    value: CustomAttributeArgument::Array(
                        CustomAttributeType::String,
                        Some(vec![
                            CustomAttributeArgument::string("a"),
                            CustomAttributeArgument::String(None),
                        ]),
                    ),
                },
            ],
        };
        let params = [CustomAttributeType::String];
        let blob = encode_custom_attribute_value(&value, &params)?;
        assert_eq!(decode_custom_attribute(&blob, &params)?, value);
        Ok(())
    }

    #[test]
    fn enum_width_comes_from_lookup() -> Result<()> {
        let blob = [0x01, 0x00, 0x01, 0x00, 0x53, 0x55, 0x01, b'E', 0x01, b'F', 0x02, 0x00];
        let value = decode_custom_attribute_with(&blob, &[], |name| {
            (name == "E").then_some(PrimitiveKind::I2)
        })?;
        assert_eq!(
            value.named("F"),
            Some(&CustomAttributeArgument::Enum(
                "E".to_string(),
                Box::new(CustomAttributeArgument::I2(2))
            ))
        );
        Ok(())
    }

    #[test]
    fn bad_prolog_and_trailing_bytes() {
        assert!(decode_custom_attribute(&[0x02, 0x00, 0x00, 0x00], &[]).is_err());
        assert!(decode_custom_attribute(&[0x01, 0x00, 0x00, 0x00, 0x00], &[]).is_err());
        assert!(decode_custom_attribute(&[0x01, 0x00], &[CustomAttributeType::I4]).is_err());
    }
}
