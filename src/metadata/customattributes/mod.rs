//! Custom attribute encoding, decoding and pseudo-attribute recognition.
//!
//! A custom attribute blob (ECMA-335 II.23.3) has the following layout:
//! - **Prolog**: the `u16` value `0x0001`
//! - **Fixed Arguments**: constructor argument values in parameter order
//! - **Named Arguments**: a `u16` count, then per argument a field (`0x53`) or property (`0x54`)
//!   marker, the declared type, the name and the value
//!
//! [`CustomAttributeBuilder`] produces these blobs, [`decode_custom_attribute`] reads them back.
//! Attributes listed by ECMA-335 II.21.2.1 as pseudo-custom attributes are mapped to
//! structural changes through [`PseudoAttribute`] rather than stored as blobs.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.3 - Custom Attributes
//! - ECMA-335 6th Edition, Partition II, Section 23.4 - Marshalling Descriptors

mod builder;
mod encoder;
mod marshal;
mod parser;
mod pseudo;
mod types;

pub use builder::CustomAttributeBuilder;
pub use encoder::encode_custom_attribute_value;
pub use marshal::{MarshalSpec, NATIVE_TYPE};
pub use parser::{decode_custom_attribute, decode_custom_attribute_with};
pub use pseudo::PseudoAttribute;
pub use types::*;

/// Leading `u16` of every custom attribute blob.
pub const CUSTOM_ATTRIBUTE_PROLOG: u16 = 0x0001;

/// .NET `CorSerializationType` constants as defined in corhdr.h
#[allow(non_snake_case, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const TYPE: u8 = 0x50;
    pub const TAGGED_OBJECT: u8 = 0x51;
    pub const ENUM: u8 = 0x55;
    pub const SZARRAY: u8 = 0x1D;
}

/// Markers that introduce a named argument.
#[allow(non_snake_case)]
pub mod NAMED_ARG_TYPE {
    /// Named field
    pub const FIELD: u8 = 0x53;
    /// Named property
    pub const PROPERTY: u8 = 0x54;
}
