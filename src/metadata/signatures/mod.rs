//! Signature shapes and their ECMA-335 blob encoding.
//!
//! Signatures describe the types of fields, the parameter and return types of methods, the
//! locals of a method body, property types and generic instantiations. They are modelled as
//! [`TypeSignature`] trees and turned into blobs in one of two ways:
//!
//! - **Eager**: a [`SignatureWriter`] writes straight into a buffer while a [`TypeResolver`]
//!   (normally the owning module) is at hand. The parameter count is not known up front and is
//!   inserted once the last argument has been written.
//! - **Lazy**: a [`SignatureHelper`] buffers the shape with abstract [`TypeHandle`]s and only
//!   produces bytes once a resolver is supplied through [`SignatureHelper::get_signature`].
//!
//! The decoders in this module do the reverse and are used to verify emitted blobs.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::metadata::signatures::{
//!     encode_method_signature, NullResolver, SignatureMethod, TypeSignature,
//! };
//!
//! let add = SignatureMethod::instance(
//!     TypeSignature::I4,
//!     vec![TypeSignature::I4, TypeSignature::I4],
//! );
//! let blob = encode_method_signature(&add, &mut NullResolver)?;
//! assert_eq!(blob, [0x20, 0x02, 0x08, 0x08, 0x08]);
//! # Ok::<(), dotemit::Error>(())
//! ```
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.2 - Blobs and Signatures

mod encoders;
mod helper;
mod parser;
mod primitives;
mod types;

pub use encoders::*;
pub use helper::SignatureHelper;
pub use parser::*;
pub use primitives::PrimitiveKind;
pub use types::*;

#[allow(non_snake_case)]
/// Element type codes used inside signature blobs (ECMA-335 II.23.1.16).
pub mod ELEMENT_TYPE {
    /// Marks end of a list
    pub const END: u8 = 0x00;
    /// `void`
    pub const VOID: u8 = 0x01;
    /// `bool`
    pub const BOOLEAN: u8 = 0x02;
    /// `char`
    pub const CHAR: u8 = 0x03;
    /// `int8`
    pub const I1: u8 = 0x04;
    /// `unsigned int8`
    pub const U1: u8 = 0x05;
    /// `int16`
    pub const I2: u8 = 0x06;
    /// `unsigned int16`
    pub const U2: u8 = 0x07;
    /// `int32`
    pub const I4: u8 = 0x08;
    /// `unsigned int32`
    pub const U4: u8 = 0x09;
    /// `int64`
    pub const I8: u8 = 0x0a;
    /// `unsigned int64`
    pub const U8: u8 = 0x0b;
    /// `float32`
    pub const R4: u8 = 0x0c;
    /// `float64`
    pub const R8: u8 = 0x0d;
    /// `string`
    pub const STRING: u8 = 0x0e;
    /// Followed by type
    pub const PTR: u8 = 0x0f;
    /// Followed by type
    pub const BYREF: u8 = 0x10;
    /// Followed by TypeDefOrRef coded index
    pub const VALUETYPE: u8 = 0x11;
    /// Followed by TypeDefOrRef coded index
    pub const CLASS: u8 = 0x12;
    /// Generic parameter of a type, followed by its number
    pub const VAR: u8 = 0x13;
    /// type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    /// Followed by type, type-arg-count, type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    /// `typedref`
    pub const TYPEDBYREF: u8 = 0x16;
    /// `System.IntPtr`
    pub const I: u8 = 0x18;
    /// `System.UIntPtr`
    pub const U: u8 = 0x19;
    /// Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    /// `System.Object`
    pub const OBJECT: u8 = 0x1c;
    /// Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    /// Generic parameter of a method, followed by its number
    pub const MVAR: u8 = 0x1e;
    /// Required modifier, followed by TypeDefOrRef coded index
    pub const CMOD_REQD: u8 = 0x1f;
    /// Optional modifier, followed by TypeDefOrRef coded index
    pub const CMOD_OPT: u8 = 0x20;
    /// Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    /// Or'd with following element types
    pub const MODIFIER: u8 = 0x40;
    /// Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    /// Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

#[allow(non_snake_case)]
/// Calling convention bits of a method signature's leading byte.
pub mod CALLING_CONVENTION {
    /// Managed default convention
    pub const DEFAULT: u8 = 0x00;
    /// Unmanaged cdecl
    pub const C: u8 = 0x01;
    /// Unmanaged stdcall
    pub const STDCALL: u8 = 0x02;
    /// Unmanaged thiscall
    pub const THISCALL: u8 = 0x03;
    /// Unmanaged fastcall
    pub const FASTCALL: u8 = 0x04;
    /// Managed variable argument list
    pub const VARARG: u8 = 0x05;
    /// Mask of the convention kind
    pub const KIND_MASK: u8 = 0x0F;
    /// Generic method with a generic parameter count
    pub const GENERIC: u8 = 0x10;
    /// Instance method, `this` is implicit
    pub const HASTHIS: u8 = 0x20;
    /// `this` is listed explicitly as the first parameter
    pub const EXPLICITTHIS: u8 = 0x40;
}

#[allow(non_snake_case)]
/// Leading bytes of the non-method signature kinds.
pub mod SIGNATURE_HEADER {
    /// Field signature
    pub const FIELD: u8 = 0x06;
    /// Local variable signature
    pub const LOCAL_SIG: u8 = 0x07;
    /// Property signature
    pub const PROPERTY: u8 = 0x08;
    /// Generic method instantiation
    pub const GENERIC_INST: u8 = 0x0A;
}
