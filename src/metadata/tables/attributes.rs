//! Flag constants for the attribute columns of the emitted tables.
//!
//! Each group mirrors one flags column of ECMA-335 II.23.1. Values are plain integer
//! constants so they can be combined with `|` and stored directly in rows.
#![allow(non_snake_case)]

/// `TypeDef.Flags` (ECMA-335 II.23.1.15)
pub mod TypeAttributes {
    /// Mask for the visibility bits
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Type is not visible outside the assembly
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Type is visible outside the assembly
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested type with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Nested type with family visibility
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    /// Nested type with assembly visibility
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Nested type with family-and-assembly visibility
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    /// Nested type with family-or-assembly visibility
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;
    /// Mask for the layout bits
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// Fields are laid out by the runtime
    pub const AUTO_LAYOUT: u32 = 0x0000_0000;
    /// Fields are laid out in declaration order
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    /// Field offsets are given explicitly
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;
    /// Type is a class
    pub const CLASS: u32 = 0x0000_0000;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Type cannot be instantiated
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Type cannot be derived from
    pub const SEALED: u32 = 0x0000_0100;
    /// Name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Type is imported from COM
    pub const IMPORT: u32 = 0x0000_1000;
    /// Type is serializable
    pub const SERIALIZABLE: u32 = 0x0000_2000;
    /// Mask for the string format bits
    pub const STRING_FORMAT_MASK: u32 = 0x0003_0000;
    /// Strings are marshalled as ANSI
    pub const ANSI_CLASS: u32 = 0x0000_0000;
    /// Strings are marshalled as UTF-16
    pub const UNICODE_CLASS: u32 = 0x0001_0000;
    /// String marshalling is platform dependent
    pub const AUTO_CLASS: u32 = 0x0002_0000;
    /// Type initializer may run before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u32 = 0x0000_0800;
    /// Type has declarative security
    pub const HAS_SECURITY: u32 = 0x0004_0000;
    /// `ExportedType` row forwards the type to another assembly
    pub const FORWARDER: u32 = 0x0020_0000;
}

/// `MethodDef.Flags` (ECMA-335 II.23.1.10)
pub mod MethodAttributes {
    /// Mask for the access bits
    pub const MEMBER_ACCESS_MASK: u16 = 0x0007;
    /// Member is not referenceable
    pub const COMPILER_CONTROLLED: u16 = 0x0000;
    /// Accessible only by the parent type
    pub const PRIVATE: u16 = 0x0001;
    /// Accessible by sub-types only in this assembly
    pub const FAM_AND_ASSEM: u16 = 0x0002;
    /// Accessible by anyone in the assembly
    pub const ASSEMBLY: u16 = 0x0003;
    /// Accessible only by type and sub-types
    pub const FAMILY: u16 = 0x0004;
    /// Accessible by sub-types anywhere, plus anyone in the assembly
    pub const FAM_OR_ASSEM: u16 = 0x0005;
    /// Accessible by anyone
    pub const PUBLIC: u16 = 0x0006;
    /// Defined on the type, not per instance
    pub const STATIC: u16 = 0x0010;
    /// Cannot be overridden
    pub const FINAL: u16 = 0x0020;
    /// Virtual method
    pub const VIRTUAL: u16 = 0x0040;
    /// Hide by name and signature
    pub const HIDE_BY_SIG: u16 = 0x0080;
    /// Always gets a new vtable slot
    pub const NEW_SLOT: u16 = 0x0100;
    /// Overridable only if also accessible
    pub const STRICT: u16 = 0x0200;
    /// Method has no implementation
    pub const ABSTRACT: u16 = 0x0400;
    /// Name is special
    pub const SPECIAL_NAME: u16 = 0x0800;
    /// Implementation is forwarded through P/Invoke
    pub const PINVOKE_IMPL: u16 = 0x2000;
    /// Reserved: runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x1000;
    /// Method has declarative security
    pub const HAS_SECURITY: u16 = 0x4000;
    /// Method calls another method containing security code
    pub const REQUIRE_SEC_OBJECT: u16 = 0x8000;
}

/// `MethodDef.ImplFlags` (ECMA-335 II.23.1.11)
pub mod MethodImplAttributes {
    /// Mask for the code type bits
    pub const CODE_TYPE_MASK: u16 = 0x0003;
    /// Method body is CIL
    pub const IL: u16 = 0x0000;
    /// Method body is native
    pub const NATIVE: u16 = 0x0001;
    /// Method body is provided by the runtime
    pub const RUNTIME: u16 = 0x0003;
    /// Method is unmanaged
    pub const UNMANAGED: u16 = 0x0004;
    /// Method cannot be inlined
    pub const NO_INLINING: u16 = 0x0008;
    /// Method is a forward reference
    pub const FORWARD_REF: u16 = 0x0010;
    /// Method is single threaded through the body
    pub const SYNCHRONIZED: u16 = 0x0020;
    /// Method signature is exported exactly as declared
    pub const PRESERVE_SIG: u16 = 0x0080;
    /// Method is implemented inside the runtime
    pub const INTERNAL_CALL: u16 = 0x1000;
    /// Method should be inlined if possible
    pub const AGGRESSIVE_INLINING: u16 = 0x0100;
    /// Method may not be optimized
    pub const NO_OPTIMIZATION: u16 = 0x0040;
}

/// `Field.Flags` (ECMA-335 II.23.1.5)
pub mod FieldAttributes {
    /// Mask for the access bits
    pub const FIELD_ACCESS_MASK: u16 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u16 = 0x0001;
    /// Accessible by anyone in the assembly
    pub const ASSEMBLY: u16 = 0x0003;
    /// Accessible only by type and sub-types
    pub const FAMILY: u16 = 0x0004;
    /// Accessible by anyone
    pub const PUBLIC: u16 = 0x0006;
    /// Defined on the type, not per instance
    pub const STATIC: u16 = 0x0010;
    /// Only initialized, not written after
    pub const INIT_ONLY: u16 = 0x0020;
    /// Value is a compile time constant
    pub const LITERAL: u16 = 0x0040;
    /// Field does not need to be serialized
    pub const NOT_SERIALIZED: u16 = 0x0080;
    /// Name is special
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// Implementation is forwarded through P/Invoke
    pub const PINVOKE_IMPL: u16 = 0x2000;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    /// Field has marshalling information
    pub const HAS_FIELD_MARSHAL: u16 = 0x1000;
    /// Field has a default value
    pub const HAS_DEFAULT: u16 = 0x8000;
    /// Field has an RVA
    pub const HAS_FIELD_RVA: u16 = 0x0100;
}

/// `Param.Flags` (ECMA-335 II.23.1.13)
pub mod ParamAttributes {
    /// Parameter is `[in]`
    pub const IN: u16 = 0x0001;
    /// Parameter is `[out]`
    pub const OUT: u16 = 0x0002;
    /// Parameter is optional
    pub const OPTIONAL: u16 = 0x0010;
    /// Parameter has a default value
    pub const HAS_DEFAULT: u16 = 0x1000;
    /// Parameter has marshalling information
    pub const HAS_FIELD_MARSHAL: u16 = 0x2000;
}

/// `Property.Flags` (ECMA-335 II.23.1.14)
pub mod PropertyAttributes {
    /// Name is special
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    /// Property has a default value
    pub const HAS_DEFAULT: u16 = 0x1000;
}

/// `Event.EventFlags` (ECMA-335 II.23.1.4)
pub mod EventAttributes {
    /// Name is special
    pub const SPECIAL_NAME: u16 = 0x0200;
    /// Runtime should check the name encoding
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
}

/// `MethodSemantics.Semantics` (ECMA-335 II.23.1.12)
pub mod MethodSemanticsAttributes {
    /// Property setter
    pub const SETTER: u16 = 0x0001;
    /// Property getter
    pub const GETTER: u16 = 0x0002;
    /// Other accessor of a property or event
    pub const OTHER: u16 = 0x0004;
    /// Event add-on method
    pub const ADD_ON: u16 = 0x0008;
    /// Event remove-on method
    pub const REMOVE_ON: u16 = 0x0010;
    /// Event fire method
    pub const FIRE: u16 = 0x0020;
}

/// `GenericParam.Flags` (ECMA-335 II.23.1.7)
pub mod GenericParamAttributes {
    /// Parameter is covariant
    pub const COVARIANT: u16 = 0x0001;
    /// Parameter is contravariant
    pub const CONTRAVARIANT: u16 = 0x0002;
    /// Argument must be a reference type
    pub const REFERENCE_TYPE_CONSTRAINT: u16 = 0x0004;
    /// Argument must be a non-nullable value type
    pub const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT: u16 = 0x0008;
    /// Argument must have a public default constructor
    pub const DEFAULT_CONSTRUCTOR_CONSTRAINT: u16 = 0x0010;
}

/// `ImplMap.MappingFlags` (ECMA-335 II.23.1.8)
pub mod PInvokeAttributes {
    /// Use the member name as specified
    pub const NO_MANGLE: u16 = 0x0001;
    /// Marshal strings as ANSI
    pub const CHAR_SET_ANSI: u16 = 0x0002;
    /// Marshal strings as UTF-16
    pub const CHAR_SET_UNICODE: u16 = 0x0004;
    /// Marshal strings as platform dependent
    pub const CHAR_SET_AUTO: u16 = 0x0006;
    /// Best-fit mapping enabled
    pub const BEST_FIT_ENABLED: u16 = 0x0010;
    /// Best-fit mapping disabled
    pub const BEST_FIT_DISABLED: u16 = 0x0020;
    /// Throw on unmappable characters
    pub const THROW_ON_UNMAPPABLE_ENABLED: u16 = 0x1000;
    /// Do not throw on unmappable characters
    pub const THROW_ON_UNMAPPABLE_DISABLED: u16 = 0x2000;
    /// Callee calls `SetLastError`
    pub const SUPPORTS_LAST_ERROR: u16 = 0x0040;
    /// Platform default calling convention
    pub const CALL_CONV_WINAPI: u16 = 0x0100;
    /// cdecl calling convention
    pub const CALL_CONV_CDECL: u16 = 0x0200;
    /// stdcall calling convention
    pub const CALL_CONV_STDCALL: u16 = 0x0300;
    /// thiscall calling convention
    pub const CALL_CONV_THISCALL: u16 = 0x0400;
    /// fastcall calling convention
    pub const CALL_CONV_FASTCALL: u16 = 0x0500;
}

/// `Assembly.Flags` and `AssemblyRef.Flags` (ECMA-335 II.23.1.2)
pub mod AssemblyFlags {
    /// The public key column holds the full key
    pub const PUBLIC_KEY: u32 = 0x0001;
    /// Assembly may be retargeted
    pub const RETARGETABLE: u32 = 0x0100;
    /// JIT tracking is disabled
    pub const DISABLE_JIT_COMPILE_OPTIMIZER: u32 = 0x4000;
    /// JIT tracking is enabled
    pub const ENABLE_JIT_COMPILE_TRACKING: u32 = 0x8000;
}

/// `ManifestResource.Flags` (ECMA-335 II.23.1.9)
pub mod ManifestResourceAttributes {
    /// Resource is exported from the assembly
    pub const PUBLIC: u32 = 0x0001;
    /// Resource is private to the assembly
    pub const PRIVATE: u32 = 0x0002;
}

/// `File.Flags` (ECMA-335 II.23.1.6)
pub mod FileAttributes {
    /// File contains metadata
    pub const CONTAINS_METADATA: u32 = 0x0000;
    /// File does not contain metadata
    pub const CONTAINS_NO_METADATA: u32 = 0x0001;
}

/// Declarative security actions for `DeclSecurity.Action` (ECMA-335 II.22.11)
pub mod SecurityAction {
    /// Demand
    pub const DEMAND: u16 = 0x0002;
    /// Assert
    pub const ASSERT: u16 = 0x0003;
    /// Deny
    pub const DENY: u16 = 0x0004;
    /// PermitOnly
    pub const PERMIT_ONLY: u16 = 0x0005;
    /// LinkDemand
    pub const LINK_DEMAND: u16 = 0x0006;
    /// InheritanceDemand
    pub const INHERITANCE_DEMAND: u16 = 0x0007;
    /// RequestMinimum
    pub const REQUEST_MINIMUM: u16 = 0x0008;
    /// RequestOptional
    pub const REQUEST_OPTIONAL: u16 = 0x0009;
    /// RequestRefuse
    pub const REQUEST_REFUSE: u16 = 0x000A;
}
