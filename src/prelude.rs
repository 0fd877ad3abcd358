//! # dotemit Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotemit library. Import this module to get quick access to the essential
//! types for building .NET assemblies.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotemit operations
pub use crate::Error;

/// The result type used throughout dotemit
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Assembly, module and output of the bake
pub use crate::builder::{AssemblyBuilder, BuilderConfig, EmittedModule, IlEmitter, ModuleBuilder};

/// Assembly identity
pub use crate::builder::{AssemblyName, AssemblyRefInfo, AssemblyVersion};

/// Typed handles into a module
pub use crate::builder::{
    EventId, FieldId, FieldTarget, GenericParamId, MethodId, MethodTarget, ParamId, PropertyId,
    TypeId,
};

/// Constant default values
pub use crate::builder::ConstantValue;

// ================================================================================================
// IL Generation
// ================================================================================================

/// Opcodes and the standalone generator
pub use crate::assembly::{ILGenerator, Label, LocalBuilder, OpCode};

// ================================================================================================
// Signatures and Types
// ================================================================================================

/// Signature model
pub use crate::metadata::signatures::{
    CallingConvention, SignatureField, SignatureLocalVariable, SignatureMethod,
    SignatureParameter, SignatureProperty, TypeHandle, TypeName, TypeSignature,
};

/// Metadata tokens
pub use crate::metadata::token::{Token, TokenRef};

// ================================================================================================
// Attributes
// ================================================================================================

/// Custom attributes
pub use crate::metadata::customattributes::{CustomAttributeArgument, CustomAttributeBuilder};

/// Flag constants of the attribute columns
pub use crate::metadata::tables::attributes::{
    EventAttributes, FieldAttributes, GenericParamAttributes, MethodAttributes,
    MethodImplAttributes, ParamAttributes, PropertyAttributes, TypeAttributes,
};
