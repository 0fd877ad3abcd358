//! The builder object model: assemblies, modules, types and members under construction.
//!
//! A module is a single arena owning every type, method, field, parameter, property, event
//! and generic parameter defined in it. The public API hands out typed ids ([`TypeId`],
//! [`MethodId`], ...) instead of references, so entities can refer to each other before they
//! have rows. Rows are assigned in one pass when the module is baked:
//!
//! - [`ModuleBuilder`] - defines types and members, hands out IL emitters and bakes
//! - [`IlEmitter`] - writes the body of one method, binding tokens to the module
//! - [`AssemblyBuilder`] - wraps a module with the assembly manifest
//! - [`EmittedModule`] - the frozen tables, heaps and IL a PE writer consumes
//!
//! References from IL or attributes to entities without a row use pending tokens. The
//! [`TokenTable`] maps each pending id to its real token at bake time and patches every
//! recorded placeholder in the IL stream.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::assembly::OpCode;
//! use dotemit::builder::{BuilderConfig, ModuleBuilder};
//! use dotemit::metadata::signatures::{SignatureMethod, TypeSignature};
//! use dotemit::metadata::tables::attributes::{MethodAttributes, TypeAttributes};
//!
//! let mut module = ModuleBuilder::new("Calc.dll", BuilderConfig::default())?;
//! let calc = module.define_type("Calc", "Math", TypeAttributes::PUBLIC, None)?;
//! let add = module.define_method(
//!     calc,
//!     "Add",
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//!     SignatureMethod::static_method(TypeSignature::I4, vec![TypeSignature::I4, TypeSignature::I4]),
//! )?;
//!
//! let mut il = module.il_generator(add)?;
//! il.emit(OpCode::LDARG_0)?;
//! il.emit(OpCode::LDARG_1)?;
//! il.emit(OpCode::ADD)?;
//! il.emit(OpCode::RET)?;
//!
//! let emitted = module.bake()?;
//! assert_eq!(emitted.method_code(1)?, &[0x02, 0x03, 0x58, 0x2A]);
//! # Ok::<(), dotemit::Error>(())
//! ```

mod assembly;
mod bake;
mod config;
mod constant;
mod emitter;
mod entities;
mod identity;
mod ids;
mod members;
mod module;
mod output;
mod scope;
mod tokens;
mod traits;

pub use assembly::AssemblyBuilder;
pub use config::BuilderConfig;
pub use constant::ConstantValue;
pub use emitter::IlEmitter;
pub use identity::{
    hash_with, public_key_token, AssemblyHashAlgorithm, AssemblyName, AssemblyRefInfo,
    AssemblyVersion,
};
pub use ids::{
    AttributeTarget, EventId, FieldId, FieldTarget, GenericParamId, MethodId, MethodTarget,
    ParamId, PropertyId, SemanticsOwner, TypeId,
};
pub use module::ModuleBuilder;
pub use output::EmittedModule;
pub use tokens::{TokenCheckpoint, TokenFixup, TokenTable};
pub use traits::{Bakeable, HasSignature, HasToken};
