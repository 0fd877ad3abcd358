// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0


#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # dotemit
//!
//! A builder for .NET assemblies: metadata tables, heaps and CIL method bodies produced from an
//! in-memory object model, following the ECMA-335 binary format. Built in pure Rust, without
//! the .NET runtime.
//!
//! ## Features
//!
//! - **🏗️ Builder object model** - assemblies, modules, types, methods, fields, properties,
//!   events and generic parameters staged in an arena and referenced by typed ids
//! - **⚙️ IL generation** - labels, locals, exception blocks, stack height tracking and
//!   automatic short/long branch selection
//! - **🔗 Forward references** - pending tokens let IL and attributes refer to members that
//!   have no row yet; every placeholder is patched at bake time
//! - **📦 Complete heaps** - deduplicating `#Strings`, `#US`, `#GUID` and `#Blob` heaps
//! - **🏷️ Custom attributes** - value blobs plus pseudo-attributes lowered to flags and tables
//!
//! ## Quick Start
//!
//! ```rust
//! use dotemit::prelude::*;
//!
//! let mut module = ModuleBuilder::new("Hello.dll", BuilderConfig::default())?;
//! let program = module.define_type("Hello", "Program", TypeAttributes::PUBLIC, None)?;
//! let main = module.define_method(
//!     program,
//!     "Main",
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//!     SignatureMethod::static_method(TypeSignature::Void, Vec::new()),
//! )?;
//!
//! let mut il = module.il_generator(main)?;
//! il.emit_string("Hello")?;
//! il.emit(OpCode::POP)?;
//! il.emit(OpCode::RET)?;
//!
//! module.set_entry_point(main)?;
//! let emitted = module.bake()?;
//! assert_eq!(emitted.tables.type_def.len(), 2);
//! assert!(emitted.entry_point.is_some());
//! # Ok::<(), dotemit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`builder`] - the object model, IL emitters and the bake pipeline
//! - [`assembly`] - opcodes and the [`assembly::ILGenerator`]
//! - [`metadata`] - heaps, tables, signatures, custom attributes and method body encoding
//! - [`utils`] - byte buffers and compressed integer encoding
//! - [`Error`] and [`Result`] - error handling
//!
//! Nothing is written to disk: [`builder::EmittedModule`] carries the finished tables, heap
//! images and IL for a PE writer to lay out.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade. Bake phases are reported at `debug`, per-body
//! layout details at `trace`. Install any logger, e.g. `env_logger`, to see them.
//!
//! ## Standards Compliance
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Official CLI specification

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotemit::prelude::*;
///
/// let module = ModuleBuilder::new("Empty.dll", BuilderConfig::default())?;
/// assert_eq!(module.name(), "Empty.dll");
/// # Ok::<(), dotemit::Error>(())
/// ```
pub mod prelude;

/// CIL opcodes and instruction generation based on ECMA-335 Partition III
pub mod assembly;

/// The builder object model and the bake pipeline
pub mod builder;

/// Binary encoding of ECMA-335 metadata
pub mod metadata;

/// Byte buffers, parsers and compressed integers
pub mod utils;

/// `dotemit` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotemit` Error type
///
/// Every fallible operation of the crate reports its failure through this type.
pub use error::Error;
