//! ECMA-335 metadata encoding.
//!
//! Everything the builders need to express a module in its binary form, independent of how
//! the module was staged:
//!
//! - [`heaps`] - the `#Strings`, `#US`, `#GUID` and `#Blob` heaps with deduplication
//! - [`tables`] - table ids, coded indices, row structs and the finalized row store
//! - [`signatures`] - signature types and their blob encoders
//! - [`customattributes`] - custom attribute values, pseudo-attributes and marshal descriptors
//! - [`method`] - tiny and fat method body headers, exception sections
//! - [`token`] - metadata tokens and pending tokens
//!
//! # Reference
//! * [ECMA-335 Partition II](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Definition and Semantics

/// Custom attribute values, pseudo-attributes and marshalling descriptors
pub mod customattributes;
/// The four metadata heaps
pub mod heaps;
/// Method body headers and exception handling sections
pub mod method;
/// Method, field, property and type signatures
pub mod signatures;
/// Metadata tables, coded indices and rows
pub mod tables;
/// Metadata tokens
pub mod token;
