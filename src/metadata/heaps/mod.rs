//! The four metadata heaps, write side.
//!
//! All heaps are append-only and content-addressed: adding content that is already present
//! returns the index it was first stored at, so indices are stable once handed out.
//!
//! - [`StringHeap`] - `#Strings`, UTF-8 identifiers
//! - [`UserStringHeap`] - `#US`, UTF-16 literals for `ldstr`
//! - [`GuidHeap`] - `#GUID`, 16-byte identifiers
//! - [`BlobHeap`] - `#Blob`, signatures and other binary values
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.2 - 24.2.5

mod blobs;
mod guids;
mod strings;
mod userstrings;

pub use blobs::BlobHeap;
pub use guids::GuidHeap;
pub use strings::StringHeap;
pub use userstrings::UserStringHeap;
