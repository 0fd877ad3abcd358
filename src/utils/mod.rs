//! Low-level encoding utilities shared by the metadata encoders.
//!
//! - [`ByteBuffer`] - growable little-endian writer with positional patching
//! - [`Parser`] - bounds-checked reader used to decode emitted data
//! - [`compression`] - ECMA-335 compressed integers
//! - [`io`] - the [`io::CilIO`] primitive encoding trait

mod buffer;
pub mod compression;
pub mod io;
mod parser;

pub use buffer::ByteBuffer;
pub use compression::{compress_uint, compressed_uint_size, write_compressed_int, write_compressed_uint};
pub use parser::Parser;
