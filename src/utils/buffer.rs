//! Growable byte buffer used by every encoder in the crate.
//!
//! [`ByteBuffer`] is an append-oriented little-endian writer with a few operations the
//! metadata encoders need beyond `Vec<u8>`:
//!
//! - positional overwrites for patching branch displacements and tokens after the fact
//! - alignment padding for fat method headers and exception sections
//! - compressed-integer writes, including inserting one at an earlier position and shifting
//!   the tail (used to patch a parameter count whose final value is only known later)
//!
//! # Examples
//!
//! ```rust
//! use dotemit::utils::ByteBuffer;
//!
//! let mut buffer = ByteBuffer::new();
//! buffer.write_u8(0x20);
//! let count_at = buffer.len();
//! buffer.write_u8(0x08);
//! buffer.insert_compressed_uint(count_at, 1)?;
//! assert_eq!(buffer.as_slice(), &[0x20, 0x01, 0x08]);
//! # Ok::<(), dotemit::Error>(())
//! ```

use crate::{
    utils::{
        compression::{write_compressed_int, write_compressed_uint},
        io::{write_le_at, CilIO},
    },
    Result,
};

/// Growable little-endian byte buffer with positional patching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, returning the written bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Appends a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.write_le(value);
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.write_le(value);
    }

    /// Appends any primitive value in little-endian order.
    pub fn write_le<T: CilIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends a compressed unsigned integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` exceeds the encodable range.
    pub fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        write_compressed_uint(value, &mut self.data)
    }

    /// Appends a compressed signed integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` exceeds the encodable range.
    pub fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        write_compressed_int(value, &mut self.data)
    }

    /// Inserts a compressed unsigned integer at `position`, shifting the tail right by the
    /// encoded width.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `position` is past the end, or
    /// [`crate::Error::Malformed`] if `value` is not encodable.
    pub fn insert_compressed_uint(&mut self, position: usize, value: u32) -> Result<()> {
        if position > self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        let mut encoded = Vec::with_capacity(4);
        write_compressed_uint(value, &mut encoded)?;
        self.data.splice(position..position, encoded);
        Ok(())
    }

    /// Overwrites a little-endian value at an absolute `position`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `position`.
    pub fn patch_le<T: CilIO>(&mut self, position: usize, value: T) -> Result<()> {
        let mut offset = position;
        write_le_at(&mut self.data, &mut offset, value)
    }

    /// Overwrites a single byte at `position`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `position` is past the end.
    pub fn patch_u8(&mut self, position: usize, value: u8) -> Result<()> {
        self.patch_le(position, value)
    }

    /// Pads with zero bytes until the length is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        let remainder = self.data.len() % alignment;
        if remainder != 0 {
            self.data.resize(self.data.len() + alignment - remainder, 0);
        }
    }

    /// Truncates the buffer to `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        ByteBuffer { data }
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_little_endian() {
        let mut buffer = ByteBuffer::new();
        buffer.write_u8(0x2A);
        buffer.write_u16(0x0102);
        buffer.write_u32(0x0A0B_0C0D);
        buffer.write_le(-1_i8);
        assert_eq!(
            buffer.as_slice(),
            &[0x2A, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A, 0xFF]
        );
    }

    #[test]
    fn patching_in_place() -> Result<()> {
        let mut buffer = ByteBuffer::new();
        buffer.write_u8(0x28);
        buffer.write_u32(0);
        buffer.patch_le(1, 0x0600_0001_u32)?;
        assert_eq!(buffer.as_slice(), &[0x28, 0x01, 0x00, 0x00, 0x06]);
        assert!(buffer.patch_le(2, 0_u32).is_err());
        Ok(())
    }

    #[test]
    fn insert_shifts_tail_by_encoded_width() -> Result<()> {
        let mut buffer = ByteBuffer::from(vec![0x00, 0x08, 0x08]);
        buffer.insert_compressed_uint(1, 0x100)?;
        assert_eq!(buffer.as_slice(), &[0x00, 0x81, 0x00, 0x08, 0x08]);

        buffer.insert_compressed_uint(buffer.len(), 1)?;
        assert_eq!(buffer.len(), 6);
        assert!(buffer.insert_compressed_uint(10, 1).is_err());
        Ok(())
    }

    #[test]
    fn alignment() {
        let mut buffer = ByteBuffer::from(vec![1, 2, 3, 4, 5]);
        buffer.align(4);
        assert_eq!(buffer.len(), 8);
        buffer.align(4);
        assert_eq!(buffer.len(), 8);
    }
}
