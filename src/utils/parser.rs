//! Cursor-based reader for emitted metadata.
//!
//! The builders only ever write, but verifying what they wrote needs the inverse operations:
//! decoding signatures in tests, parsing custom attribute blobs back into values, and reading
//! method body headers. [`Parser`] is a bounds-checked cursor over a byte slice with the
//! ECMA-335 specific reads those decoders need.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::utils::Parser;
//!
//! let data = [0x20, 0x02, 0x08, 0x08, 0x08];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_le::<u8>()?, 0x20);
//! assert_eq!(parser.read_compressed_uint()?, 2);
//! # Ok::<(), dotemit::Error>(())
//! ```

use crate::{
    metadata::{tables::TableId, token::Token},
    utils::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser over `data`, positioned at the start.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Advance the cursor by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if this would move past the end of the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if self.position + step > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position += step;
        Ok(())
    }

    /// Advance the cursor to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position is past the end.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let remainder = self.position % alignment;
        if remainder != 0 {
            self.advance_by(alignment - remainder)?;
        }
        Ok(())
    }

    /// Peek at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Read a little-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read `len` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.position + len > self.data.len() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read a compressed unsigned integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or [`crate::Error::Malformed`]
    /// on an invalid leading byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a compressed signed integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Propagates the errors of [`Parser::read_compressed_uint`].
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let width = match self.peek_byte()? {
            b if b & 0x80 == 0 => 7,
            b if b & 0xC0 == 0x80 => 14,
            _ => 29,
        };
        let raw = self.read_compressed_uint()?;
        let magnitude = (raw >> 1) as i32;

        if raw & 1 == 0 {
            Ok(magnitude)
        } else {
            Ok(magnitude - (1 << (width - 1)))
        }
    }

    /// Read a compressed `TypeDefOrRef` coded index and expand it into a token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid tag.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let value = self.read_compressed_uint()?;
        let table = match value & 0x3 {
            0 => TableId::TypeDef,
            1 => TableId::TypeRef,
            2 => TableId::TypeSpec,
            _ => return Err(malformed_error!("Invalid TypeDefOrRef tag - {}", value & 0x3)),
        };

        Ok(Token::from_parts(table, value >> 2))
    }

    /// Read a NUL-terminated UTF-8 string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let mut end = start;

        while end < self.data.len() && self.data[end] != 0 {
            end += 1;
        }

        let string_data = &self.data[start..end];
        self.position = if end < self.data.len() { end + 1 } else { end };

        String::from_utf8(string_data.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                end,
                e.utf8_error()
            )
        })
    }

    /// Read a custom attribute `SerString`: `0xFF` for null, otherwise a compressed length
    /// followed by UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or [`crate::Error::Malformed`]
    /// for invalid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.position += 1;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| malformed_error!("Invalid SerString at offset {}: {}", start, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_values() -> Result<()> {
        let data = [0x03, 0xAE, 0x57, 0xC0, 0x00, 0x40, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_compressed_uint()?, 0x03);
        assert_eq!(parser.read_compressed_uint()?, 0x2E57);
        assert_eq!(parser.read_compressed_uint()?, 0x4000);
        assert!(!parser.has_more_data());
        Ok(())
    }

    #[test]
    fn compressed_signed_values() -> Result<()> {
        let data = [0x06, 0x7B, 0x80, 0x80, 0x01, 0x80, 0x01, 0xC0, 0x00, 0x00, 0x01];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_compressed_int()?, 3);
        assert_eq!(parser.read_compressed_int()?, -3);
        assert_eq!(parser.read_compressed_int()?, 64);
        assert_eq!(parser.read_compressed_int()?, -64);
        assert_eq!(parser.read_compressed_int()?, -8192);
        assert_eq!(parser.read_compressed_int()?, -268_435_456);
        Ok(())
    }

    #[test]
    fn coded_token() -> Result<()> {
        // TypeRef row 0x12 -> (0x12 << 2) | 1
        let data = [0x49];
        let mut parser = Parser::new(&data);
        let token = parser.read_compressed_token()?;
        assert_eq!(token.value(), 0x0100_0012);
        Ok(())
    }

    #[test]
    fn ser_strings() -> Result<()> {
        let data = [0xFF, 0x03, b'a', b'b', b'c', 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_ser_string()?, None);
        assert_eq!(parser.read_ser_string()?, Some("abc".to_string()));
        assert_eq!(parser.read_ser_string()?, Some(String::new()));
        assert!(parser.read_ser_string().is_err());
        Ok(())
    }

    #[test]
    fn bounds() {
        let data = [0x01, 0x02];
        let mut parser = Parser::new(&data);
        assert!(parser.read_le::<u32>().is_err());
        assert!(parser.read_bytes(3).is_err());
        assert!(parser.seek(3).is_err());
    }
}
