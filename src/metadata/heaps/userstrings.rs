use std::collections::HashMap;

use widestring::U16String;

use crate::{
    utils::{write_compressed_uint, Parser},
    Error, Result,
};

/// Largest `#US` offset that still fits the 24-bit row part of a `0x70` token.
const MAX_USER_STRING_INDEX: usize = 0x00FF_FFFF;

/// The `#US` heap: length-prefixed UTF-16 literals referenced by `ldstr`.
///
/// Each entry is the compressed byte length (UTF-16 bytes plus one), the UTF-16LE code units,
/// and a terminal byte set to 1 when any code unit needs more than plain ASCII handling
/// (ECMA-335 II.24.2.4). Entries are deduplicated within this heap only.
#[derive(Debug, Clone)]
pub struct UserStringHeap {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl UserStringHeap {
    /// Create a heap holding only the reserved empty entry.
    #[must_use]
    pub fn new() -> Self {
        UserStringHeap {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Intern `value`, returning its heap index.
    ///
    /// # Errors
    /// Returns [`Error::HeapFull`] once offsets no longer fit a user string token.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(&existing) = self.index.get(value) {
            return Ok(existing);
        }

        let offset = self.data.len();
        if offset > MAX_USER_STRING_INDEX {
            return Err(Error::HeapFull("#US"));
        }

        let wide = U16String::from_str(value);
        let units = wide.as_slice();
        let byte_len = u32::try_from(units.len() * 2 + 1).map_err(|_| Error::HeapFull("#US"))?;

        write_compressed_uint(byte_len, &mut self.data)?;
        for unit in units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data
            .push(u8::from(units.iter().any(|&unit| needs_special_handling(unit))));

        let offset = offset as u32;
        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Decode the literal at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` does not point at a valid entry.
    pub fn get(&self, index: u32) -> Result<String> {
        let mut parser = Parser::new(&self.data);
        parser.seek(index as usize)?;
        let byte_len = parser.read_compressed_uint()? as usize;
        if byte_len == 0 {
            return Ok(String::new());
        }

        let bytes = parser.read_bytes(byte_len - 1)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        U16String::from_vec(units)
            .to_string()
            .map_err(|e| malformed_error!("Invalid UTF-16 user string at {}: {}", index, e))
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if only the reserved entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    }

    /// The heap image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for UserStringHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// ECMA-335 II.24.2.4: the terminal byte is 1 if any code unit has a non-zero high byte or its
/// low byte is one of 0x01-0x08, 0x0E-0x1F, 0x27, 0x2D or 0x7F.
fn needs_special_handling(unit: u16) -> bool {
    if unit > 0xFF {
        return true;
    }
    matches!(unit as u8, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_plain_ascii() -> Result<()> {
        let mut heap = UserStringHeap::new();
        let index = heap.add("Hi")?;
        assert_eq!(index, 1);
        assert_eq!(heap.as_bytes(), &[0x00, 0x05, b'H', 0x00, b'i', 0x00, 0x00]);
        assert_eq!(heap.get(index)?, "Hi");
        Ok(())
    }

    #[test]
    fn special_flag() -> Result<()> {
        let mut heap = UserStringHeap::new();
        let index = heap.add("it's")?;
        assert_eq!(*heap.as_bytes().last().unwrap(), 1);
        assert_eq!(heap.get(index)?, "it's");

        let wide = heap.add("\u{00e9}\u{4e2d}")?;
        assert_eq!(*heap.as_bytes().last().unwrap(), 1);
        assert_eq!(heap.get(wide)?, "\u{00e9}\u{4e2d}");
        Ok(())
    }

    #[test]
    fn dedup() -> Result<()> {
        let mut heap = UserStringHeap::new();
        let a = heap.add("hello")?;
        let b = heap.add("world")?;
        assert_ne!(a, b);
        assert_eq!(heap.add("hello")?, a);

        let empty = heap.add("")?;
        assert_eq!(heap.get(empty)?, "");
        Ok(())
    }
}
