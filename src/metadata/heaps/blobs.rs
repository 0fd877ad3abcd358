use std::collections::HashMap;

use crate::{
    utils::{write_compressed_uint, Parser},
    Result,
};

/// The `#Blob` heap: compressed-length-prefixed byte strings, deduplicated by content.
///
/// Signatures, constants, custom attribute values and marshalling descriptors all live here.
/// Index 0 is the empty blob.
#[derive(Debug, Clone)]
pub struct BlobHeap {
    data: Vec<u8>,
    index: HashMap<Vec<u8>, u32>,
}

impl BlobHeap {
    /// Create a heap holding only the empty blob.
    #[must_use]
    pub fn new() -> Self {
        BlobHeap {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Intern `blob`, returning its heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob is too large for a compressed length.
    pub fn add(&mut self, blob: &[u8]) -> Result<u32> {
        if blob.is_empty() {
            return Ok(0);
        }
        if let Some(&existing) = self.index.get(blob) {
            return Ok(existing);
        }

        let offset = self.data.len() as u32;
        let len = u32::try_from(blob.len())
            .map_err(|_| malformed_error!("Blob of {} bytes is too large", blob.len()))?;
        write_compressed_uint(len, &mut self.data)?;
        self.data.extend_from_slice(blob);
        self.index.insert(blob.to_vec(), offset);
        Ok(offset)
    }

    /// Read the blob at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` does not point at a valid entry.
    pub fn get(&self, index: u32) -> Result<&[u8]> {
        let mut parser = Parser::new(&self.data);
        parser.seek(index as usize)?;
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if only the empty blob is present.
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

impl Default for BlobHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_shares_an_index() -> Result<()> {
        let mut heap = BlobHeap::new();
        let sig = [0x20, 0x02, 0x08, 0x08, 0x08];
        let a = heap.add(&sig)?;
        let b = heap.add(&[0x06, 0x08])?;
        assert_ne!(a, b);
        assert_eq!(heap.add(&sig)?, a);
        assert_eq!(heap.get(a)?, &sig);
        assert_eq!(heap.as_bytes(), &[0, 5, 0x20, 0x02, 0x08, 0x08, 0x08, 2, 0x06, 0x08]);
        Ok(())
    }

    #[test]
    fn long_blobs_use_two_byte_lengths() -> Result<()> {
        let mut heap = BlobHeap::new();
        let blob = vec![0xAB; 200];
        let index = heap.add(&blob)?;
        assert_eq!(&heap.as_bytes()[1..3], &[0x80, 200]);
        assert_eq!(heap.get(index)?.len(), 200);
        assert_eq!(heap.add(&[])?, 0);
        Ok(())
    }
}
