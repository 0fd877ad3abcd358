use std::collections::HashMap;

use crate::Result;

/// The `#Strings` heap: NUL-terminated UTF-8 identifiers, deduplicated by exact equality.
///
/// Index 0 is the empty string. The heap is append-only, so an index handed out once stays
/// valid for the lifetime of the module.
///
/// ```rust
/// use dotemit::metadata::heaps::StringHeap;
///
/// let mut strings = StringHeap::new();
/// let first = strings.add("Add")?;
/// assert_eq!(strings.add("Add")?, first);
/// assert_eq!(strings.get(first), Some("Add"));
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct StringHeap {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl StringHeap {
    /// Create a heap holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        StringHeap {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Intern `value`, returning its heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` contains a NUL character.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(&existing) = self.index.get(value) {
            return Ok(existing);
        }
        if value.contains('\0') {
            return Err(malformed_error!(
                "Identifier '{}' contains an embedded NUL",
                value.escape_debug()
            ));
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Read the string starting at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&str> {
        let start = index as usize;
        let tail = self.data.get(start..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&tail[..end]).ok()
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if only the empty string is present.
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

impl Default for StringHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_and_layout() -> Result<()> {
        let mut heap = StringHeap::new();
        assert_eq!(heap.add("")?, 0);
        let a = heap.add("Object")?;
        let b = heap.add("System")?;
        assert_eq!(a, 1);
        assert_eq!(b, 8);
        assert_eq!(heap.add("Object")?, a);
        assert_eq!(heap.as_bytes(), b"\0Object\0System\0");
        assert_eq!(heap.get(b), Some("System"));
        assert_eq!(heap.get(0), Some(""));
        assert_eq!(heap.get(100), None);
        Ok(())
    }

    #[test]
    fn rejects_nul() {
        let mut heap = StringHeap::new();
        assert!(heap.add("a\0b").is_err());
    }
}
