use uguid::Guid;

/// The `#GUID` heap: 16-byte entries addressed by 1-based index.
///
/// Adding a GUID that is already present returns its existing index.
#[derive(Debug, Clone, Default)]
pub struct GuidHeap {
    entries: Vec<Guid>,
}

impl GuidHeap {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `guid`, returning its 1-based index.
    pub fn add(&mut self, guid: Guid) -> u32 {
        if let Some(position) = self.entries.iter().position(|entry| *entry == guid) {
            return position as u32 + 1;
        }

        self.entries.push(guid);
        self.entries.len() as u32
    }

    /// The GUID at 1-based `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<Guid> {
        let slot = (index as usize).checked_sub(1)?;
        self.entries.get(slot).copied()
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() * 16
    }

    /// Returns `true` if the heap holds no GUIDs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The heap image.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|guid| guid.to_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_one_based_and_deduplicated() {
        let mut heap = GuidHeap::new();
        let a = uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let b = uguid::guid!("aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa");

        assert_eq!(heap.add(a), 1);
        assert_eq!(heap.add(b), 2);
        assert_eq!(heap.add(a), 1);
        assert_eq!(heap.len(), 32);
        assert_eq!(heap.get(2), Some(b));
        assert_eq!(heap.get(0), None);
        assert_eq!(&heap.to_bytes()[..16], &a.to_bytes());
    }
}
