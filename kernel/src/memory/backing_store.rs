//! Backing store for evicted pages.
//!
//! Page images are kept in memory, keyed by disk address. Reads and writes
//! are counted so they can be reported as disk traffic.

use hashbrown::HashMap;

use super::translate::DiskAddress;

/// Simulated swap area.
#[derive(Debug, Default)]
pub struct BackingStore {
    images: HashMap<DiskAddress, Box<[u8]>>,
    next_address: u32,
    reads: u64,
    writes: u64,
}

impl BackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a page image and return its address.
    pub fn store(&mut self, image: &[u8]) -> DiskAddress {
        let address = DiskAddress(self.next_address);
        self.next_address = self.next_address.wrapping_add(1);
        self.images.insert(address, image.into());
        self.writes += 1;
        address
    }

    /// Remove a stored image, copying it into `buf`.
    pub fn take(&mut self, address: DiskAddress, buf: &mut [u8]) -> bool {
        match self.images.remove(&address) {
            Some(image) => {
                buf.copy_from_slice(&image);
                self.reads += 1;
                true
            }
            None => false,
        }
    }

    /// Drop an image without reading it.
    pub fn discard(&mut self, address: DiskAddress) {
        self.images.remove(&address);
    }

    pub fn contains(&self, address: DiskAddress) -> bool {
        self.images.contains_key(&address)
    }

    /// Number of images currently stored.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Get the number of page reads.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Get the number of page writes.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_removes_image() {
        let mut store = BackingStore::new();
        let addr = store.store(&[1, 2, 3, 4]);
        assert!(store.contains(addr));

        let mut buf = [0u8; 4];
        assert!(store.take(addr, &mut buf));
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(store.is_empty());
        assert!(!store.take(addr, &mut buf));
        assert_eq!((store.reads(), store.writes()), (1, 1));
    }

    #[test]
    fn test_addresses_are_distinct() {
        let mut store = BackingStore::new();
        let a = store.store(&[0]);
        let b = store.store(&[0]);
        assert_ne!(a, b);
        store.discard(a);
        assert_eq!(store.len(), 1);
    }
}
