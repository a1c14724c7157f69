//! Translation entries.
//!
//! The same record type serves as a page-table entry and as a TLB slot.

use bitflags::bitflags;

bitflags! {
    /// Translation entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u8 {
        /// Mapping is usable.
        const VALID = 1 << 0;
        /// Writes through this mapping fault.
        const READ_ONLY = 1 << 1;
        /// Page was referenced since the flag was last cleared.
        const USE = 1 << 2;
        /// Page was written since it was brought in.
        const DIRTY = 1 << 3;
        /// Page contents live in the backing store.
        const ON_DISK = 1 << 4;
    }
}

/// Location of a page image in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiskAddress(pub u32);

/// A virtual-to-physical page mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationEntry {
    pub virtual_page: usize,
    pub physical_page: usize,
    pub flags: EntryFlags,
    /// Aging counter; larger means less recently used.
    pub count: u32,
    /// Backing-store slot, meaningful while `ON_DISK` is set.
    pub disk_address: Option<DiskAddress>,
}

impl TranslationEntry {
    /// An invalid entry.
    pub const fn empty() -> Self {
        TranslationEntry {
            virtual_page: 0,
            physical_page: 0,
            flags: EntryFlags::empty(),
            count: 0,
            disk_address: None,
        }
    }

    /// An invalid entry for `virtual_page`.
    pub const fn new(virtual_page: usize) -> Self {
        TranslationEntry {
            virtual_page,
            ..Self::empty()
        }
    }

    /// A valid mapping of `virtual_page` onto `physical_page`.
    pub fn mapped(virtual_page: usize, physical_page: usize, read_only: bool) -> Self {
        let mut flags = EntryFlags::VALID;
        flags.set(EntryFlags::READ_ONLY, read_only);
        TranslationEntry {
            virtual_page,
            physical_page,
            flags,
            count: 0,
            disk_address: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(EntryFlags::READ_ONLY)
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(EntryFlags::USE)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    pub fn is_on_disk(&self) -> bool {
        self.flags.contains(EntryFlags::ON_DISK)
    }

    /// Drop the mapping and its reference bits.
    pub fn invalidate(&mut self) {
        self.flags
            .remove(EntryFlags::VALID | EntryFlags::USE | EntryFlags::DIRTY);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_entry() {
        let entry = TranslationEntry::mapped(3, 7, true);
        assert!(entry.is_valid());
        assert!(entry.is_read_only());
        assert!(!entry.is_used());
        assert!(!entry.is_dirty());
        assert_eq!(entry.disk_address, None);
    }

    #[test]
    fn test_invalidate_keeps_disk_state() {
        let mut entry = TranslationEntry::mapped(1, 2, false);
        entry.flags |= EntryFlags::USE | EntryFlags::DIRTY | EntryFlags::ON_DISK;
        entry.count = 9;
        entry.invalidate();
        assert!(!entry.is_valid());
        assert!(!entry.is_used());
        assert!(!entry.is_dirty());
        assert!(entry.is_on_disk());
        assert_eq!(entry.count, 0);
    }
}
