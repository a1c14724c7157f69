//! Memory management unit.
//!
//! Owns physical memory, the frame pool, the TLB and the backing store.
//! Address spaces are passed in explicitly; the MMU itself holds no notion
//! of which thread is running.

use super::address_space::{AddressSpace, TranslationScheme};
use super::backing_store::BackingStore;
use super::frame::FramePool;
use super::replacement::{self, ReplacementStrategy};
use super::translate::{EntryFlags, TranslationEntry};
use crate::config::PAGE_SIZE;
use crate::error::Fault;

/// Translation and paging counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmuStats {
    pub translations: u64,
    pub tlb_misses: u64,
    pub page_faults: u64,
    pub evictions: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// The simulated MMU and the memory behind it.
#[derive(Debug)]
pub struct Mmu {
    memory: Vec<u8>,
    frames: FramePool,
    tlb: Vec<TranslationEntry>,
    backing_store: BackingStore,
    strategy: ReplacementStrategy,
    stats: MmuStats,
}

impl Mmu {
    /// Create an MMU with `phys_pages` frames and `tlb_size` TLB slots.
    pub fn new(phys_pages: usize, tlb_size: usize, strategy: ReplacementStrategy) -> Self {
        Mmu {
            memory: vec![0; phys_pages * PAGE_SIZE],
            frames: FramePool::new(phys_pages),
            tlb: vec![TranslationEntry::empty(); tlb_size],
            backing_store: BackingStore::new(),
            strategy,
            stats: MmuStats::default(),
        }
    }

    /// Translate a virtual address to a physical one.
    ///
    /// On success the entry's `use` bit is set, and `dirty` as well for a
    /// write. TLB misses and non-resident pages fault with `PageFault`.
    pub fn translate(
        &mut self,
        space: &mut AddressSpace,
        virtual_address: usize,
        size: usize,
        writing: bool,
    ) -> Result<usize, Fault> {
        assert!(
            matches!(size, 1 | 2 | 4),
            "unsupported access size {size}"
        );
        if virtual_address % size != 0 {
            log::trace!("[MMU] unaligned {}-byte access at {:#x}", size, virtual_address);
            return Err(Fault::AddressError);
        }
        self.stats.translations += 1;

        let vpn = virtual_address / PAGE_SIZE;
        let offset = virtual_address % PAGE_SIZE;
        let frame_count = self.frames.total();

        let entry = match space.scheme() {
            TranslationScheme::PageTable => {
                if vpn >= space.num_pages() {
                    return Err(Fault::AddressError);
                }
                let table = space.entries_mut();
                if !table[vpn].is_valid() {
                    return Err(Fault::PageFault);
                }
                replacement::age(table, Some(vpn));
                &mut table[vpn]
            }
            TranslationScheme::Tlb => {
                let slot = self
                    .tlb
                    .iter()
                    .position(|e| e.is_valid() && e.virtual_page == vpn);
                match slot {
                    Some(slot) => {
                        replacement::age(&mut self.tlb, Some(slot));
                        &mut self.tlb[slot]
                    }
                    None => {
                        replacement::age(&mut self.tlb, None);
                        self.stats.tlb_misses += 1;
                        return Err(Fault::PageFault);
                    }
                }
            }
        };

        if entry.is_read_only() && writing {
            return Err(Fault::ReadOnly);
        }
        if entry.physical_page >= frame_count {
            return Err(Fault::BusError);
        }

        entry.flags.insert(EntryFlags::USE);
        if writing {
            entry.flags.insert(EntryFlags::DIRTY);
        }

        let physical = entry.physical_page * PAGE_SIZE + offset;
        log::trace!(
            "[MMU] va {:#x} -> pa {:#x}{}",
            virtual_address,
            physical,
            if writing { " (write)" } else { "" }
        );
        Ok(physical)
    }

    /// Read `size` bytes (1, 2 or 4) at a virtual address, little-endian.
    pub fn read_mem(
        &mut self,
        space: &mut AddressSpace,
        virtual_address: usize,
        size: usize,
    ) -> Result<u32, Fault> {
        let physical = self.translate(space, virtual_address, size, false)?;
        let mut bytes = [0u8; 4];
        bytes[..size].copy_from_slice(&self.memory[physical..physical + size]);
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write the low `size` bytes (1, 2 or 4) of `value`, little-endian.
    pub fn write_mem(
        &mut self,
        space: &mut AddressSpace,
        virtual_address: usize,
        size: usize,
        value: u32,
    ) -> Result<(), Fault> {
        let physical = self.translate(space, virtual_address, size, true)?;
        let bytes = value.to_le_bytes();
        self.memory[physical..physical + size].copy_from_slice(&bytes[..size]);
        Ok(())
    }

    /// Load the page-table entry for `virtual_address` into the TLB.
    ///
    /// The page must be resident; otherwise `PageFault`.
    pub fn reload_tlb(
        &mut self,
        space: &mut AddressSpace,
        virtual_address: usize,
    ) -> Result<(), Fault> {
        let vpn = virtual_address / PAGE_SIZE;
        let entry = *space.entry(vpn).ok_or(Fault::AddressError)?;
        if !entry.is_valid() {
            return Err(Fault::PageFault);
        }

        let slot = replacement::select_victim(&mut self.tlb, self.strategy, |_, _| true)
            .ok_or(Fault::BusError)?;
        self.write_back(space, slot);
        self.tlb[slot] = TranslationEntry { count: 0, ..entry };

        log::debug!("[MMU] TLB slot {} <- vpn {} (frame {})", slot, vpn, entry.physical_page);
        Ok(())
    }

    /// Make the page containing `virtual_address` resident.
    ///
    /// Uses a free frame if there is one, otherwise evicts a resident page
    /// of the same address space to the backing store. A page coming back
    /// from the backing store gets its saved contents; a fresh page is
    /// zero-filled.
    pub fn serve_page_fault(
        &mut self,
        space: &mut AddressSpace,
        virtual_address: usize,
    ) -> Result<(), Fault> {
        let vpn = virtual_address / PAGE_SIZE;
        if vpn >= space.num_pages() {
            return Err(Fault::AddressError);
        }
        if space.entries()[vpn].is_valid() {
            return Ok(());
        }
        self.stats.page_faults += 1;

        let frame = match self.frames.allocate() {
            Some(frame) => frame,
            None => self.evict(space, vpn)?,
        };

        let range = frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE;
        let entry = &mut space.entries_mut()[vpn];
        let restored = match entry.disk_address {
            Some(address) if entry.is_on_disk() => {
                self.backing_store.take(address, &mut self.memory[range.clone()])
            }
            _ => false,
        };
        if !restored {
            self.memory[range].fill(0);
        }

        entry.flags.remove(EntryFlags::ON_DISK | EntryFlags::USE | EntryFlags::DIRTY);
        entry.flags.insert(EntryFlags::VALID);
        entry.disk_address = None;
        entry.physical_page = frame;
        entry.count = 0;

        log::debug!(
            "[MMU] page fault vpn {} -> frame {}{}",
            vpn,
            frame,
            if restored { " (from backing store)" } else { "" }
        );
        Ok(())
    }

    /// Push a resident page of `space` out to the backing store and return
    /// its frame. The faulting page is never chosen.
    fn evict(&mut self, space: &mut AddressSpace, faulting_vpn: usize) -> Result<usize, Fault> {
        let victim = replacement::select_victim(space.entries_mut(), self.strategy, |idx, e| {
            e.is_valid() && idx != faulting_vpn
        })
        .ok_or(Fault::OutOfFrames)?;

        for slot in self.tlb.iter_mut() {
            if slot.is_valid() && slot.virtual_page == victim {
                slot.invalidate();
            }
        }

        let frame = space.entries()[victim].physical_page;
        let address = self
            .backing_store
            .store(&self.memory[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]);

        let entry = &mut space.entries_mut()[victim];
        entry.invalidate();
        entry.flags.insert(EntryFlags::ON_DISK);
        entry.disk_address = Some(address);
        self.stats.evictions += 1;

        log::debug!("[MMU] evicted vpn {} from frame {} to {:?}", victim, frame, address);
        Ok(frame)
    }

    /// Copy the reference bits of a TLB slot back to its page-table entry.
    fn write_back(&mut self, space: &mut AddressSpace, slot: usize) {
        let cached = self.tlb[slot];
        if !cached.is_valid() {
            return;
        }
        if let Some(entry) = space.entry_mut(cached.virtual_page) {
            if entry.is_valid() && entry.physical_page == cached.physical_page {
                entry
                    .flags
                    .insert(cached.flags & (EntryFlags::USE | EntryFlags::DIRTY));
            }
        }
    }

    /// Write back and invalidate every TLB slot.
    pub fn flush_tlb(&mut self, space: &mut AddressSpace) {
        for slot in 0..self.tlb.len() {
            self.write_back(space, slot);
            self.tlb[slot].invalidate();
        }
    }

    /// Invalidate every TLB slot without write-back.
    pub fn invalidate_tlb(&mut self) {
        for slot in self.tlb.iter_mut() {
            slot.invalidate();
        }
    }

    /// Free every frame and backing-store image held by `space`.
    pub fn release(&mut self, space: AddressSpace) {
        let mut freed = 0;
        for entry in space.entries() {
            if entry.is_valid() {
                self.frames.free(entry.physical_page);
                freed += 1;
            }
            if let Some(address) = entry.disk_address {
                self.backing_store.discard(address);
            }
        }
        log::debug!("[MMU] released address space ({} frames)", freed);
    }

    /// Get the counters, including backing-store traffic.
    pub fn stats(&self) -> MmuStats {
        MmuStats {
            disk_reads: self.backing_store.reads(),
            disk_writes: self.backing_store.writes(),
            ..self.stats
        }
    }

    pub fn strategy(&self) -> ReplacementStrategy {
        self.strategy
    }

    pub fn tlb(&self) -> &[TranslationEntry] {
        &self.tlb
    }

    pub fn frames(&self) -> &FramePool {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FramePool {
        &mut self.frames
    }

    pub fn backing_store(&self) -> &BackingStore {
        &self.backing_store
    }

    /// Raw physical memory.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_table_space(pages: usize) -> AddressSpace {
        AddressSpace::new(pages, TranslationScheme::PageTable)
    }

    #[test]
    fn test_translate_sets_use_and_dirty() {
        let mut mmu = Mmu::new(8, 4, ReplacementStrategy::Lru);
        let mut space = page_table_space(4);
        space.map(3, 7, false);
        mmu.frames_mut().mark_used(7);

        let va = 3 * PAGE_SIZE + 8;
        assert_eq!(mmu.translate(&mut space, va, 4, false), Ok(7 * PAGE_SIZE + 8));
        let entry = space.entry(3).copied().expect("entry");
        assert!(entry.is_used());
        assert!(!entry.is_dirty());

        mmu.translate(&mut space, va, 4, true).expect("write");
        assert!(space.entry(3).expect("entry").is_dirty());
    }

    #[test]
    fn test_translate_faults() {
        let mut mmu = Mmu::new(8, 4, ReplacementStrategy::Lru);
        let mut space = page_table_space(2);
        space.map(0, 1, true);
        space.map(1, 42, false);

        assert_eq!(mmu.translate(&mut space, 2, 4, false), Err(Fault::AddressError));
        assert_eq!(mmu.translate(&mut space, 1, 2, false), Err(Fault::AddressError));
        assert_eq!(mmu.translate(&mut space, 3, 1, false), Ok(PAGE_SIZE + 3));
        assert_eq!(mmu.translate(&mut space, 0, 4, true), Err(Fault::ReadOnly));
        assert_eq!(mmu.translate(&mut space, PAGE_SIZE, 4, false), Err(Fault::BusError));
        assert_eq!(
            mmu.translate(&mut space, 2 * PAGE_SIZE, 4, false),
            Err(Fault::AddressError)
        );
    }

    #[test]
    fn test_tlb_miss_then_reload() {
        let mut mmu = Mmu::new(8, 2, ReplacementStrategy::Lru);
        let mut space = AddressSpace::new(4, TranslationScheme::Tlb);
        space.map(2, 5, false);
        mmu.frames_mut().mark_used(5);

        let va = 2 * PAGE_SIZE + 4;
        assert_eq!(mmu.translate(&mut space, va, 4, false), Err(Fault::PageFault));
        assert_eq!(mmu.stats().tlb_misses, 1);

        mmu.reload_tlb(&mut space, va).expect("reload");
        assert_eq!(mmu.translate(&mut space, va, 4, true), Ok(5 * PAGE_SIZE + 4));

        // Page-table entry learns about the write only on write-back.
        assert!(!space.entry(2).expect("entry").is_dirty());
        mmu.flush_tlb(&mut space);
        assert!(space.entry(2).expect("entry").is_dirty());
        assert!(mmu.tlb().iter().all(|e| !e.is_valid()));
    }

    #[test]
    fn test_reload_requires_resident_page() {
        let mut mmu = Mmu::new(8, 2, ReplacementStrategy::Lru);
        let mut space = AddressSpace::new(2, TranslationScheme::Tlb);
        assert_eq!(mmu.reload_tlb(&mut space, 0), Err(Fault::PageFault));
        assert_eq!(
            mmu.reload_tlb(&mut space, 2 * PAGE_SIZE),
            Err(Fault::AddressError)
        );
    }

    #[test]
    fn test_reload_replaces_unused_slot_first() {
        let mut mmu = Mmu::new(8, 2, ReplacementStrategy::Lru);
        let mut space = AddressSpace::new(4, TranslationScheme::Tlb);
        for vpn in 0..3 {
            space.map(vpn, vpn, false);
            mmu.frames_mut().mark_used(vpn);
        }

        mmu.reload_tlb(&mut space, 0).expect("reload");
        mmu.translate(&mut space, 0, 4, false).expect("hit");
        mmu.reload_tlb(&mut space, PAGE_SIZE).expect("reload");
        assert_eq!(mmu.tlb()[1].virtual_page, 1);
        mmu.translate(&mut space, PAGE_SIZE, 4, false).expect("hit");
        mmu.translate(&mut space, PAGE_SIZE, 4, false).expect("hit");

        // Both slots used; slot 0 has aged more.
        mmu.reload_tlb(&mut space, 2 * PAGE_SIZE).expect("reload");
        assert_eq!(mmu.tlb()[0].virtual_page, 2);
        assert_eq!(mmu.tlb()[1].virtual_page, 1);
        assert!(space.entry(0).expect("entry").is_used());
    }

    #[test]
    fn test_page_fault_zero_fills() {
        let mut mmu = Mmu::new(2, 2, ReplacementStrategy::Lru);
        mmu.memory_mut().fill(0xAA);
        let mut space = page_table_space(2);

        assert_eq!(mmu.read_mem(&mut space, 4, 4), Err(Fault::PageFault));
        mmu.serve_page_fault(&mut space, 4).expect("serve");
        assert_eq!(mmu.read_mem(&mut space, 4, 4), Ok(0));
        assert_eq!(mmu.stats().page_faults, 1);
        assert_eq!(mmu.frames().free_count(), 1);
    }

    #[test]
    fn test_eviction_round_trip() {
        let mut mmu = Mmu::new(2, 2, ReplacementStrategy::Lru);
        let mut space = page_table_space(3);

        for vpn in 0..2 {
            let va = vpn * PAGE_SIZE;
            mmu.serve_page_fault(&mut space, va).expect("serve");
            mmu.write_mem(&mut space, va, 4, 0xC0DE_0000 + vpn as u32)
                .expect("write");
        }
        assert_eq!(mmu.frames().free_count(), 0);

        mmu.serve_page_fault(&mut space, 2 * PAGE_SIZE).expect("serve");
        let evicted: Vec<usize> = (0..2)
            .filter(|&vpn| space.entry(vpn).map_or(false, |e| e.is_on_disk()))
            .collect();
        assert_eq!(evicted.len(), 1);
        let victim = evicted[0];
        let entry = space.entry(victim).copied().expect("entry");
        assert!(!entry.is_valid());
        assert!(entry.disk_address.is_some());
        assert_eq!(mmu.stats().evictions, 1);
        assert_eq!(mmu.stats().disk_writes, 1);

        // Bring the victim back; its data survives the trip.
        let va = victim * PAGE_SIZE;
        mmu.serve_page_fault(&mut space, va).expect("serve");
        assert_eq!(mmu.read_mem(&mut space, va, 4), Ok(0xC0DE_0000 + victim as u32));
        let entry = space.entry(victim).copied().expect("entry");
        assert!(!entry.is_on_disk());
        assert_eq!(mmu.stats().disk_reads, 1);
    }

    #[test]
    fn test_no_victim_in_own_space() {
        let mut mmu = Mmu::new(1, 1, ReplacementStrategy::Lru);
        let mut other = page_table_space(1);
        mmu.serve_page_fault(&mut other, 0).expect("serve");

        let mut space = page_table_space(1);
        assert_eq!(mmu.serve_page_fault(&mut space, 0), Err(Fault::OutOfFrames));

        mmu.release(other);
        assert_eq!(mmu.frames().free_count(), 1);
        mmu.serve_page_fault(&mut space, 0).expect("serve");
    }

    #[test]
    fn test_fixed_strategy_evicts_lowest_resident() {
        let mut mmu = Mmu::new(2, 1, ReplacementStrategy::Fixed);
        let mut space = page_table_space(3);
        mmu.serve_page_fault(&mut space, PAGE_SIZE).expect("serve");
        mmu.serve_page_fault(&mut space, 2 * PAGE_SIZE).expect("serve");
        mmu.serve_page_fault(&mut space, 0).expect("serve");
        assert!(space.entry(1).expect("entry").is_on_disk());
        assert!(space.entry(2).expect("entry").is_valid());
    }
}
