//! User address spaces.

use serde::{Deserialize, Serialize};

use super::translate::TranslationEntry;
use crate::config::{NEXT_PC_REG, NUM_TOTAL_REGS, PAGE_SIZE, PC_REG, STACK_REG};

/// Where the MMU looks up translations for an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationScheme {
    /// Linear page table indexed by virtual page number.
    #[default]
    PageTable,
    /// Software-loaded TLB backed by the page table.
    Tlb,
}

/// The page table of one user program.
///
/// Pages start out non-resident and are brought in on first touch.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    page_table: Vec<TranslationEntry>,
    scheme: TranslationScheme,
}

impl AddressSpace {
    /// Create an address space of `num_pages` non-resident pages.
    pub fn new(num_pages: usize, scheme: TranslationScheme) -> Self {
        AddressSpace {
            page_table: (0..num_pages).map(TranslationEntry::new).collect(),
            scheme,
        }
    }

    /// Install a resident mapping directly.
    pub fn map(&mut self, virtual_page: usize, frame: usize, read_only: bool) {
        if let Some(entry) = self.page_table.get_mut(virtual_page) {
            *entry = TranslationEntry::mapped(virtual_page, frame, read_only);
        }
    }

    /// Make an existing page read-only.
    pub fn protect(&mut self, virtual_page: usize) {
        if let Some(entry) = self.page_table.get_mut(virtual_page) {
            entry.flags.insert(super::EntryFlags::READ_ONLY);
        }
    }

    pub fn entry(&self, virtual_page: usize) -> Option<&TranslationEntry> {
        self.page_table.get(virtual_page)
    }

    pub fn entry_mut(&mut self, virtual_page: usize) -> Option<&mut TranslationEntry> {
        self.page_table.get_mut(virtual_page)
    }

    pub fn entries(&self) -> &[TranslationEntry] {
        &self.page_table
    }

    pub fn entries_mut(&mut self) -> &mut [TranslationEntry] {
        &mut self.page_table
    }

    /// Get the number of virtual pages.
    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    /// Get the size in bytes.
    pub fn size(&self) -> usize {
        self.page_table.len() * PAGE_SIZE
    }

    /// Get the translation scheme.
    pub fn scheme(&self) -> TranslationScheme {
        self.scheme
    }

    /// Number of resident pages.
    pub fn resident_pages(&self) -> usize {
        self.page_table.iter().filter(|e| e.is_valid()).count()
    }

    /// Initial user register file: execution starts at address 0 and the
    /// stack pointer sits just below the top of the space.
    pub fn init_registers(&self) -> [i32; NUM_TOTAL_REGS] {
        let mut registers = [0; NUM_TOTAL_REGS];
        registers[PC_REG] = 0;
        registers[NEXT_PC_REG] = 4;
        registers[STACK_REG] = self.size() as i32 - 16;
        registers
    }
}
