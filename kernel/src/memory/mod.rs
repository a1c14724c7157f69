//! Memory management subsystem.
//!
//! # Components
//!
//! - **TranslationEntry**: one record type for page-table entries and TLB slots
//! - **FramePool**: physical frame allocator
//! - **BackingStore**: home of evicted page images
//! - **Replacement**: victim selection shared by the TLB and the page table
//! - **AddressSpace**: per-program page table and translation scheme
//! - **Mmu**: translation, TLB reload and demand paging

pub mod address_space;
pub mod backing_store;
pub mod frame;
pub mod mmu;
pub mod replacement;
pub mod translate;

pub use address_space::{AddressSpace, TranslationScheme};
pub use backing_store::BackingStore;
pub use frame::FramePool;
pub use mmu::{Mmu, MmuStats};
pub use replacement::{select_victim, ReplacementStrategy};
pub use translate::{DiskAddress, EntryFlags, TranslationEntry};
