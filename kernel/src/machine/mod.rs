//! Simulated CPU.
//!
//! The machine holds the user-visible register file, the MMU and the address
//! space of whichever thread is on the processor.

pub mod context;

use crate::config::{KernelConfig, NEXT_PC_REG, NUM_TOTAL_REGS, PC_REG, PREV_PC_REG};
use crate::error::Fault;
use crate::memory::{AddressSpace, Mmu};

/// Register file plus memory.
#[derive(Debug)]
pub struct Machine {
    registers: [i32; NUM_TOTAL_REGS],
    mmu: Mmu,
    space: Option<AddressSpace>,
}

impl Machine {
    pub fn new(config: &KernelConfig) -> Self {
        Machine {
            registers: [0; NUM_TOTAL_REGS],
            mmu: Mmu::new(config.phys_pages, config.tlb_size, config.replacement),
            space: None,
        }
    }

    /// Get the value of register `reg`.
    pub fn read_register(&self, reg: usize) -> i32 {
        self.registers[reg]
    }

    /// Set register `reg`.
    pub fn write_register(&mut self, reg: usize, value: i32) {
        self.registers[reg] = value;
    }

    pub fn registers(&self) -> &[i32; NUM_TOTAL_REGS] {
        &self.registers
    }

    pub fn set_registers(&mut self, registers: [i32; NUM_TOTAL_REGS]) {
        self.registers = registers;
    }

    /// Step the program counter past the current instruction.
    pub fn advance_pc(&mut self) {
        self.registers[PREV_PC_REG] = self.registers[PC_REG];
        self.registers[PC_REG] = self.registers[NEXT_PC_REG];
        self.registers[NEXT_PC_REG] = self.registers[NEXT_PC_REG].wrapping_add(4);
    }

    /// Install the address space of the thread switching in.
    pub fn install_space(&mut self, space: Option<AddressSpace>) {
        self.space = space;
    }

    /// Remove the address space of the thread switching out.
    ///
    /// TLB state is written back first so nothing stale survives the switch.
    pub fn take_space(&mut self) -> Option<AddressSpace> {
        match self.space.as_mut() {
            Some(space) => self.mmu.flush_tlb(space),
            None => self.mmu.invalidate_tlb(),
        }
        self.space.take()
    }

    pub fn space(&self) -> Option<&AddressSpace> {
        self.space.as_ref()
    }

    pub fn space_mut(&mut self) -> Option<&mut AddressSpace> {
        self.space.as_mut()
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    /// Split borrow of the MMU and the installed address space.
    fn parts(&mut self, virtual_address: i32) -> Result<(&mut Mmu, &mut AddressSpace, usize), Fault> {
        let va = usize::try_from(virtual_address).map_err(|_| Fault::AddressError)?;
        let space = self.space.as_mut().ok_or(Fault::AddressError)?;
        Ok((&mut self.mmu, space, va))
    }

    /// Translate a user virtual address in the installed address space.
    pub fn translate(&mut self, virtual_address: i32, size: usize, writing: bool) -> Result<usize, Fault> {
        let (mmu, space, va) = self.parts(virtual_address)?;
        mmu.translate(space, va, size, writing)
    }

    /// Read user memory.
    pub fn read_mem(&mut self, virtual_address: i32, size: usize) -> Result<i32, Fault> {
        let (mmu, space, va) = self.parts(virtual_address)?;
        mmu.read_mem(space, va, size).map(|value| value as i32)
    }

    /// Write user memory.
    pub fn write_mem(&mut self, virtual_address: i32, size: usize, value: i32) -> Result<(), Fault> {
        let (mmu, space, va) = self.parts(virtual_address)?;
        mmu.write_mem(space, va, size, value as u32)
    }

    pub fn reload_tlb(&mut self, virtual_address: i32) -> Result<(), Fault> {
        let (mmu, space, va) = self.parts(virtual_address)?;
        mmu.reload_tlb(space, va)
    }

    pub fn serve_page_fault(&mut self, virtual_address: i32) -> Result<(), Fault> {
        let (mmu, space, va) = self.parts(virtual_address)?;
        mmu.serve_page_fault(space, va)
    }
}
