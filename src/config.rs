use mmu::VirtAddr;

use crate::error::{PagerError, Result};

pub const PAGE_SIZE: usize = 1 << 12;
pub const UVM_BASEADDR: VirtAddr = 0x6000_0000;
/// Last valid byte of the user address space (inclusive).
pub const UVM_MAXADDR: VirtAddr = 0x600F_FFFF;

/// Fixed for the lifetime of a [`crate::Pager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerConfig {
    pub frames: usize,
    pub blocks: usize,
    pub page_size: usize,
    pub base_addr: VirtAddr,
    pub max_addr: VirtAddr,
}

impl PagerConfig {
    pub fn new(frames: usize, blocks: usize) -> Self {
        Self {
            frames,
            blocks,
            page_size: PAGE_SIZE,
            base_addr: UVM_BASEADDR,
            max_addr: UVM_MAXADDR,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_address_range(mut self, base_addr: VirtAddr, max_addr: VirtAddr) -> Self {
        self.base_addr = base_addr;
        self.max_addr = max_addr;
        self
    }

    /// Pages every process may grow to.
    pub fn max_pages(&self) -> usize {
        (self.max_addr - self.base_addr + 1) / self.page_size
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PagerError::InvalidConfig(msg));
        if self.frames == 0 {
            return invalid(String::from("at least one frame is required"));
        }
        if self.blocks == 0 {
            return invalid(String::from("at least one block is required"));
        }
        if !self.page_size.is_power_of_two() {
            return invalid(format!("page size {} is not a power of 2", self.page_size));
        }
        if self.base_addr % self.page_size != 0 {
            return invalid(format!(
                "base address {:#x} is not page aligned",
                self.base_addr
            ));
        }
        if self.max_addr < self.base_addr {
            return invalid(format!(
                "address range {:#x}..={:#x} is empty",
                self.base_addr, self.max_addr
            ));
        }
        if self.max_pages() == 0 {
            return invalid(String::from("address range is smaller than one page"));
        }
        Ok(())
    }
}
