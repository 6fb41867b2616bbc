use mmu::VirtAddr;

use crate::config::PagerConfig;

pub type PageNumber = usize;

/// Converts between user virtual addresses and page indices.
#[derive(Debug, Clone, Copy)]
pub struct AddressTranslator {
    base_addr: VirtAddr,
    max_addr: VirtAddr,
    page_size: usize,
}

impl AddressTranslator {
    pub fn new(config: &PagerConfig) -> Self {
        Self {
            base_addr: config.base_addr,
            max_addr: config.max_addr,
            page_size: config.page_size,
        }
    }

    /// Caller guarantees `addr >= base_addr`.
    pub fn page_of(&self, addr: VirtAddr) -> PageNumber {
        (addr - self.base_addr) / self.page_size
    }

    pub fn address_of(&self, page: PageNumber) -> VirtAddr {
        self.base_addr + page * self.page_size
    }

    /// Like [`Self::page_of`], but `None` outside the configured range.
    pub fn checked_page_of(&self, addr: VirtAddr) -> Option<PageNumber> {
        if addr < self.base_addr || addr > self.max_addr {
            return None;
        }
        Some(self.page_of(addr))
    }

    pub fn offset_of(&self, addr: VirtAddr) -> usize {
        (addr - self.base_addr) % self.page_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
