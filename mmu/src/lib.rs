//! The mapping collaborator the pager drives, and a simulated implementation
//! of it built from [`memory::PhysicalMemory`] and a [`disk::Disk`] swap device.

mod page_table;
mod simulated;

use disk::DiskError;
use memory::MemoryError;
use thiserror::Error;

pub use page_table::{PageTable, PageTableEntry};
pub use simulated::{MmuStats, SimulatedMmu};

pub type Pid = u32;
pub type VirtAddr = usize;
pub type FrameNumber = usize;
pub type BlockNumber = usize;

/// Access rights of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    None,
    Read,
    ReadWrite,
}

impl Permission {
    pub fn allows_read(self) -> bool {
        self != Permission::None
    }

    pub fn allows_write(self) -> bool {
        self == Permission::ReadWrite
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum MmuError {
    #[error("swap device error: {0:?}")]
    Disk(DiskError),
    #[error("physical memory error: {0:?}")]
    Memory(MemoryError),
    #[error("no mapping for pid {pid} at {vaddr:#x}")]
    NotMapped { pid: Pid, vaddr: VirtAddr },
}

impl From<DiskError> for MmuError {
    fn from(e: DiskError) -> Self {
        MmuError::Disk(e)
    }
}

impl From<MemoryError> for MmuError {
    fn from(e: MemoryError) -> Self {
        MmuError::Memory(e)
    }
}

/// Trap raised by a user-level access that the current mapping does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFault {
    /// No mapping for the page.
    NotPresent,
    /// Mapping exists but forbids this kind of access.
    Protection,
    /// Mapping points outside physical memory.
    Bus,
}

/// Capabilities the pager needs from the host to change what a process sees.
///
/// Every call happens while the pager holds its lock, so implementations
/// never observe two pager operations interleaved.
pub trait Mmu {
    /// Maps the page at `vaddr` of `pid` onto `frame` with `prot`.
    fn resident(
        &self,
        pid: Pid,
        vaddr: VirtAddr,
        frame: FrameNumber,
        prot: Permission,
    ) -> Result<(), MmuError>;

    /// Drops the mapping of the page at `vaddr` of `pid`.
    fn nonresident(&self, pid: Pid, vaddr: VirtAddr) -> Result<(), MmuError>;

    /// Changes the access rights of an existing mapping.
    fn chprot(&self, pid: Pid, vaddr: VirtAddr, prot: Permission) -> Result<(), MmuError>;

    fn disk_write(&self, frame: FrameNumber, block: BlockNumber) -> Result<(), MmuError>;

    fn disk_read(&self, block: BlockNumber, frame: FrameNumber) -> Result<(), MmuError>;

    fn zero_fill(&self, frame: FrameNumber) -> Result<(), MmuError>;

    /// Raw read of physical storage, bypassing every mapping.
    fn read_physical(
        &self,
        frame: FrameNumber,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), MmuError>;
}
