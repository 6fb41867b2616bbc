use std::sync::atomic::{AtomicU64, Ordering};

use disk::Disk;
use log::trace;
use memory::PhysicalMemory;

use crate::{
    AccessFault, BlockNumber, FrameNumber, Mmu, MmuError, PageTable, PageTableEntry, Permission,
    Pid, VirtAddr,
};

/// Counters of the work the pager asked the MMU to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmuStats {
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub zero_fills: u64,
    pub chprots: u64,
}

#[derive(Debug, Default)]
struct Counters {
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
    zero_fills: AtomicU64,
    chprots: AtomicU64,
}

/// Software MMU: a frame buffer, a swap device and per-process page tables.
///
/// `load` and `store` play the role of the processor executing user code:
/// they either touch physical memory through the mapping or trap.
#[derive(Debug)]
pub struct SimulatedMmu {
    page_size: usize,
    memory: PhysicalMemory,
    disk: Disk,
    page_table: PageTable,
    counters: Counters,
}

impl SimulatedMmu {
    pub fn new(memory: PhysicalMemory, disk: Disk) -> Self {
        assert_eq!(
            memory.frame_size(),
            disk.block_size(),
            "Frame size and block size must match"
        );
        Self {
            page_size: memory.frame_size(),
            memory,
            disk,
            page_table: PageTable::init(),
            counters: Counters::default(),
        }
    }

    /// MMU over in-memory frames and an in-memory swap device.
    pub fn volatile(frames: usize, blocks: usize, page_size: usize) -> Self {
        Self::new(
            PhysicalMemory::create(frames, page_size),
            Disk::volatile(page_size, blocks),
        )
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    fn page_base(&self, addr: VirtAddr) -> VirtAddr {
        addr & !(self.page_size - 1)
    }

    fn offset(&self, addr: VirtAddr) -> usize {
        addr & (self.page_size - 1)
    }

    pub fn mapping(&self, pid: Pid, addr: VirtAddr) -> Option<PageTableEntry> {
        self.page_table.get_entry(pid, self.page_base(addr))
    }

    /// User-level read of one byte.
    ///
    /// The mapping stays locked while the frame is read, so once `chprot` or
    /// `nonresident` returns no access through the old mapping is in flight.
    pub fn load(&self, pid: Pid, addr: VirtAddr) -> Result<u8, AccessFault> {
        let offset = self.offset(addr);
        self.page_table
            .with_entry(pid, self.page_base(addr), |entry| {
                if !entry.permission.allows_read() {
                    return Err(AccessFault::Protection);
                }
                self.memory
                    .read_u8(entry.frame_number, offset)
                    .map_err(|_| AccessFault::Bus)
            })
            .unwrap_or(Err(AccessFault::NotPresent))
    }

    /// User-level write of one byte.
    pub fn store(&self, pid: Pid, addr: VirtAddr, byte: u8) -> Result<(), AccessFault> {
        let offset = self.offset(addr);
        self.page_table
            .with_entry(pid, self.page_base(addr), |entry| {
                if !entry.permission.allows_write() {
                    return Err(AccessFault::Protection);
                }
                self.memory
                    .write_u8(entry.frame_number, offset, byte)
                    .map_err(|_| AccessFault::Bus)
            })
            .unwrap_or(Err(AccessFault::NotPresent))
    }

    pub fn stats(&self) -> MmuStats {
        MmuStats {
            disk_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
            zero_fills: self.counters.zero_fills.load(Ordering::Relaxed),
            chprots: self.counters.chprots.load(Ordering::Relaxed),
        }
    }
}

impl Mmu for SimulatedMmu {
    fn resident(
        &self,
        pid: Pid,
        vaddr: VirtAddr,
        frame: FrameNumber,
        prot: Permission,
    ) -> Result<(), MmuError> {
        trace!("resident pid={} vaddr={:#x} frame={} {:?}", pid, vaddr, frame, prot);
        self.page_table.map_to_frame(pid, self.page_base(vaddr), frame, prot);
        Ok(())
    }

    fn nonresident(&self, pid: Pid, vaddr: VirtAddr) -> Result<(), MmuError> {
        trace!("nonresident pid={} vaddr={:#x}", pid, vaddr);
        match self.page_table.unmap_page(pid, self.page_base(vaddr)) {
            Some(_) => Ok(()),
            None => Err(MmuError::NotMapped { pid, vaddr }),
        }
    }

    fn chprot(&self, pid: Pid, vaddr: VirtAddr, prot: Permission) -> Result<(), MmuError> {
        trace!("chprot pid={} vaddr={:#x} {:?}", pid, vaddr, prot);
        self.counters.chprots.fetch_add(1, Ordering::Relaxed);
        if self.page_table.set_permission(pid, self.page_base(vaddr), prot) {
            Ok(())
        } else {
            Err(MmuError::NotMapped { pid, vaddr })
        }
    }

    fn disk_write(&self, frame: FrameNumber, block: BlockNumber) -> Result<(), MmuError> {
        let bytes = self.memory.read_frame(frame)?;
        self.disk.write_block(block, &bytes)?;
        self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn disk_read(&self, block: BlockNumber, frame: FrameNumber) -> Result<(), MmuError> {
        let bytes = self.disk.read_block(block)?;
        self.memory.write_frame(frame, &bytes)?;
        self.counters.disk_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn zero_fill(&self, frame: FrameNumber) -> Result<(), MmuError> {
        self.memory.zero_frame(frame)?;
        self.counters.zero_fills.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_physical(
        &self,
        frame: FrameNumber,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), MmuError> {
        self.memory.read_into(frame, offset, buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 64;

    #[test]
    fn load_store_follow_permissions() {
        let mmu = SimulatedMmu::volatile(2, 2, PAGE);
        assert_eq!(mmu.load(1, 0x40), Err(AccessFault::NotPresent));

        mmu.resident(1, 0x40, 1, Permission::Read).unwrap();
        assert_eq!(mmu.load(1, 0x41), Ok(0));
        assert_eq!(mmu.store(1, 0x41, 7), Err(AccessFault::Protection));

        mmu.chprot(1, 0x40, Permission::ReadWrite).unwrap();
        mmu.store(1, 0x41, 7).unwrap();
        assert_eq!(mmu.load(1, 0x41), Ok(7));
        assert_eq!(mmu.memory().read_u8(1, 1).unwrap(), 7);

        mmu.chprot(1, 0x40, Permission::None).unwrap();
        assert_eq!(mmu.load(1, 0x41), Err(AccessFault::Protection));
    }

    #[test]
    fn swap_round_trip() {
        let mmu = SimulatedMmu::volatile(2, 2, PAGE);
        mmu.memory().write_frame(0, &[3; PAGE]).unwrap();
        mmu.disk_write(0, 1).unwrap();
        mmu.zero_fill(0).unwrap();
        assert_eq!(mmu.memory().read_frame(0).unwrap(), vec![0; PAGE]);
        mmu.disk_read(1, 1).unwrap();
        assert_eq!(mmu.memory().read_frame(1).unwrap(), vec![3; PAGE]);

        let stats = mmu.stats();
        assert_eq!(stats.disk_writes, 1);
        assert_eq!(stats.disk_reads, 1);
        assert_eq!(stats.zero_fills, 1);
    }

    #[test]
    fn unmapping_missing_page_is_an_error() {
        let mmu = SimulatedMmu::volatile(1, 1, PAGE);
        assert_eq!(
            mmu.nonresident(3, 0x80),
            Err(MmuError::NotMapped { pid: 3, vaddr: 0x80 })
        );
        assert!(mmu.chprot(3, 0x80, Permission::Read).is_err());
    }

    #[test]
    fn remapped_frame_is_not_visible_to_old_owner() {
        let mmu = SimulatedMmu::volatile(1, 1, PAGE);
        mmu.resident(1, 0x40, 0, Permission::ReadWrite).unwrap();
        mmu.store(1, 0x40, 0x11).unwrap();
        mmu.nonresident(1, 0x40).unwrap();
        mmu.resident(2, 0x40, 0, Permission::ReadWrite).unwrap();
        mmu.store(2, 0x40, 0x22).unwrap();
        assert_eq!(mmu.load(1, 0x40), Err(AccessFault::NotPresent));
        assert_eq!(mmu.store(1, 0x40, 0x33), Err(AccessFault::NotPresent));
        assert_eq!(mmu.load(2, 0x40), Ok(0x22));
    }

    #[test]
    fn read_physical_ignores_mappings() {
        let mmu = SimulatedMmu::volatile(2, 1, PAGE);
        mmu.memory().write_u8(1, 10, 0xee).unwrap();
        let mut buf = [0; 2];
        mmu.read_physical(1, 9, &mut buf).unwrap();
        assert_eq!(buf, [0, 0xee]);
    }
}
