use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{FrameNumber, Permission, Pid, VirtAddr};

/// One hardware mapping: page ---> frame, with its access rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub frame_number: FrameNumber,
    pub permission: Permission,
}

/// Hardware page tables of every simulated process, keyed by
/// `(pid, page-aligned virtual address)`.
#[derive(Debug, Clone, Default)]
pub struct PageTable {
    entries: Arc<Mutex<HashMap<(Pid, VirtAddr), PageTableEntry>>>,
}

impl PageTable {
    pub fn init() -> Self {
        Self::default()
    }

    pub fn get_entry(&self, pid: Pid, vaddr: VirtAddr) -> Option<PageTableEntry> {
        let entries = self.entries.lock().unwrap();
        entries.get(&(pid, vaddr)).copied()
    }

    /// Runs `f` on the mapping with the table locked, so no other mapping
    /// change can land while `f` uses the frame.
    pub fn with_entry<R>(
        &self,
        pid: Pid,
        vaddr: VirtAddr,
        f: impl FnOnce(&PageTableEntry) -> R,
    ) -> Option<R> {
        let entries = self.entries.lock().unwrap();
        entries.get(&(pid, vaddr)).map(f)
    }

    pub fn map_to_frame(
        &self,
        pid: Pid,
        vaddr: VirtAddr,
        frame_number: FrameNumber,
        permission: Permission,
    ) {
        let entry = PageTableEntry {
            frame_number,
            permission,
        };
        self.entries.lock().unwrap().insert((pid, vaddr), entry);
    }

    /// Returns false when there was no mapping to update.
    pub fn set_permission(&self, pid: Pid, vaddr: VirtAddr, permission: Permission) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&(pid, vaddr)) {
            Some(entry) => {
                entry.permission = permission;
                true
            }
            None => false,
        }
    }

    pub fn unmap_page(&self, pid: Pid, vaddr: VirtAddr) -> Option<PageTableEntry> {
        self.entries.lock().unwrap().remove(&(pid, vaddr))
    }

    /// Mappings of `pid`, sorted by address.
    pub fn mappings_of(&self, pid: Pid) -> Vec<(VirtAddr, PageTableEntry)> {
        let entries = self.entries.lock().unwrap();
        let mut mappings: Vec<_> = entries
            .iter()
            .filter(|((owner, _), _)| *owner == pid)
            .map(|((_, vaddr), entry)| (*vaddr, *entry))
            .collect();
        mappings.sort_by_key(|(vaddr, _)| *vaddr);
        mappings
    }
}
