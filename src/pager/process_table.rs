use std::collections::HashMap;

use mmu::{BlockNumber, FrameNumber, Pid};

use crate::address::PageNumber;
use crate::error::{PagerError, Result};

/// Pager-side view of one virtual page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageDescriptor {
    pub block: Option<BlockNumber>,
    /// Contents live in `block` and must be read back on the next fault.
    pub on_disk: bool,
    /// `block` holds a copy written by an earlier eviction.
    pub swapped: bool,
    pub frame: Option<FrameNumber>,
}

#[derive(Debug)]
pub struct Process {
    pid: Pid,
    pages: Vec<PageDescriptor>,
    max_pages: usize,
}

impl Process {
    fn new(pid: Pid, max_pages: usize) -> Self {
        Self {
            pid,
            pages: Vec::with_capacity(max_pages),
            max_pages,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_full(&self) -> bool {
        self.pages.len() >= self.max_pages
    }

    pub fn page(&self, page: PageNumber) -> Option<&PageDescriptor> {
        self.pages.get(page)
    }

    pub fn page_mut(&mut self, page: PageNumber) -> Option<&mut PageDescriptor> {
        self.pages.get_mut(page)
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    /// Appends a page backed by `block` and returns its index.
    pub fn push_page(&mut self, block: BlockNumber) -> PageNumber {
        debug_assert!(!self.is_full());
        self.pages.push(PageDescriptor {
            block: Some(block),
            ..PageDescriptor::default()
        });
        self.pages.len() - 1
    }
}

/// Live processes, at most one per swap block.
#[derive(Debug)]
pub struct ProcessTable {
    processes: HashMap<Pid, Process>,
    capacity: usize,
    max_pages: usize,
}

impl ProcessTable {
    pub fn new(capacity: usize, max_pages: usize) -> Self {
        Self {
            processes: HashMap::new(),
            capacity,
            max_pages,
        }
    }

    pub fn register(&mut self, pid: Pid) -> Result<()> {
        if self.processes.contains_key(&pid) {
            return Err(PagerError::ProcessExists(pid));
        }
        if self.processes.len() >= self.capacity {
            return Err(PagerError::CapacityExhausted);
        }
        self.processes.insert(pid, Process::new(pid, self.max_pages));
        Ok(())
    }

    pub fn lookup(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn lookup_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    pub fn unregister(&mut self, pid: Pid) -> Option<Process> {
        self.processes.remove(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }
}
