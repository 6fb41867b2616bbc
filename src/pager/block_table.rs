use mmu::{BlockNumber, Pid};

/// Owner of every swap block, `None` when free.
#[derive(Debug)]
pub struct BlockTable {
    owners: Vec<Option<Pid>>,
    free: usize,
}

impl BlockTable {
    pub fn new(blocks: usize) -> Self {
        Self {
            owners: vec![None; blocks],
            free: blocks,
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn free_count(&self) -> usize {
        self.free
    }

    pub fn owner(&self, block: BlockNumber) -> Option<Pid> {
        self.owners[block]
    }

    pub fn owners(&self) -> &[Option<Pid>] {
        &self.owners
    }

    /// Hands the lowest free block to `pid`.
    pub fn allocate(&mut self, pid: Pid) -> Option<BlockNumber> {
        let block = self.owners.iter().position(Option::is_none)?;
        self.owners[block] = Some(pid);
        self.free -= 1;
        Some(block)
    }

    pub fn release_blocks_of(&mut self, pid: Pid) -> usize {
        let mut released = 0;
        for owner in self.owners.iter_mut().filter(|o| **o == Some(pid)) {
            *owner = None;
            released += 1;
        }
        self.free += released;
        released
    }
}
