use mmu::{MmuError, Pid, VirtAddr};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PagerError>;

#[derive(Error, Debug, PartialEq)]
pub enum PagerError {
    #[error("no free swap block left")]
    OutOfBlocks,

    #[error("pid {pid} already has the maximum of {max_pages} pages")]
    AddressSpaceExhausted { pid: Pid, max_pages: usize },

    #[error("pid {pid} accessed {addr:#x} outside its address space")]
    OutOfBounds { pid: Pid, addr: VirtAddr },

    #[error("pid {pid} has no resident page at {addr:#x}")]
    NotResident { pid: Pid, addr: VirtAddr },

    #[error("unknown pid {0}")]
    UnknownProcess(Pid),

    #[error("pid {0} is already registered")]
    ProcessExists(Pid),

    #[error("process table is full")]
    CapacityExhausted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("mmu failure: {0}")]
    Mmu(#[from] MmuError),

    #[error("pager lock poisoned by an earlier panic")]
    Poisoned,
}

impl PagerError {
    /// Contract violations and host failures, as opposed to outcomes a
    /// simulated process is expected to handle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PagerError::UnknownProcess(_)
                | PagerError::ProcessExists(_)
                | PagerError::InvariantViolated(_)
                | PagerError::Mmu(_)
                | PagerError::Poisoned
        )
    }
}
