//! User-space demand pager for simulated processes sharing a fixed pool of
//! physical frames and swap blocks, with clock (second-chance) replacement.

pub mod address;
pub mod config;
pub mod error;
pub mod pager;

pub use address::{AddressTranslator, PageNumber};
pub use config::PagerConfig;
pub use error::{PagerError, Result};
pub use pager::{
    Eviction, Fault, Frame, FrameOwner, PageDescriptor, PageSource, PageState, Pager,
    PagerSnapshot,
};

pub use mmu::{
    AccessFault, BlockNumber, FrameNumber, Mmu, MmuError, Permission, Pid, SimulatedMmu, VirtAddr,
};
