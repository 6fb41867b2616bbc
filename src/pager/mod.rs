mod block_table;
mod clock;
mod frame_table;
mod process_table;

use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use mmu::{BlockNumber, FrameNumber, Mmu, Permission, Pid, VirtAddr};

use crate::address::{AddressTranslator, PageNumber};
use crate::config::PagerConfig;
use crate::error::{PagerError, Result};

use self::block_table::BlockTable;
use self::clock::Clock;
use self::frame_table::FrameTable;
use self::process_table::ProcessTable;

pub use self::clock::Eviction;
pub use self::frame_table::{Frame, FrameOwner};
pub use self::process_table::PageDescriptor;

/// Where the contents of a newly resident page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    ZeroFill,
    Swap(BlockNumber),
}

/// Result of a successful [`Pager::fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The page was not resident and now is, read-only.
    PagedIn {
        frame: FrameNumber,
        source: PageSource,
        evicted: Option<Eviction>,
    },
    /// The page was resident; it is now writable and dirty.
    WriteEnabled { frame: FrameNumber },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Beyond the end of the process's address space.
    Unmapped,
    Resident {
        frame: FrameNumber,
        permission: Permission,
        dirty: bool,
    },
    NonResident { on_disk: bool },
}

/// Copy of the shared tables taken under the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerSnapshot {
    pub free_frames: usize,
    pub free_blocks: usize,
    pub clock: FrameNumber,
    pub frames: Vec<Frame>,
    pub blocks: Vec<Option<Pid>>,
    pub processes: Vec<(Pid, Vec<PageDescriptor>)>,
    pub evictions: u64,
    pub write_backs: u64,
}

#[derive(Debug)]
struct PagerState {
    frames: FrameTable,
    blocks: BlockTable,
    processes: ProcessTable,
    clock: Clock,
    evictions: u64,
    write_backs: u64,
}

/// Demand pager shared by every simulated process.
///
/// All operations serialize on one lock, held across the calls into `M`,
/// because eviction may touch any process's pages.
#[derive(Debug)]
pub struct Pager<M: Mmu> {
    config: PagerConfig,
    translator: AddressTranslator,
    mmu: M,
    state: Mutex<PagerState>,
}

impl<M: Mmu> Pager<M> {
    pub fn init(config: PagerConfig, mmu: M) -> Result<Self> {
        config.validate()?;
        let max_pages = config.max_pages();
        info!(
            "Pager initialized: {} frames, {} blocks, {} pages per process",
            config.frames, config.blocks, max_pages
        );
        let state = PagerState {
            frames: FrameTable::new(config.frames),
            blocks: BlockTable::new(config.blocks),
            // A process needs a block to hold anything, so there can be no
            // more of them than blocks.
            processes: ProcessTable::new(config.blocks, max_pages),
            clock: Clock::new(config.frames),
            evictions: 0,
            write_backs: 0,
        };
        Ok(Self {
            translator: AddressTranslator::new(&config),
            config,
            mmu,
            state: Mutex::new(state),
        })
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    pub fn mmu(&self) -> &M {
        &self.mmu
    }

    fn lock(&self) -> Result<MutexGuard<'_, PagerState>> {
        self.state.lock().map_err(|_| PagerError::Poisoned)
    }

    pub fn create(&self, pid: Pid) -> Result<()> {
        let mut state = self.lock()?;
        state.processes.register(pid)?;
        info!("Created pid {}", pid);
        Ok(())
    }

    /// Grows the address space of `pid` by one page and returns its address.
    pub fn extend(&self, pid: Pid) -> Result<VirtAddr> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let process = state
            .processes
            .lookup_mut(pid)
            .ok_or(PagerError::UnknownProcess(pid))?;
        if process.is_full() {
            warn!("pid {} reached {} pages", pid, self.config.max_pages());
            return Err(PagerError::AddressSpaceExhausted {
                pid,
                max_pages: self.config.max_pages(),
            });
        }
        let Some(block) = state.blocks.allocate(pid) else {
            warn!("No free block to extend pid {}", pid);
            return Err(PagerError::OutOfBlocks);
        };
        let page = process.push_page(block);
        let vaddr = self.translator.address_of(page);
        debug!("pid {} extended: page {} at {:#x} on block {}", pid, page, vaddr, block);
        Ok(vaddr)
    }

    /// Handles a trap taken by `pid` at `addr`.
    ///
    /// A non-resident page is brought in read-only, evicting another page if
    /// memory is full. A resident page can only trap on a store, so it is made
    /// writable and marked dirty.
    pub fn fault(&self, pid: Pid, addr: VirtAddr) -> Result<Fault> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let process = state
            .processes
            .lookup(pid)
            .ok_or(PagerError::UnknownProcess(pid))?;
        let page = match self.translator.checked_page_of(addr) {
            Some(page) if page < process.page_count() => page,
            _ => {
                warn!("pid {} faulted outside its address space at {:#x}", pid, addr);
                return Err(PagerError::OutOfBounds { pid, addr });
            }
        };
        let vaddr = self.translator.address_of(page);

        if let Some(frame) = process.pages()[page].frame {
            self.mmu.chprot(pid, vaddr, Permission::ReadWrite)?;
            state.frames.mark_dirty(frame);
            debug!("pid {} page {} writable in frame {}", pid, page, frame);
            return Ok(Fault::WriteEnabled { frame });
        }

        let evicted = if state.frames.free_count() == 0 {
            let eviction = state.clock.evict(
                &mut state.frames,
                &mut state.processes,
                &self.translator,
                &self.mmu,
            )?;
            state.evictions += 1;
            if eviction.written_back {
                state.write_backs += 1;
            }
            Some(eviction)
        } else {
            None
        };

        let frame = state
            .frames
            .find_free()
            .unwrap_or_else(|| panic!("No free frame after eviction"));
        let descriptor = state
            .processes
            .lookup_mut(pid)
            .and_then(|p| p.page_mut(page))
            .unwrap_or_else(|| panic!("Page {} of pid {} vanished during fault", page, pid));

        let source = match (descriptor.block, descriptor.on_disk) {
            (Some(block), true) => {
                self.mmu.disk_read(block, frame)?;
                descriptor.on_disk = false;
                PageSource::Swap(block)
            }
            _ => {
                self.mmu.zero_fill(frame)?;
                PageSource::ZeroFill
            }
        };
        state.frames.assign(frame, pid, page);
        descriptor.frame = Some(frame);
        self.mmu.resident(pid, vaddr, frame, Permission::Read)?;

        debug!("pid {} page {} resident in frame {} ({:?})", pid, page, frame, source);
        Ok(Fault::PagedIn {
            frame,
            source,
            evicted,
        })
    }

    /// Releases everything `pid` holds. Unknown pids are ignored.
    pub fn destroy(&self, pid: Pid) -> Result<()> {
        let mut state = self.lock()?;
        let Some(process) = state.processes.unregister(pid) else {
            debug!("destroy of unknown pid {}", pid);
            return Ok(());
        };
        for (page, _) in process
            .pages()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.frame.is_some())
        {
            if let Err(e) = self.mmu.nonresident(pid, self.translator.address_of(page)) {
                warn!("Could not unmap page {} of exiting pid {}: {}", page, pid, e);
            }
        }
        let frames = state.frames.release_frames_of(pid);
        let blocks = state.blocks.release_blocks_of(pid);
        info!(
            "Destroyed pid {}: released {} frames and {} blocks",
            pid, frames, blocks
        );
        Ok(())
    }

    /// Physical location of `addr` if its page is resident.
    pub fn translate(&self, pid: Pid, addr: VirtAddr) -> Result<Option<(FrameNumber, usize)>> {
        let state = self.lock()?;
        let process = state
            .processes
            .lookup(pid)
            .ok_or(PagerError::UnknownProcess(pid))?;
        Ok(self
            .translator
            .checked_page_of(addr)
            .and_then(|page| process.page(page))
            .and_then(|d| d.frame)
            .map(|frame| (frame, self.translator.offset_of(addr))))
    }

    /// Reads `len` bytes of `pid`'s memory starting at `addr`.
    ///
    /// Every page in the range must be resident; otherwise nothing is read.
    pub fn dump(&self, pid: Pid, addr: VirtAddr, len: usize) -> Result<Vec<u8>> {
        let state = self.lock()?;
        let process = state
            .processes
            .lookup(pid)
            .ok_or(PagerError::UnknownProcess(pid))?;

        let mut chunks = Vec::new();
        let mut cursor = addr;
        let end = addr
            .checked_add(len)
            .ok_or(PagerError::NotResident { pid, addr })?;
        while cursor < end {
            let frame = self
                .translator
                .checked_page_of(cursor)
                .and_then(|page| process.page(page))
                .and_then(|d| d.frame)
                .ok_or(PagerError::NotResident { pid, addr: cursor })?;
            let offset = self.translator.offset_of(cursor);
            let chunk = (self.translator.page_size() - offset).min(end - cursor);
            chunks.push((frame, offset, chunk));
            cursor += chunk;
        }

        let mut bytes = vec![0; len];
        let mut filled = 0;
        for (frame, offset, chunk) in chunks {
            self.mmu
                .read_physical(frame, offset, &mut bytes[filled..filled + chunk])?;
            filled += chunk;
        }
        Ok(bytes)
    }

    /// Logs `len` bytes of `pid`'s memory as one hex line and returns it.
    pub fn syslog(&self, pid: Pid, addr: VirtAddr, len: usize) -> Result<String> {
        let bytes = self.dump(pid, addr, len)?;
        let line: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        info!("pid {} {:#x}+{}: {}", pid, addr, len, line);
        Ok(line)
    }

    pub fn page_count(&self, pid: Pid) -> Result<usize> {
        let state = self.lock()?;
        state
            .processes
            .lookup(pid)
            .map(|p| p.page_count())
            .ok_or(PagerError::UnknownProcess(pid))
    }

    pub fn page_state(&self, pid: Pid, page: PageNumber) -> Result<PageState> {
        let state = self.lock()?;
        let process = state
            .processes
            .lookup(pid)
            .ok_or(PagerError::UnknownProcess(pid))?;
        Ok(match process.page(page) {
            None => PageState::Unmapped,
            Some(PageDescriptor {
                frame: Some(frame), ..
            }) => {
                let entry = state.frames.get(*frame);
                PageState::Resident {
                    frame: *frame,
                    permission: entry.permission,
                    dirty: entry.dirty,
                }
            }
            Some(d) => PageState::NonResident { on_disk: d.on_disk },
        })
    }

    pub fn snapshot(&self) -> Result<PagerSnapshot> {
        let state = self.lock()?;
        let mut processes: Vec<(Pid, Vec<PageDescriptor>)> = state
            .processes
            .iter()
            .map(|p| (p.pid(), p.pages().to_vec()))
            .collect();
        processes.sort_by_key(|(pid, _)| *pid);
        Ok(PagerSnapshot {
            free_frames: state.frames.free_count(),
            free_blocks: state.blocks.free_count(),
            clock: state.clock.hand(),
            frames: state.frames.frames().to_vec(),
            blocks: state.blocks.owners().to_vec(),
            processes,
            evictions: state.evictions,
            write_backs: state.write_backs,
        })
    }

    /// Cross-checks the frame, block and process tables.
    pub fn audit(&self) -> Result<()> {
        let state = self.lock()?;
        let violated = |msg: String| Err(PagerError::InvariantViolated(msg));

        let owned_frames = state.frames.frames().iter().filter(|f| !f.is_free()).count();
        if owned_frames + state.frames.free_count() != state.frames.len() {
            return violated(format!(
                "{} owned + {} free frames != {}",
                owned_frames,
                state.frames.free_count(),
                state.frames.len()
            ));
        }
        let owned_blocks = state.blocks.owners().iter().filter(|o| o.is_some()).count();
        if owned_blocks + state.blocks.free_count() != state.blocks.len() {
            return violated(format!(
                "{} owned + {} free blocks != {}",
                owned_blocks,
                state.blocks.free_count(),
                state.blocks.len()
            ));
        }

        let mut frame_refs = vec![0usize; state.frames.len()];
        let mut block_refs = vec![0usize; state.blocks.len()];
        for process in state.processes.iter() {
            for (page, d) in process.pages().iter().enumerate() {
                if let Some(block) = d.block {
                    block_refs[block] += 1;
                    if state.blocks.owner(block) != Some(process.pid()) {
                        return violated(format!(
                            "block {} of pid {} page {} owned by {:?}",
                            block,
                            process.pid(),
                            page,
                            state.blocks.owner(block)
                        ));
                    }
                } else if d.on_disk {
                    return violated(format!(
                        "pid {} page {} on disk without a block",
                        process.pid(),
                        page
                    ));
                }
                if let Some(frame) = d.frame {
                    frame_refs[frame] += 1;
                    let expected = Some(FrameOwner {
                        pid: process.pid(),
                        page,
                    });
                    if state.frames.get(frame).owner != expected || d.on_disk {
                        return violated(format!(
                            "pid {} page {} and frame {} disagree",
                            process.pid(),
                            page,
                            frame
                        ));
                    }
                }
            }
        }
        if let Some(frame) = frame_refs.iter().position(|&n| n > 1) {
            return violated(format!("frame {} referenced {} times", frame, frame_refs[frame]));
        }
        if let Some(block) = block_refs.iter().position(|&n| n > 1) {
            return violated(format!("block {} referenced {} times", block, block_refs[block]));
        }
        for (frame, entry) in state.frames.frames().iter().enumerate() {
            if let Some(owner) = entry.owner {
                if frame_refs[frame] != 1 {
                    return violated(format!(
                        "frame {} owned by pid {} but not referenced",
                        frame, owner.pid
                    ));
                }
            }
            if entry.permission == Permission::ReadWrite && !entry.dirty {
                return violated(format!("frame {} writable but clean", frame));
            }
        }
        Ok(())
    }
}
