//! Second-chance (clock) page replacement.

use log::{debug, trace};
use mmu::{FrameNumber, Mmu, Permission, Pid};

use super::frame_table::FrameTable;
use super::process_table::ProcessTable;
use crate::address::{AddressTranslator, PageNumber};
use crate::error::Result;

/// What one call to [`Clock::evict`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub frame: FrameNumber,
    pub pid: Pid,
    pub page: PageNumber,
    /// Frames visited by the hand, victim included.
    pub steps: usize,
    pub written_back: bool,
}

#[derive(Debug)]
pub struct Clock {
    hand: FrameNumber,
}

impl Clock {
    /// The first advance lands on frame 0.
    pub fn new(frames: usize) -> Self {
        Self {
            hand: frames.saturating_sub(1),
        }
    }

    pub fn hand(&self) -> FrameNumber {
        self.hand
    }

    fn advance(&mut self, frames: usize) -> FrameNumber {
        self.hand = (self.hand + 1) % frames;
        self.hand
    }

    /// Frees exactly one frame. Only called when no frame is free.
    ///
    /// A frame that still has access rights is demoted and skipped; one found
    /// already demoted is the victim, so two sweeps always suffice.
    pub fn evict<M: Mmu>(
        &mut self,
        frames: &mut FrameTable,
        processes: &mut ProcessTable,
        translator: &AddressTranslator,
        mmu: &M,
    ) -> Result<Eviction> {
        let len = frames.len();
        assert_eq!(frames.free_count(), 0, "Eviction requested with free frames");

        for steps in 1..=2 * len {
            let current = self.advance(len);
            let frame = *frames.get(current);
            let Some(owner) = frame.owner else {
                panic!("Clock reached free frame {} while none was free", current);
            };
            let vaddr = translator.address_of(owner.page);

            if frame.permission != Permission::None {
                trace!("Second chance for frame {} (pid {}, page {})", current, owner.pid, owner.page);
                mmu.chprot(owner.pid, vaddr, Permission::None)?;
                frames.demote(current);
                continue;
            }

            let process = processes.lookup_mut(owner.pid).unwrap_or_else(|| {
                panic!("Frame {} is owned by unknown pid {}", current, owner.pid)
            });
            let descriptor = process.page_mut(owner.page).unwrap_or_else(|| {
                panic!("Frame {} is owned by missing page {} of pid {}", current, owner.page, owner.pid)
            });
            assert_eq!(
                descriptor.frame,
                Some(current),
                "Page {} of pid {} does not point back at frame {}",
                owner.page,
                owner.pid,
                current
            );

            if frame.dirty {
                let block = descriptor.block.unwrap_or_else(|| {
                    panic!("Page {} of pid {} has no backing block", owner.page, owner.pid)
                });
                mmu.disk_write(current, block)?;
            }
            mmu.nonresident(owner.pid, vaddr)?;

            if frame.dirty {
                descriptor.swapped = true;
            }
            descriptor.on_disk = descriptor.swapped;
            descriptor.frame = None;
            frames.release(current);

            debug!(
                "Evicted frame {} (pid {}, page {}) after {} steps{}",
                current,
                owner.pid,
                owner.page,
                steps,
                if frame.dirty { ", written back" } else { "" }
            );
            return Ok(Eviction {
                frame: current,
                pid: owner.pid,
                page: owner.page,
                steps,
                written_back: frame.dirty,
            });
        }

        panic!("Clock swept {} frames twice without finding a victim", len);
    }
}

#[cfg(test)]
mod tests {
    use mmu::SimulatedMmu;

    use super::*;
    use crate::config::PagerConfig;

    const PAGE: usize = 64;

    struct Fixture {
        frames: FrameTable,
        processes: ProcessTable,
        translator: AddressTranslator,
        mmu: SimulatedMmu,
    }

    /// `n` frames, each holding one page of pid 1, all mapped read-only.
    fn full_memory(n: usize) -> Fixture {
        let config = PagerConfig::new(n, n)
            .with_page_size(PAGE)
            .with_address_range(0x1000, 0x1000 + (n * PAGE) - 1);
        let translator = AddressTranslator::new(&config);
        let mmu = SimulatedMmu::volatile(n, n, PAGE);
        let mut frames = FrameTable::new(n);
        let mut processes = ProcessTable::new(n, config.max_pages());
        processes.register(1).unwrap();
        let process = processes.lookup_mut(1).unwrap();
        for i in 0..n {
            let page = process.push_page(i);
            frames.assign(i, 1, page);
            process.page_mut(page).unwrap().frame = Some(i);
            mmu.resident(1, translator.address_of(page), i, Permission::Read)
                .unwrap();
        }
        Fixture {
            frames,
            processes,
            translator,
            mmu,
        }
    }

    #[test]
    fn first_sweep_demotes_then_evicts_frame_zero() {
        let mut f = full_memory(3);
        let mut clock = Clock::new(3);
        let eviction = clock
            .evict(&mut f.frames, &mut f.processes, &f.translator, &f.mmu)
            .unwrap();
        assert_eq!(eviction.frame, 0);
        assert_eq!(eviction.page, 0);
        assert_eq!(eviction.steps, 4);
        assert!(!eviction.written_back);
        assert_eq!(f.frames.free_count(), 1);
        assert_eq!(clock.hand(), 0);

        for i in 1..3 {
            assert_eq!(f.frames.get(i).permission, Permission::None);
            assert_eq!(
                f.mmu.mapping(1, f.translator.address_of(i)).unwrap().permission,
                Permission::None
            );
        }
        assert!(f.mmu.mapping(1, f.translator.address_of(0)).is_none());
        let page = f.processes.lookup(1).unwrap().page(0).unwrap();
        assert_eq!(page.frame, None);
        assert!(!page.on_disk);
    }

    #[test]
    fn demoted_frames_are_evicted_without_scanning_further() {
        let mut f = full_memory(4);
        for i in 0..4 {
            f.frames.demote(i);
        }
        let mut clock = Clock::new(4);
        let eviction = clock
            .evict(&mut f.frames, &mut f.processes, &f.translator, &f.mmu)
            .unwrap();
        assert_eq!(eviction.steps, 1);
        assert_eq!(eviction.frame, 0);
    }

    #[test]
    fn hand_resumes_where_it_stopped() {
        let mut f = full_memory(3);
        let mut clock = Clock::new(3);
        clock
            .evict(&mut f.frames, &mut f.processes, &f.translator, &f.mmu)
            .unwrap();
        f.frames.assign(0, 1, 0);
        f.processes.lookup_mut(1).unwrap().page_mut(0).unwrap().frame = Some(0);
        f.mmu.resident(1, f.translator.address_of(0), 0, Permission::Read).unwrap();

        let eviction = clock
            .evict(&mut f.frames, &mut f.processes, &f.translator, &f.mmu)
            .unwrap();
        assert_eq!(eviction.frame, 1);
        assert_eq!(eviction.steps, 1);
    }

    #[test]
    fn dirty_victim_is_written_to_its_block() {
        let mut f = full_memory(2);
        f.frames.mark_dirty(0);
        f.mmu.memory().write_frame(0, &[0x5a; PAGE]).unwrap();
        let mut clock = Clock::new(2);
        let eviction = clock
            .evict(&mut f.frames, &mut f.processes, &f.translator, &f.mmu)
            .unwrap();
        assert!(eviction.written_back);
        assert_eq!(f.mmu.stats().disk_writes, 1);
        assert_eq!(f.mmu.disk().read_block(0).unwrap(), vec![0x5a; PAGE]);
        let page = f.processes.lookup(1).unwrap().page(0).unwrap();
        assert!(page.on_disk);
        assert!(!f.frames.get(0).dirty);
    }

    #[test]
    fn scan_never_exceeds_two_sweeps() {
        for n in 1..8 {
            let mut f = full_memory(n);
            for i in 0..n {
                f.frames.mark_dirty(i);
            }
            let mut clock = Clock::new(n);
            let eviction = clock
                .evict(&mut f.frames, &mut f.processes, &f.translator, &f.mmu)
                .unwrap();
            assert!(eviction.steps <= 2 * n);
            assert_eq!(f.frames.free_count(), 1);
        }
    }
}
