//! Demo driver: a few simulated processes hammering a small pager.

use std::process;
use std::sync::Arc;
use std::thread;

use log::{error, info};
use uvm_pager::{Pager, PagerConfig, PagerError, Pid, SimulatedMmu, VirtAddr};

const FRAMES: usize = 4;
const BLOCKS: usize = 32;
const PROCESSES: Pid = 4;
const PAGES_PER_PROCESS: usize = 6;

/// A simulated process: every access goes through the MMU and traps into the
/// pager until the mapping allows it.
struct Process {
    pid: Pid,
    pager: Arc<Pager<SimulatedMmu>>,
}

impl Process {
    fn load(&self, addr: VirtAddr) -> Result<u8, PagerError> {
        loop {
            match self.pager.mmu().load(self.pid, addr) {
                Ok(byte) => return Ok(byte),
                Err(_) => {
                    self.pager.fault(self.pid, addr)?;
                }
            }
        }
    }

    fn store(&self, addr: VirtAddr, byte: u8) -> Result<(), PagerError> {
        loop {
            match self.pager.mmu().store(self.pid, addr, byte) {
                Ok(()) => return Ok(()),
                Err(_) => {
                    self.pager.fault(self.pid, addr)?;
                }
            }
        }
    }

    fn run(&self) -> Result<(), PagerError> {
        self.pager.create(self.pid)?;
        let mut pages = Vec::new();
        for _ in 0..PAGES_PER_PROCESS {
            match self.pager.extend(self.pid) {
                Ok(addr) => pages.push(addr),
                Err(PagerError::OutOfBlocks) => break,
                Err(e) => return Err(e),
            }
        }

        for (i, &addr) in pages.iter().enumerate() {
            for offset in 0..8 {
                self.store(addr + offset, (self.pid as u8) << 4 | i as u8)?;
            }
        }
        for (i, &addr) in pages.iter().enumerate() {
            let byte = self.load(addr)?;
            if byte != (self.pid as u8) << 4 | i as u8 {
                error!("pid {} read {:#04x} back from page {}", self.pid, byte, i);
            }
            if let Ok(line) = self.pager.syslog(self.pid, addr, 8) {
                println!("pid {} page {}: {}", self.pid, i, line);
            }
        }

        // One access past the end: the pager refuses it, as a segfault.
        if let Some(&last) = pages.last() {
            if let Err(e) = self.pager.fault(self.pid, last + self.pager.config().page_size) {
                info!("pid {} segfault: {}", self.pid, e);
            }
        }

        self.pager.destroy(self.pid)
    }
}

fn main() {
    env_logger::init();

    let config = PagerConfig::new(FRAMES, BLOCKS);
    let mmu = SimulatedMmu::volatile(FRAMES, BLOCKS, config.page_size);
    let pager = match Pager::init(config, mmu) {
        Ok(pager) => Arc::new(pager),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let handles: Vec<_> = (1..=PROCESSES)
        .map(|pid| {
            let process = Process {
                pid,
                pager: Arc::clone(&pager),
            };
            thread::spawn(move || process.run())
        })
        .collect();

    let mut failed = false;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("Error: {}", e);
                failed = true;
            }
            Err(_) => {
                eprintln!("Error: a process thread panicked");
                failed = true;
            }
        }
    }

    match pager.snapshot() {
        Ok(snapshot) => println!(
            "{} evictions, {} write-backs, {} swap reads, {} free frames, {} free blocks",
            snapshot.evictions,
            snapshot.write_backs,
            pager.mmu().stats().disk_reads,
            snapshot.free_frames,
            snapshot.free_blocks
        ),
        Err(e) => {
            eprintln!("Error: {}", e);
            failed = true;
        }
    }
    if failed {
        process::exit(1);
    }
}
