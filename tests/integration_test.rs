use std::collections::HashMap;
use std::fs::remove_file;
use std::sync::Arc;
use std::thread;

use disk::{make_name, Disk};
use memory::PhysicalMemory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use uvm_pager::{Pager, PagerConfig, PagerError, Pid, SimulatedMmu, VirtAddr};

const PAGE_SIZE: usize = 4096;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn load(pager: &Pager<SimulatedMmu>, pid: Pid, addr: VirtAddr) -> u8 {
    loop {
        match pager.mmu().load(pid, addr) {
            Ok(byte) => return byte,
            Err(_) => {
                pager.fault(pid, addr).unwrap();
            }
        }
    }
}

fn store(pager: &Pager<SimulatedMmu>, pid: Pid, addr: VirtAddr, byte: u8) {
    loop {
        match pager.mmu().store(pid, addr, byte) {
            Ok(()) => return,
            Err(_) => {
                pager.fault(pid, addr).unwrap();
            }
        }
    }
}

#[test]
fn concurrent_processes_keep_their_data() {
    init_logger();
    const FRAMES: usize = 3;
    const BLOCKS: usize = 64;
    let pager = Arc::new(
        Pager::init(
            PagerConfig::new(FRAMES, BLOCKS),
            SimulatedMmu::volatile(FRAMES, BLOCKS, PAGE_SIZE),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (1..=6)
        .map(|pid: Pid| {
            let pager = Arc::clone(&pager);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                pager.create(pid).unwrap();
                let pages: Vec<VirtAddr> = (0..rng.gen_range(1..6))
                    .map(|_| pager.extend(pid).unwrap())
                    .collect();
                let expected: Vec<u8> = pages.iter().map(|_| rng.gen()).collect();
                for round in 0..3 {
                    for (addr, byte) in pages.iter().zip(&expected) {
                        if round == 0 {
                            store(&pager, pid, addr + pid as usize, *byte);
                        } else {
                            assert_eq!(load(&pager, pid, addr + pid as usize), *byte);
                        }
                    }
                }
                pager.audit().unwrap();
                pager.destroy(pid).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    pager.audit().unwrap();
    let snapshot = pager.snapshot().unwrap();
    assert_eq!(snapshot.free_frames, FRAMES);
    assert_eq!(snapshot.free_blocks, BLOCKS);
    assert!(snapshot.processes.is_empty());
}

#[test]
fn processes_sharing_one_frame_see_only_their_own_page() {
    init_logger();
    const BLOCKS: usize = 4;
    let pager = Arc::new(
        Pager::init(
            PagerConfig::new(1, BLOCKS),
            SimulatedMmu::volatile(1, BLOCKS, PAGE_SIZE),
        )
        .unwrap(),
    );

    // Both processes use the same virtual address, so a load through a stale
    // mapping would return the other one's byte.
    let handles: Vec<_> = (1..=2)
        .map(|pid: Pid| {
            let pager = Arc::clone(&pager);
            thread::spawn(move || {
                pager.create(pid).unwrap();
                let addr = pager.extend(pid).unwrap();
                let byte = 0x10 * pid as u8;
                store(&pager, pid, addr, byte);
                let mismatches = (0..20_000)
                    .filter(|_| load(&pager, pid, addr) != byte)
                    .count();
                assert_eq!(mismatches, 0, "pid {} read foreign bytes", pid);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    pager.audit().unwrap();
    assert!(pager.snapshot().unwrap().evictions > 0);
}

#[test]
fn random_operations_preserve_invariants() {
    init_logger();
    const FRAMES: usize = 4;
    const BLOCKS: usize = 12;
    let pager = Pager::init(
        PagerConfig::new(FRAMES, BLOCKS),
        SimulatedMmu::volatile(FRAMES, BLOCKS, PAGE_SIZE),
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    // Last byte written at the start of each (pid, page).
    let mut model: HashMap<(Pid, usize), u8> = HashMap::new();
    let mut live: Vec<Pid> = Vec::new();

    for _ in 0..2000 {
        let pid: Pid = rng.gen_range(1..5);
        match rng.gen_range(0..10) {
            0 => match pager.create(pid) {
                Ok(()) => live.push(pid),
                Err(e) => assert_eq!(e, PagerError::ProcessExists(pid)),
            },
            1 => {
                pager.destroy(pid).unwrap();
                live.retain(|p| *p != pid);
                model.retain(|(p, _), _| *p != pid);
            }
            2 | 3 if live.contains(&pid) => match pager.extend(pid) {
                Ok(addr) => assert_eq!(
                    addr,
                    pager.translator().address_of(pager.page_count(pid).unwrap() - 1)
                ),
                Err(e) => assert_eq!(e, PagerError::OutOfBlocks),
            },
            _ if live.contains(&pid) => {
                let count = pager.page_count(pid).unwrap();
                if count == 0 {
                    continue;
                }
                let page = rng.gen_range(0..count);
                let addr = pager.translator().address_of(page);
                if rng.gen_bool(0.5) {
                    let byte = rng.gen();
                    store(&pager, pid, addr, byte);
                    model.insert((pid, page), byte);
                } else {
                    let expected = model.get(&(pid, page)).copied().unwrap_or(0);
                    assert_eq!(load(&pager, pid, addr), expected);
                }
            }
            _ => {}
        }
        pager.audit().unwrap();
    }

    let snapshot = pager.snapshot().unwrap();
    let owned = snapshot.blocks.iter().filter(|o| o.is_some()).count();
    assert_eq!(owned + snapshot.free_blocks, BLOCKS);
    assert!(snapshot.evictions > 0);
}

#[test]
#[serial]
fn file_backed_swap_round_trip() {
    init_logger();
    let name = "integration_swap";
    let disk = Disk::create(name, PAGE_SIZE, 4).unwrap();
    let mmu = SimulatedMmu::new(PhysicalMemory::create(1, PAGE_SIZE), disk);
    let pager = Pager::init(PagerConfig::new(1, 4), mmu).unwrap();

    pager.create(1).unwrap();
    let a0 = pager.extend(1).unwrap();
    let a1 = pager.extend(1).unwrap();
    store(&pager, 1, a0 + 10, 0x42);
    store(&pager, 1, a1 + 10, 0x24);
    assert_eq!(load(&pager, 1, a0 + 10), 0x42);
    assert_eq!(load(&pager, 1, a1 + 10), 0x24);
    assert_eq!(pager.mmu().stats().disk_writes, 2);
    assert_eq!(pager.mmu().disk().read_block(0).unwrap()[10], 0x42);

    drop(pager);
    remove_file(make_name(name)).unwrap();
}
