use mmu::{FrameNumber, Permission, Pid};

use crate::address::PageNumber;

/// Which page of which process occupies a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    pub pid: Pid,
    pub page: PageNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub owner: Option<FrameOwner>,
    pub permission: Permission,
    pub dirty: bool,
}

impl Frame {
    const FREE: Frame = Frame {
        owner: None,
        permission: Permission::None,
        dirty: false,
    };

    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

#[derive(Debug)]
pub struct FrameTable {
    frames: Vec<Frame>,
    free: usize,
}

impl FrameTable {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: vec![Frame::FREE; frames],
            free: frames,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn free_count(&self) -> usize {
        self.free
    }

    pub fn get(&self, frame: FrameNumber) -> &Frame {
        &self.frames[frame]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Lowest-numbered free frame.
    pub fn find_free(&self) -> Option<FrameNumber> {
        self.frames.iter().position(Frame::is_free)
    }

    /// Binds a free frame to `(pid, page)` as a clean, read-only frame.
    pub fn assign(&mut self, frame: FrameNumber, pid: Pid, page: PageNumber) {
        let entry = &mut self.frames[frame];
        assert!(entry.is_free(), "Frame {} is already owned by {:?}", frame, entry.owner);
        *entry = Frame {
            owner: Some(FrameOwner { pid, page }),
            permission: Permission::Read,
            dirty: false,
        };
        self.free -= 1;
    }

    /// Revokes every access right, leaving the dirty bit alone.
    pub fn demote(&mut self, frame: FrameNumber) {
        self.frames[frame].permission = Permission::None;
    }

    /// Grants write access; the frame counts as modified from now on.
    pub fn mark_dirty(&mut self, frame: FrameNumber) {
        let entry = &mut self.frames[frame];
        entry.permission = Permission::ReadWrite;
        entry.dirty = true;
    }

    pub fn release(&mut self, frame: FrameNumber) {
        let entry = &mut self.frames[frame];
        if entry.is_free() {
            return;
        }
        *entry = Frame::FREE;
        self.free += 1;
    }

    /// Frees every frame owned by `pid`, returning how many there were.
    pub fn release_frames_of(&mut self, pid: Pid) -> usize {
        let owned: Vec<FrameNumber> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f.owner, Some(owner) if owner.pid == pid))
            .map(|(i, _)| i)
            .collect();
        for &frame in &owned {
            self.release(frame);
        }
        owned.len()
    }
}
