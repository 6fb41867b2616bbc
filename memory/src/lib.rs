use std::sync::{Arc, Mutex};

#[derive(Debug, PartialEq)]
pub enum MemoryError {
    OverCapacity,
}

/// Simulated physical memory: `frames` frames of `frame_size` bytes each.
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct PhysicalMemory {
    frame_size: usize,
    frames: usize,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl PhysicalMemory {
    pub fn create(frames: usize, frame_size: usize) -> Self {
        assert!(
            frame_size.is_power_of_two(),
            "Frame size {} is not a power of 2",
            frame_size
        );
        Self {
            frame_size,
            frames,
            buffer: Arc::new(Mutex::new(vec![0; frames * frame_size])),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn check_range(&self, frame: usize, offset: usize, len: usize) -> Result<usize, MemoryError> {
        if frame >= self.frames || offset + len > self.frame_size {
            return Err(MemoryError::OverCapacity);
        }
        Ok(frame * self.frame_size + offset)
    }

    pub fn read_u8(&self, frame: usize, offset: usize) -> Result<u8, MemoryError> {
        let address = self.check_range(frame, offset, 1)?;
        let buffer = self.buffer.lock().unwrap();
        Ok(buffer[address])
    }

    pub fn write_u8(&self, frame: usize, offset: usize, byte: u8) -> Result<(), MemoryError> {
        let address = self.check_range(frame, offset, 1)?;
        let mut buffer = self.buffer.lock().unwrap();
        buffer[address] = byte;
        Ok(())
    }

    /// Copies `buf.len()` bytes starting at `offset` inside `frame`.
    pub fn read_into(&self, frame: usize, offset: usize, buf: &mut [u8]) -> Result<(), MemoryError> {
        let address = self.check_range(frame, offset, buf.len())?;
        let buffer = self.buffer.lock().unwrap();
        buf.copy_from_slice(&buffer[address..address + buf.len()]);
        Ok(())
    }

    pub fn read_frame(&self, frame: usize) -> Result<Vec<u8>, MemoryError> {
        let mut bytes = vec![0; self.frame_size];
        self.read_into(frame, 0, &mut bytes)?;
        Ok(bytes)
    }

    pub fn write_frame(&self, frame: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.len() != self.frame_size {
            return Err(MemoryError::OverCapacity);
        }
        let address = self.check_range(frame, 0, self.frame_size)?;
        let mut buffer = self.buffer.lock().unwrap();
        buffer[address..address + self.frame_size].copy_from_slice(bytes);
        Ok(())
    }

    pub fn zero_frame(&self, frame: usize) -> Result<(), MemoryError> {
        let address = self.check_range(frame, 0, self.frame_size)?;
        let mut buffer = self.buffer.lock().unwrap();
        buffer[address..address + self.frame_size].fill(0);
        Ok(())
    }
}
