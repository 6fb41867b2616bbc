use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    sync::{Arc, Mutex},
};

use log::trace;

#[derive(Debug, PartialEq)]
pub enum DiskError {
    IncorrectBlockSize,
    OverCapacity,
    Io(String),
}

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        DiskError::Io(e.to_string())
    }
}

const HEADER_SIZE: usize = size_of::<u32>() * 2;

#[derive(Debug)]
enum Backing {
    File(File),
    Volatile(Vec<u8>),
}

/// Swap device made of `blocks` fixed-size blocks.
///
/// Cloning a `Disk` shares the underlying storage.
#[derive(Debug, Clone)]
pub struct Disk {
    block_size: usize,
    blocks: usize,
    backing: Arc<Mutex<Backing>>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut disk_name = String::from("DISK_IMAGE_");
    disk_name.push_str(&name);
    disk_name
}

fn write_header(file: &mut File, block_size: u32, blocks: u32) -> Result<(), std::io::Error> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&block_size.to_be_bytes())?;
    file.seek(SeekFrom::Start(size_of::<u32>() as u64))?;
    file.write_all(&blocks.to_be_bytes())?;
    Ok(())
}

impl Disk {
    /// Creates a file-backed swap image, truncating any previous one.
    pub fn create(name: &str, block_size: usize, blocks: usize) -> Result<Self, DiskError> {
        assert!(block_size > 0, "Block size must be positive");
        let mut file = File::options()
            .truncate(true)
            .write(true)
            .read(true)
            .create(true)
            .open(make_name(name))?;
        file.set_len((HEADER_SIZE + block_size * blocks) as u64)?;
        write_header(&mut file, block_size as u32, blocks as u32)?;
        Ok(Self {
            block_size,
            blocks,
            backing: Arc::new(Mutex::new(Backing::File(file))),
        })
    }

    /// In-memory swap device, gone when the last clone is dropped.
    pub fn volatile(block_size: usize, blocks: usize) -> Self {
        assert!(block_size > 0, "Block size must be positive");
        Self {
            block_size,
            blocks,
            backing: Arc::new(Mutex::new(Backing::Volatile(vec![0; block_size * blocks]))),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    fn check_block(&self, block_number: usize) -> Result<(), DiskError> {
        if block_number >= self.blocks {
            return Err(DiskError::OverCapacity);
        }
        Ok(())
    }

    pub fn read_block(&self, block_number: usize) -> Result<Vec<u8>, DiskError> {
        self.check_block(block_number)?;
        let mut backing = self.backing.lock().unwrap();
        trace!("Start reading block[{}]", block_number);
        let start = block_number * self.block_size;
        let buf = match &mut *backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start((HEADER_SIZE + start) as u64))?;
                let mut buf = vec![0; self.block_size];
                file.read_exact(&mut buf)?;
                buf
            }
            Backing::Volatile(bytes) => bytes[start..start + self.block_size].to_vec(),
        };
        trace!("Done reading block[{}]", block_number);
        Ok(buf)
    }

    pub fn write_block(&self, block_number: usize, block: &[u8]) -> Result<(), DiskError> {
        if block.len() != self.block_size {
            return Err(DiskError::IncorrectBlockSize);
        }
        self.check_block(block_number)?;
        let mut backing = self.backing.lock().unwrap();
        trace!("Start writing block[{}]", block_number);
        let start = block_number * self.block_size;
        match &mut *backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start((HEADER_SIZE + start) as u64))?;
                file.write_all(block)?;
            }
            Backing::Volatile(bytes) => {
                bytes[start..start + self.block_size].copy_from_slice(block);
            }
        }
        trace!("Done writing block[{}]", block_number);
        Ok(())
    }
}
