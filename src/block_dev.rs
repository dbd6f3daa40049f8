//! Raw fixed-size block devices. A device knows nothing about allocation,
//! it only moves whole blocks in and out.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use crate::config::*;
use crate::error::{FsError, Result};

pub type Block = [u8; BLOCK_SIZE];

pub trait BlockDevice: Send + Sync {
    /// Returns the number of blocks in the block device.
    fn num_blocks(&self) -> usize;

    /// Reads one whole block into `buf`.
    fn read_block(&self, block_id: usize, buf: &mut Block) -> Result<()>;

    /// Writes one whole block from `buf`.
    fn write_block(&self, block_id: usize, buf: &Block) -> Result<()>;

    /// Flushes any buffered data to the underlying medium.
    fn flush(&self) -> Result<()>;

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }
}

/// A device kept entirely in memory.
pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
    num_blocks: usize,
}

impl RamDisk {
    pub fn new(num_blocks: usize) -> Self {
        RamDisk {
            inner: Mutex::new(vec![0u8; num_blocks * BLOCK_SIZE]),
            num_blocks,
        }
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut Block) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(FsError::InvalidBlockId);
        }
        let start = block_id * BLOCK_SIZE;
        let data = self.inner.lock();
        buf.copy_from_slice(&data[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &Block) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(FsError::InvalidBlockId);
        }
        let start = block_id * BLOCK_SIZE;
        let mut data = self.inner.lock();
        data[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Logs a failed host operation before handing it on as `StorageIo`.
fn storage_err(what: &'static str, block_id: usize) -> impl FnOnce(std::io::Error) -> FsError {
    move |err| {
        log::error!("{} of block {} failed: {}", what, block_id, err);
        FsError::from(err)
    }
}

fn image_err(path: &Path) -> impl FnOnce(std::io::Error) -> FsError + '_ {
    move |err| {
        log::error!("image {}: {}", path.display(), err);
        FsError::from(err)
    }
}

/// A device stored in a host file, block `n` at byte offset `n * BLOCK_SIZE`.
pub struct FileDisk {
    inner: Mutex<File>,
    num_blocks: usize,
}

impl FileDisk {
    /// Creates (or truncates) an image file sized for `num_blocks` blocks.
    pub fn create(path: impl AsRef<Path>, num_blocks: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || !(MIN_BLOCKS..=MAX_BLOCKS).contains(&num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(image_err(path))?;
        file.set_len((num_blocks * BLOCK_SIZE) as u64).map_err(image_err(path))?;
        log::debug!("created image {} with {} blocks", path.display(), num_blocks);
        Ok(FileDisk {
            inner: Mutex::new(file),
            num_blocks,
        })
    }

    /// Opens an existing image file. Never creates one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(FsError::InvalidArgument);
        }
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(image_err(path))?;
        let len = file.metadata().map_err(image_err(path))?.len() as usize;
        let num_blocks = len / BLOCK_SIZE;
        if len % BLOCK_SIZE != 0 || !(MIN_BLOCKS..=MAX_BLOCKS).contains(&num_blocks) {
            log::warn!("image {} has unexpected length {}", path.display(), len);
            return Err(FsError::NotFormatted);
        }
        Ok(FileDisk {
            inner: Mutex::new(file),
            num_blocks,
        })
    }
}

impl BlockDevice for FileDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut Block) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(FsError::InvalidBlockId);
        }
        let mut file = self.inner.lock();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(storage_err("seek", block_id))?;
        file.read_exact(buf).map_err(storage_err("read", block_id))?;
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &Block) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(FsError::InvalidBlockId);
        }
        let mut file = self.inner.lock();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(storage_err("seek", block_id))?;
        file.write_all(buf).map_err(storage_err("write", block_id))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.inner.lock();
        file.flush().and_then(|_| file.sync_data()).map_err(|err| {
            log::error!("flushing image failed: {}", err);
            FsError::from(err)
        })?;
        Ok(())
    }
}
