//! Open file descriptors and byte-level I/O over inodes.

use alloc::vec;
use alloc::vec::Vec;

use crate::back_store::BackStore;
use crate::block_dev::{Block, BlockDevice};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::inode::bmap;
use crate::structs::Inode;

pub type Fd = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = FsError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(FsError::InvalidArgument),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub inode: u8,
    pub offset: u64,
}

/// Fixed-size table of open files. `None` marks a free slot.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    slots: Vec<Option<FileDescriptor>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        DescriptorTable {
            slots: vec![None; MAX_OPEN_FILES],
        }
    }

    pub fn open(&mut self, inode: u8) -> Result<Fd> {
        let (fd, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(FsError::DescriptorTableFull)?;
        *slot = Some(FileDescriptor { inode, offset: 0 });
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(FsError::InvalidDescriptor)
    }

    pub fn get(&self, fd: Fd) -> Result<&FileDescriptor> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::InvalidDescriptor)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut FileDescriptor> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::InvalidDescriptor)
    }

    /// Closes every descriptor open on `inode`, returning how many there were.
    pub fn close_inode(&mut self, inode: u8) -> usize {
        let mut closed = 0;
        for slot in self.slots.iter_mut() {
            if slot.is_some_and(|desc| desc.inode == inode) {
                *slot = None;
                closed += 1;
            }
        }
        closed
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes a seek target, clamped to `[0, size]`.
pub fn seek_target(current: u64, size: u64, offset: i64, whence: Whence) -> u64 {
    let base = match whence {
        Whence::Set => 0,
        Whence::Cur => current,
        Whence::End => size,
    };
    let target = (base as i128 + offset as i128).clamp(0, size as i128);
    target as u64
}

/// Reads from `inode` at `offset` into `buffer`, stopping at end of file.
/// Returns the number of bytes copied.
pub fn fread<D: BlockDevice>(
    store: &mut BackStore<D>,
    inode: &Inode,
    offset: u64,
    buffer: &mut [u8],
) -> Result<usize> {
    let size = inode.size as u64;
    if offset >= size {
        return Ok(0);
    }
    let total = buffer.len().min((size - offset) as usize);
    // Lookups never allocate, so a scratch copy keeps the table untouched.
    let mut scratch = *inode;
    let mut block_buf: Block = [0; BLOCK_SIZE];
    let mut bytes_read = 0;

    while bytes_read < total {
        let pos = offset as usize + bytes_read;
        let inner = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - inner).min(total - bytes_read);
        let block_id = bmap(store, &mut scratch, pos / BLOCK_SIZE, false)?.ok_or_else(|| {
            log::error!("block {} of a {}-byte file is not mapped", pos / BLOCK_SIZE, size);
            FsError::Corrupted
        })?;
        store.read(block_id, &mut block_buf)?;
        buffer[bytes_read..bytes_read + chunk].copy_from_slice(&block_buf[inner..inner + chunk]);
        bytes_read += chunk;
    }

    Ok(bytes_read)
}

/// Writes `buffer` into `inode` at `offset`, allocating blocks as needed.
///
/// When the store runs out of space (or the file reaches its maximum extent)
/// part way, the bytes already written are kept, the size is updated to cover
/// exactly them, and their count is returned. Only a write that makes no
/// progress at all reports the error.
pub fn fwrite<D: BlockDevice>(
    store: &mut BackStore<D>,
    inode: &mut Inode,
    offset: u64,
    buffer: &[u8],
    now: u64,
) -> Result<usize> {
    debug_assert!(offset <= inode.size as u64, "writes never leave holes");
    let mut block_buf: Block = [0; BLOCK_SIZE];
    let mut bytes_written = 0;
    let mut failure = None;

    while bytes_written < buffer.len() {
        let pos = offset as usize + bytes_written;
        let inner = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - inner).min(buffer.len() - bytes_written);
        let block_id = match bmap(store, inode, pos / BLOCK_SIZE, true) {
            Ok(Some(id)) => id,
            Ok(None) => {
                failure = Some(FsError::Corrupted);
                break;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        };
        if chunk < BLOCK_SIZE {
            if let Err(e) = store.read(block_id, &mut block_buf) {
                failure = Some(e);
                break;
            }
        }
        block_buf[inner..inner + chunk].copy_from_slice(&buffer[bytes_written..bytes_written + chunk]);
        if let Err(e) = store.write(block_id, &block_buf) {
            failure = Some(e);
            break;
        }
        bytes_written += chunk;
    }

    let end = offset + bytes_written as u64;
    if end > inode.size as u64 {
        inode.size = end as u32;
    }
    if bytes_written > 0 {
        inode.mtime = now;
    }

    match failure {
        Some(e) if bytes_written == 0 => Err(e),
        Some(e) => {
            log::warn!("short write: {} of {} bytes ({})", bytes_written, buffer.len(), e);
            Ok(bytes_written)
        }
        None => Ok(bytes_written),
    }
}
