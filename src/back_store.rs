//! Block allocator over a raw device.
//! The first `BITMAP_BLOCKS` blocks of the device hold the free-space bitmap and
//! are never handed out; every other block can be allocated, released, read and
//! written one whole block at a time.

use std::path::Path;

use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::block_dev::{Block, BlockDevice, FileDisk};
use crate::config::*;
use crate::error::{FsError, Result};

pub type BlockId = u16;

pub struct BackStore<D: BlockDevice> {
    device: D,
    bitmap: Bitmap,
}

impl<D: BlockDevice> BackStore<D> {
    /// Initializes an empty store on `device`: only the bitmap blocks are in use.
    pub fn create(device: D) -> Result<Self> {
        let num_blocks = device.num_blocks();
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        let mut bitmap = Bitmap::new(num_blocks);
        for id in 0..BITMAP_BLOCKS {
            bitmap.set(id);
        }
        let store = BackStore { device, bitmap };
        store.sync()?;
        log::debug!("back store created with {} blocks", num_blocks);
        Ok(store)
    }

    /// Loads the bitmap of a store previously written by `create`/`close`.
    pub fn open(device: D) -> Result<Self> {
        let num_blocks = device.num_blocks();
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        let mut bytes = Vec::with_capacity(BITMAP_BLOCKS * BLOCK_SIZE);
        let mut buf: Block = [0; BLOCK_SIZE];
        for id in 0..BITMAP_BLOCKS {
            device.read_block(id, &mut buf)?;
            bytes.extend_from_slice(&buf);
        }
        let bitmap = Bitmap::from_bytes(num_blocks, &bytes);
        if (0..BITMAP_BLOCKS).any(|id| !bitmap.test(id)) {
            return Err(FsError::NotFormatted);
        }
        Ok(BackStore { device, bitmap })
    }

    /// Persists the bitmap and hands the device back.
    pub fn close(self) -> Result<D> {
        self.sync()?;
        Ok(self.device)
    }

    /// Writes the bitmap to its reserved blocks and flushes the device.
    pub fn sync(&self) -> Result<()> {
        let bytes = self.bitmap.to_bytes();
        for (id, chunk) in bytes.chunks(BLOCK_SIZE).enumerate() {
            let mut buf: Block = [0; BLOCK_SIZE];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.device.write_block(id, &buf)?;
        }
        self.device.flush()
    }

    /// Allocates the first free block. Returns `None` once the store is exhausted
    /// or when the block cannot be zero-filled.
    pub fn allocate(&mut self) -> Option<BlockId> {
        self.try_allocate().unwrap_or_else(|e| {
            log::error!("block allocation failed: {}", e);
            None
        })
    }

    /// Like `allocate`, but a device failure is reported instead of looking
    /// like an exhausted store.
    pub fn try_allocate(&mut self) -> Result<Option<BlockId>> {
        let Some(id) = self.bitmap.first_clear() else {
            return Ok(None);
        };
        let Ok(id) = BlockId::try_from(id) else {
            return Ok(None);
        };
        Ok(self.try_request(id)?.then_some(id))
    }

    /// Allocates the specific block `id`, zero-filling it.
    /// Fails if `id` is reserved, out of range or already in use.
    pub fn request(&mut self, id: BlockId) -> bool {
        self.try_request(id).unwrap_or_else(|e| {
            log::error!("failed to zero block {}: {}", id, e);
            false
        })
    }

    /// Like `request`, but propagates the device error of the zero-fill.
    pub fn try_request(&mut self, id: BlockId) -> Result<bool> {
        let idx = id as usize;
        if idx < BITMAP_BLOCKS || idx >= self.bitmap.len() || self.bitmap.test(idx) {
            return Ok(false);
        }
        self.device.write_block(idx, &[0; BLOCK_SIZE])?;
        self.bitmap.set(idx);
        Ok(true)
    }

    /// Marks `id` free again. Releasing a free or reserved block does nothing.
    pub fn release(&mut self, id: BlockId) {
        let idx = id as usize;
        if idx < BITMAP_BLOCKS {
            return;
        }
        self.bitmap.clear(idx);
    }

    /// Reads an allocated block.
    pub fn read(&self, id: BlockId, buf: &mut Block) -> Result<()> {
        let idx = id as usize;
        if idx < BITMAP_BLOCKS || !self.bitmap.test(idx) {
            return Err(FsError::InvalidBlockId);
        }
        self.device.read_block(idx, buf)
    }

    pub fn write(&self, id: BlockId, buf: &Block) -> Result<()> {
        let idx = id as usize;
        if idx < BITMAP_BLOCKS || idx >= self.bitmap.len() {
            return Err(FsError::InvalidBlockId);
        }
        self.device.write_block(idx, buf)
    }

    pub fn is_allocated(&self, id: BlockId) -> bool {
        self.bitmap.test(id as usize)
    }

    pub fn num_blocks(&self) -> usize {
        self.bitmap.len()
    }

    pub fn free_blocks(&self) -> usize {
        self.bitmap.len() - self.bitmap.count_ones()
    }
}

impl BackStore<FileDisk> {
    pub fn create_file(path: impl AsRef<Path>, num_blocks: usize) -> Result<Self> {
        Self::create(FileDisk::create(path, num_blocks)?)
    }

    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(FileDisk::open(path)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_dev::RamDisk;

    #[test]
    fn test_allocate_skips_reserved() {
        let mut store = BackStore::create(RamDisk::new(MIN_BLOCKS)).unwrap();
        assert_eq!(store.allocate(), Some(BITMAP_BLOCKS as BlockId));
        assert!(!store.request(0));
        assert!(!store.request(BITMAP_BLOCKS as BlockId));
        assert!(store.request(20));
        assert_eq!(store.free_blocks(), MIN_BLOCKS - BITMAP_BLOCKS - 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut store = BackStore::create(RamDisk::new(MIN_BLOCKS)).unwrap();
        for _ in BITMAP_BLOCKS..MIN_BLOCKS {
            assert!(store.allocate().is_some());
        }
        assert_eq!(store.allocate(), None);
        store.release(30);
        assert_eq!(store.allocate(), Some(30));
    }

    #[test]
    fn test_allocated_block_is_zeroed() {
        let mut store = BackStore::create(RamDisk::new(MIN_BLOCKS)).unwrap();
        let id = store.allocate().unwrap();
        store.write(id, &[0xAB; BLOCK_SIZE]).unwrap();
        store.release(id);
        assert_eq!(store.read(id, &mut [0; BLOCK_SIZE]), Err(FsError::InvalidBlockId));
        assert_eq!(store.allocate(), Some(id));
        let mut buf = [0xFF; BLOCK_SIZE];
        store.read(id, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_try_allocate_exhaustion() {
        let mut store = BackStore::create(RamDisk::new(MIN_BLOCKS)).unwrap();
        for _ in BITMAP_BLOCKS..MIN_BLOCKS {
            assert!(store.try_allocate().unwrap().is_some());
        }
        assert_eq!(store.try_allocate(), Ok(None));
        assert_eq!(store.try_request(0), Ok(false));
    }

    #[test]
    fn test_reopen_keeps_bitmap() {
        let mut store = BackStore::create(RamDisk::new(MIN_BLOCKS * 2)).unwrap();
        assert!(store.request(50));
        let device = store.close().unwrap();
        let store = BackStore::open(device).unwrap();
        assert!(store.is_allocated(50));
        assert!(!store.is_allocated(51));
    }

    #[test]
    fn test_open_unformatted() {
        assert_eq!(
            BackStore::open(RamDisk::new(MIN_BLOCKS)).err(),
            Some(FsError::NotFormatted)
        );
    }
}
