//! Directory blocks: name to inode index maps of fixed capacity.

use crate::back_store::BackStore;
use crate::block_dev::{Block, BlockDevice};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::*;

impl DirBlock {
    /// Query the inode index of an entry by name.
    pub fn lookup(&self, name: &[u8]) -> Option<u8> {
        self.entries
            .iter()
            .find(|entry| entry.name_eq(name))
            .map(|entry| entry.inode)
    }

    /// Add an entry in the first free slot.
    pub fn insert(&mut self, entry: DirEntry) -> Result<()> {
        if self.lookup(&entry.name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|slot| slot.is_free())
            .ok_or(FsError::DirectoryFull)?;
        *slot = entry;
        Ok(())
    }

    /// Remove an entry by name, returning the inode index it pointed at.
    pub fn remove(&mut self, name: &[u8]) -> Result<u8> {
        let slot = self
            .entries
            .iter_mut()
            .find(|entry| entry.name_eq(name))
            .ok_or(FsError::NotFound)?;
        let inode = slot.inode;
        *slot = DirEntry::NULL;
        Ok(inode)
    }

    /// Rename an entry in place. Needs no free slot.
    pub fn rename(&mut self, old: &[u8], new: [u8; NAME_FIELD_LEN]) -> Result<()> {
        if self.lookup(&new).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|entry| entry.name_eq(old))
            .ok_or(FsError::NotFound)?;
        slot.name = new;
        Ok(())
    }

    pub fn live(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|entry| !entry.is_free())
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn is_full(&self) -> bool {
        self.live_count() == DIR_ENTRIES_PER_BLOCK
    }
}

/// Reads the entries of directory inode `dir`.
pub fn read_dir<D: BlockDevice>(store: &BackStore<D>, dir: &Inode) -> Result<DirBlock> {
    if dir.ftype != FileType::Directory {
        return Err(FsError::NotADirectory);
    }
    let mut buf: Block = [0; BLOCK_SIZE];
    store.read(dir.block_refs[0], &mut buf)?;
    Ok(DirBlock::decode(&buf))
}

pub fn write_dir<D: BlockDevice>(store: &BackStore<D>, dir: &Inode, block: &DirBlock) -> Result<()> {
    if dir.ftype != FileType::Directory {
        return Err(FsError::NotADirectory);
    }
    store.write(dir.block_refs[0], &block.encode())
}
