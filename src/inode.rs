//! Inode table management and logical-to-physical block mapping.

use alloc::vec::Vec;

use crate::back_store::{BackStore, BlockId};
use crate::block_dev::{Block, BlockDevice};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::{FileType, Inode};

/// The whole inode table, held in memory while mounted.
#[derive(Debug, Clone)]
pub struct InodeTable {
    inodes: Vec<Inode>,
    dirty: bool,
}

impl InodeTable {
    pub fn new() -> Self {
        InodeTable {
            inodes: alloc::vec![Inode::empty(); INODE_COUNT],
            dirty: true,
        }
    }

    pub fn load<D: BlockDevice>(store: &BackStore<D>) -> Result<Self> {
        let mut inodes = Vec::with_capacity(INODE_COUNT);
        let mut buf: Block = [0; BLOCK_SIZE];
        for i in 0..INODE_TABLE_BLOCKS {
            store.read((INODE_TABLE_START + i) as BlockId, &mut buf)?;
            for record in buf.chunks_exact(INODE_SIZE) {
                inodes.push(Inode::decode(record)?);
            }
        }
        Ok(InodeTable { inodes, dirty: false })
    }

    /// Writes the table back if anything changed since the last flush.
    pub fn flush<D: BlockDevice>(&mut self, store: &BackStore<D>) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        for (i, chunk) in self.inodes.chunks(INODES_PER_BLOCK).enumerate() {
            let mut buf: Block = [0; BLOCK_SIZE];
            for (inode, record) in chunk.iter().zip(buf.chunks_exact_mut(INODE_SIZE)) {
                inode.encode(record);
            }
            store.write((INODE_TABLE_START + i) as BlockId, &buf)?;
        }
        self.dirty = false;
        Ok(())
    }

    pub fn get(&self, id: u8) -> &Inode {
        &self.inodes[id as usize]
    }

    pub fn get_mut(&mut self, id: u8) -> &mut Inode {
        self.dirty = true;
        &mut self.inodes[id as usize]
    }

    pub fn set(&mut self, id: u8, inode: Inode) {
        self.dirty = true;
        self.inodes[id as usize] = inode;
    }

    /// First free slot, never the root.
    pub fn alloc(&self) -> Result<u8> {
        self.inodes
            .iter()
            .enumerate()
            .skip(ROOT_INODE as usize + 1)
            .find(|(_, inode)| inode.is_free())
            .map(|(i, _)| i as u8)
            .ok_or(FsError::InodeTableFull)
    }

    pub fn clear(&mut self, id: u8) {
        self.set(id, Inode::empty());
    }

    pub fn free_count(&self) -> usize {
        self.inodes.iter().filter(|inode| inode.is_free()).count()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

type IndexBlock = [BlockId; PTRS_PER_BLOCK];

fn read_index<D: BlockDevice>(store: &BackStore<D>, id: BlockId) -> Result<IndexBlock> {
    let mut buf: Block = [0; BLOCK_SIZE];
    store.read(id, &mut buf)?;
    let mut ptrs = [0; PTRS_PER_BLOCK];
    for (ptr, bytes) in ptrs.iter_mut().zip(buf.chunks_exact(2)) {
        *ptr = u16::from_le_bytes([bytes[0], bytes[1]]);
    }
    Ok(ptrs)
}

fn write_index<D: BlockDevice>(store: &BackStore<D>, id: BlockId, ptrs: &IndexBlock) -> Result<()> {
    let mut buf: Block = [0; BLOCK_SIZE];
    for (ptr, bytes) in ptrs.iter().zip(buf.chunks_exact_mut(2)) {
        bytes.copy_from_slice(&ptr.to_le_bytes());
    }
    store.write(id, &buf)
}

fn alloc_block<D: BlockDevice>(store: &mut BackStore<D>) -> Result<BlockId> {
    store.try_allocate()?.ok_or(FsError::NoSpace)
}

/// Returns the pointer at `slot`, allocating a zeroed block for it first when
/// it is absent and `create` is set. The caller persists the array holding `slot`.
fn ensure<D: BlockDevice>(
    store: &mut BackStore<D>,
    slot: &mut BlockId,
    create: bool,
) -> Result<Option<(BlockId, bool)>> {
    if *slot != 0 {
        return Ok(Some((*slot, false)));
    }
    if !create {
        return Ok(None);
    }
    *slot = alloc_block(store)?;
    Ok(Some((*slot, true)))
}

/// Maps logical block `lbn` of `inode` to a physical block id.
///
/// With `create` set, missing data and index blocks are allocated on the way
/// down and `Some` is always returned; otherwise a hole yields `None`.
/// Index blocks are only written back once their pointer array is updated, so
/// running out of space part way leaves every persisted index block valid.
pub fn bmap<D: BlockDevice>(
    store: &mut BackStore<D>,
    inode: &mut Inode,
    lbn: usize,
    create: bool,
) -> Result<Option<BlockId>> {
    if lbn < INDIRECT_START {
        let Some((id, fresh)) = ensure(store, &mut inode.block_refs[lbn], create)? else {
            return Ok(None);
        };
        if fresh {
            inode.blocks += 1;
            log::trace!("lbn {} -> direct block {}", lbn, id);
        }
        return Ok(Some(id));
    }

    if lbn < DOUBLE_INDIRECT_START {
        let Some((indirect, _)) = ensure(store, &mut inode.block_refs[INDIRECT_SLOT], create)? else {
            return Ok(None);
        };
        let mut ptrs = read_index(store, indirect)?;
        let index = lbn - INDIRECT_START;
        let Some((id, fresh)) = ensure(store, &mut ptrs[index], create)? else {
            return Ok(None);
        };
        if fresh {
            write_index(store, indirect, &ptrs)?;
            inode.blocks += 1;
            log::trace!("lbn {} -> block {} via indirect {}", lbn, id, indirect);
        }
        return Ok(Some(id));
    }

    if lbn < MAX_FILE_BLOCKS {
        let Some((outer, _)) = ensure(store, &mut inode.block_refs[DOUBLE_INDIRECT_SLOT], create)? else {
            return Ok(None);
        };
        let rel = lbn - DOUBLE_INDIRECT_START;
        let mut outer_ptrs = read_index(store, outer)?;
        let Some((inner, fresh_inner)) = ensure(store, &mut outer_ptrs[rel / PTRS_PER_BLOCK], create)? else {
            return Ok(None);
        };
        if fresh_inner {
            write_index(store, outer, &outer_ptrs)?;
        }
        let mut inner_ptrs = read_index(store, inner)?;
        let Some((id, fresh)) = ensure(store, &mut inner_ptrs[rel % PTRS_PER_BLOCK], create)? else {
            return Ok(None);
        };
        if fresh {
            write_index(store, inner, &inner_ptrs)?;
            inode.blocks += 1;
            log::trace!("lbn {} -> block {} via double indirect {}/{}", lbn, id, outer, inner);
        }
        return Ok(Some(id));
    }

    Err(FsError::OutOfRange)
}

/// Lists every block reachable from `inode`, index blocks included.
/// Only reads, so callers can gather the list before changing anything.
pub fn reachable_blocks<D: BlockDevice>(store: &BackStore<D>, inode: &Inode) -> Result<Vec<BlockId>> {
    let mut blocks: Vec<BlockId> = inode.block_refs[..NUM_DIRECT]
        .iter()
        .copied()
        .filter(|&id| id != 0)
        .collect();

    let indirect = inode.block_refs[INDIRECT_SLOT];
    if indirect != 0 {
        collect_index(store, indirect, &mut blocks)?;
    }

    let outer = inode.block_refs[DOUBLE_INDIRECT_SLOT];
    if outer != 0 {
        for inner in read_index(store, outer)? {
            if inner != 0 {
                collect_index(store, inner, &mut blocks)?;
            }
        }
        blocks.push(outer);
    }
    Ok(blocks)
}

fn collect_index<D: BlockDevice>(store: &BackStore<D>, index: BlockId, blocks: &mut Vec<BlockId>) -> Result<()> {
    blocks.extend(read_index(store, index)?.into_iter().filter(|&id| id != 0));
    blocks.push(index);
    Ok(())
}

/// Frees `blocks` and drops every reference `inode` holds. Cannot fail.
pub fn release_blocks<D: BlockDevice>(store: &mut BackStore<D>, inode: &mut Inode, blocks: &[BlockId]) {
    for &id in blocks {
        store.release(id);
    }
    inode.block_refs = [0; NUM_BLOCK_REFS];
    inode.blocks = 0;
}

/// Whether the inode's type matches `ftype`, for error selection.
pub fn expect_type(inode: &Inode, ftype: FileType) -> Result<()> {
    match (inode.ftype, ftype) {
        (a, b) if a == b => Ok(()),
        (FileType::Directory, FileType::Regular) => Err(FsError::IsADirectory),
        _ => Err(FsError::NotADirectory),
    }
}
