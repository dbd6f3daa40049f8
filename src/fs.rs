use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use enumflags2::BitFlags;

use crate::back_store::{BackStore, BlockId};
use crate::block_dev::{BlockDevice, FileDisk};
use crate::config::*;
use crate::directory::{read_dir, write_dir};
use crate::error::{FsError, Result};
use crate::file::{DescriptorTable, Fd, Whence, fread, fwrite, seek_target};
use crate::inode::{InodeTable, expect_type, reachable_blocks, release_blocks};
use crate::path::{FsPath, resolve};
use crate::structs::*;

/// Metadata of one file or directory, as returned by `stat` and `get_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub name: String,
    pub inode: InodeId,
    pub ftype: FileType,
    pub parent: InodeId,
    pub size: u64,
    pub blocks: u32,
    pub mode: BitFlags<Mode>,
    pub owner: u16,
    pub ctime: u64,
    pub mtime: u64,
}

impl Stat {
    fn new(name: String, id: InodeId, inode: &Inode) -> Self {
        Stat {
            name,
            inode: id,
            ftype: inode.ftype,
            parent: inode.parent,
            size: inode.size as u64,
            blocks: inode.blocks,
            mode: inode.mode,
            owner: inode.owner,
            ctime: inode.ctime,
            mtime: inode.mtime,
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A mounted file system. Owns the backing store, the in-memory inode table
/// and the descriptor table. Not meant to be shared between threads without a
/// lock around the whole instance.
pub struct FileSystem<D: BlockDevice> {
    store: BackStore<D>,
    inodes: InodeTable,
    fds: DescriptorTable,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Lays out an empty file system on `device` and mounts it.
    pub fn format(device: D) -> Result<Self> {
        let mut store = BackStore::create(device)?;
        for id in INODE_TABLE_START..=ROOT_DIR_BLOCK {
            if !store.try_request(id as BlockId)? {
                log::error!("format: reserved block {} unavailable", id);
                return Err(FsError::NoSpace);
            }
        }

        let mut inodes = InodeTable::new();
        let mut root = Inode::new(root_name(), FileType::Directory, ROOT_INODE, now());
        root.block_refs[0] = ROOT_DIR_BLOCK as BlockId;
        root.blocks = 1;
        write_dir(&store, &root, &DirBlock::new())?;
        inodes.set(ROOT_INODE, root);
        inodes.flush(&store)?;
        store.sync()?;

        log::debug!("formatted {} blocks, {} free", store.num_blocks(), store.free_blocks());
        Ok(FileSystem {
            store,
            inodes,
            fds: DescriptorTable::new(),
        })
    }

    /// Mounts a device previously formatted and unmounted.
    pub fn mount(device: D) -> Result<Self> {
        let store = BackStore::open(device)?;
        let inodes = InodeTable::load(&store).map_err(|e| match e {
            FsError::InvalidBlockId => FsError::NotFormatted,
            e => e,
        })?;
        let root = inodes.get(ROOT_INODE);
        if root.ftype != FileType::Directory
            || root.name_bytes() != ROOT_NAME.as_bytes()
            || root.block_refs[0] as usize != ROOT_DIR_BLOCK
        {
            return Err(FsError::NotFormatted);
        }
        let fs = FileSystem {
            store,
            inodes,
            fds: DescriptorTable::new(),
        };
        log::debug!("mounted: {}", fs.dump());
        Ok(fs)
    }

    /// Flushes everything and releases the device. Open descriptors are dropped.
    pub fn unmount(mut self) -> Result<D> {
        self.inodes.flush(&self.store)?;
        let open = self.fds.open_count();
        if open > 0 {
            log::debug!("unmounting with {} open descriptors", open);
        }
        self.store.close()
    }

    /// Writes the inode table and the free-space bitmap without unmounting.
    pub fn sync(&mut self) -> Result<()> {
        self.inodes.flush(&self.store)?;
        self.store.sync()
    }

    /// Creates an empty file or directory. Missing parents are not created.
    /// Returns the inode index of the new file.
    pub fn create(&mut self, path: &str, ftype: FileType) -> Result<InodeId> {
        if path == ROOT_NAME {
            return Err(FsError::RootProtected);
        }
        let path = FsPath::parse(path)?;
        let (parent_path, name) = path.split_last().ok_or(FsError::InvalidPath)?;
        let name = encode_name(name)?;
        let parent_id = resolve(&self.store, &self.inodes, &parent_path)?;
        let parent = *self.inodes.get(parent_id);
        let mut dir = read_dir(&self.store, &parent)?;
        if dir.lookup(&name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if dir.is_full() {
            return Err(FsError::DirectoryFull);
        }
        let id = self.inodes.alloc()?;

        let now = now();
        let mut inode = Inode::new(name, ftype, parent_id, now);
        if ftype == FileType::Directory {
            let block = self.store.try_allocate()?.ok_or(FsError::NoSpace)?;
            inode.block_refs[0] = block;
            inode.blocks = 1;
        }

        dir.insert(DirEntry::new(name, id))?;
        if let Err(e) = write_dir(&self.store, &parent, &dir) {
            if ftype == FileType::Directory {
                self.store.release(inode.block_refs[0]);
            }
            return Err(e);
        }
        self.inodes.set(id, inode);
        self.inodes.get_mut(parent_id).mtime = now;

        log::debug!("created {:?} {} as inode {}", ftype, inode.name_lossy(), id);
        Ok(id)
    }

    /// Resolves a path to its inode index.
    pub fn lookup(&self, path: &str) -> Result<InodeId> {
        resolve(&self.store, &self.inodes, &FsPath::parse(path)?)
    }

    /// Opens a regular file with its position at the beginning.
    pub fn open(&mut self, path: &str) -> Result<Fd> {
        let id = self.lookup(path)?;
        expect_type(self.inodes.get(id), FileType::Regular)?;
        self.fds.open(id)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.fds.close(fd)
    }

    /// Reads up to `buf.len()` bytes from the current position.
    /// Returns fewer bytes at end of file and 0 past it.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let desc = *self.fds.get(fd)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let inode = *self.inodes.get(desc.inode);
        let n = fread(&mut self.store, &inode, desc.offset, buf)?;
        self.fds.get_mut(fd)?.offset += n as u64;
        Ok(n)
    }

    /// Writes `buf` at the current position, extending the file as needed.
    /// Returns fewer bytes than requested when the store fills up.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let desc = *self.fds.get(fd)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inode = *self.inodes.get(desc.inode);
        let result = fwrite(&mut self.store, &mut inode, desc.offset, buf, now());
        // Blocks may have been mapped even when nothing was written.
        self.inodes.set(desc.inode, inode);
        let n = result?;
        self.fds.get_mut(fd)?.offset += n as u64;
        Ok(n)
    }

    /// Moves the position of `fd`, clamped to the file's bounds.
    /// Returns the new position.
    pub fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64> {
        let desc = self.fds.get_mut(fd)?;
        let size = self.inodes.get(desc.inode).size as u64;
        desc.offset = seek_target(desc.offset, size, offset, whence);
        Ok(desc.offset)
    }

    /// Deletes a file or an empty directory and closes its descriptors.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let path = FsPath::parse(path)?;
        let (parent_path, name) = path.split_last().ok_or(FsError::RootProtected)?;
        let parent_id = resolve(&self.store, &self.inodes, &parent_path)?;
        let parent = *self.inodes.get(parent_id);
        let mut dir = read_dir(&self.store, &parent)?;
        let id = dir.lookup(name.as_bytes()).ok_or(FsError::NotFound)?;
        let mut inode = *self.inodes.get(id);
        if inode.ftype == FileType::Directory && read_dir(&self.store, &inode)?.live_count() > 0 {
            return Err(FsError::DirectoryNotEmpty);
        }

        // Every read happens before the entry is unlinked.
        let blocks = reachable_blocks(&self.store, &inode)?;
        dir.remove(name.as_bytes())?;
        write_dir(&self.store, &parent, &dir)?;
        release_blocks(&mut self.store, &mut inode, &blocks);
        self.inodes.clear(id);
        let closed = self.fds.close_inode(id);
        self.inodes.get_mut(parent_id).mtime = now();

        log::debug!("removed {} (inode {}, {} blocks, {} descriptors)", name, id, blocks.len(), closed);
        Ok(())
    }

    /// Moves `src` to `dst`. Descriptors open on the file stay valid.
    pub fn move_file(&mut self, src: &str, dst: &str) -> Result<()> {
        let src_path = FsPath::parse(src)?;
        let dst_path = FsPath::parse(dst)?;
        let (src_parent_path, src_name) = src_path.split_last().ok_or(FsError::RootProtected)?;
        let (dst_parent_path, dst_name) = dst_path.split_last().ok_or(FsError::RootProtected)?;
        let dst_name = encode_name(dst_name)?;

        let src_parent_id = resolve(&self.store, &self.inodes, &src_parent_path)?;
        let src_parent = *self.inodes.get(src_parent_id);
        let mut src_dir = read_dir(&self.store, &src_parent)?;
        let id = src_dir.lookup(src_name.as_bytes()).ok_or(FsError::NotFound)?;

        let dst_parent_id = resolve(&self.store, &self.inodes, &dst_parent_path)?;
        let dst_parent = *self.inodes.get(dst_parent_id);
        if dst_parent.ftype != FileType::Directory {
            return Err(FsError::NotADirectory);
        }
        if self.is_within(dst_parent_id, id) {
            log::warn!("refusing to move {} into its own subtree {}", src, dst);
            return Err(FsError::InvalidArgument);
        }

        if src_parent_id == dst_parent_id {
            src_dir.rename(src_name.as_bytes(), dst_name)?;
            write_dir(&self.store, &src_parent, &src_dir)?;
        } else {
            let mut dst_dir = read_dir(&self.store, &dst_parent)?;
            dst_dir.insert(DirEntry::new(dst_name, id))?;
            src_dir.remove(src_name.as_bytes())?;
            write_dir(&self.store, &dst_parent, &dst_dir)?;
            write_dir(&self.store, &src_parent, &src_dir)?;
        }

        let now = now();
        let inode = self.inodes.get_mut(id);
        inode.name = dst_name;
        inode.parent = dst_parent_id;
        self.inodes.get_mut(src_parent_id).mtime = now;
        self.inodes.get_mut(dst_parent_id).mtime = now;

        log::debug!("moved {} to {}", src, dst);
        Ok(())
    }

    /// Whether `node` is `ancestor` or lies below it.
    fn is_within(&self, mut node: InodeId, ancestor: InodeId) -> bool {
        // The parent chain is at most as long as the table.
        for _ in 0..INODE_COUNT {
            if node == ancestor {
                return true;
            }
            if node == ROOT_INODE {
                return false;
            }
            node = self.inodes.get(node).parent;
        }
        false
    }

    /// Lists the live entries of a directory.
    pub fn get_dir(&self, path: &str) -> Result<Vec<Stat>> {
        let id = self.lookup(path)?;
        let dir = read_dir(&self.store, self.inodes.get(id))?;
        Ok(dir
            .live()
            .map(|entry| {
                let name = String::from_utf8_lossy(trim_zero(&entry.name)).into_owned();
                Stat::new(name, entry.inode, self.inodes.get(entry.inode))
            })
            .collect())
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let id = self.lookup(path)?;
        let inode = self.inodes.get(id);
        Ok(Stat::new(inode.name_lossy(), id, inode))
    }

    /// Stores new permission bits. They are never enforced.
    pub fn set_mode(&mut self, path: &str, mode: BitFlags<Mode>) -> Result<()> {
        let id = self.lookup(path)?;
        let inode = self.inodes.get_mut(id);
        inode.mode = mode;
        inode.mtime = now();
        Ok(())
    }

    pub fn free_blocks(&self) -> usize {
        self.store.free_blocks()
    }

    pub fn free_inodes(&self) -> usize {
        self.inodes.free_count()
    }

    pub fn open_files(&self) -> usize {
        self.fds.open_count()
    }

    pub fn dump(&self) -> String {
        format!(
            "blocks: {}/{} free, inodes: {}/{} free, open files: {}",
            self.store.free_blocks(),
            self.store.num_blocks(),
            self.inodes.free_count(),
            INODE_COUNT,
            self.fds.open_count(),
        )
    }
}

impl FileSystem<FileDisk> {
    /// Formats a new image file of `DEFAULT_BLOCKS` blocks at `path`.
    pub fn format_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::format(FileDisk::create(path, DEFAULT_BLOCKS)?)
    }

    pub fn mount_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::mount(FileDisk::open(path)?)
    }
}
