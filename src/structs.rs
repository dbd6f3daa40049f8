//! On-disk records and their little-endian encodings.

use alloc::string::String;

use enumflags2::{BitFlags, bitflags};

use crate::back_store::BlockId;
use crate::block_dev::Block;
use crate::config::*;
use crate::error::{FsError, Result};

/// Index into the inode table.
pub type InodeId = u8;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular = 0,
    Directory = 1,
}

impl TryFrom<u8> for FileType {
    type Error = FsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FileType::Regular),
            1 => Ok(FileType::Directory),
            _ => Err(FsError::InvalidArgument),
        }
    }
}

/// Permission bits. Stored with every inode, never enforced.
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OtherExec = 0o001,
    OtherWrite = 0o002,
    OtherRead = 0o004,
    GroupExec = 0o010,
    GroupWrite = 0o020,
    GroupRead = 0o040,
    OwnerExec = 0o100,
    OwnerWrite = 0o200,
    OwnerRead = 0o400,
}

pub fn trim_zero(name: &[u8]) -> &[u8] {
    let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
    &name[..end]
}

/// Packs a single path component into a NUL padded name field.
pub fn encode_name(name: &str) -> Result<[u8; NAME_FIELD_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN || bytes.iter().any(|&c| c == 0 || c == b'/') {
        return Err(FsError::InvalidPath);
    }
    let mut field = [0u8; NAME_FIELD_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Name field of the root inode. It is the only name containing a slash.
pub fn root_name() -> [u8; NAME_FIELD_LEN] {
    let mut field = [0u8; NAME_FIELD_LEN];
    field[..ROOT_NAME.len()].copy_from_slice(ROOT_NAME.as_bytes());
    field
}

/// A file record: 128 bytes in the inode table.
///
/// | offset | field        |
/// |--------|--------------|
/// | 0      | name[64]     |
/// | 64     | type u8      |
/// | 65     | parent u8    |
/// | 66     | mode u16     |
/// | 68     | owner u16    |
/// | 72     | size u32     |
/// | 76     | blocks u32   |
/// | 80     | ctime u64    |
/// | 88     | mtime u64    |
/// | 96     | block_refs[8] u16 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub name: [u8; NAME_FIELD_LEN],
    pub ftype: FileType,
    /// Inode index of the containing directory. The root is its own parent.
    pub parent: u8,
    pub mode: BitFlags<Mode>,
    pub owner: u16,
    /// Logical length in bytes.
    pub size: u32,
    /// Data blocks currently mapped, index blocks excluded.
    pub blocks: u32,
    pub ctime: u64,
    pub mtime: u64,
    /// 0..6 direct, 6 single-indirect, 7 double-indirect. 0 means absent.
    pub block_refs: [BlockId; NUM_BLOCK_REFS],
}

impl Inode {
    pub fn empty() -> Self {
        Inode {
            name: [0; NAME_FIELD_LEN],
            ftype: FileType::Regular,
            parent: 0,
            mode: BitFlags::empty(),
            owner: 0,
            size: 0,
            blocks: 0,
            ctime: 0,
            mtime: 0,
            block_refs: [0; NUM_BLOCK_REFS],
        }
    }

    pub fn new(name: [u8; NAME_FIELD_LEN], ftype: FileType, parent: u8, now: u64) -> Self {
        let mode = match ftype {
            FileType::Regular => DEFAULT_FILE_MODE,
            FileType::Directory => DEFAULT_DIR_MODE,
        };
        Inode {
            name,
            ftype,
            parent,
            mode: BitFlags::from_bits_truncate(mode),
            ctime: now,
            mtime: now,
            ..Inode::empty()
        }
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name_bytes(&self) -> &[u8] {
        trim_zero(&self.name)
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..INODE_SIZE].fill(0);
        buf[..NAME_FIELD_LEN].copy_from_slice(&self.name);
        buf[64] = self.ftype as u8;
        buf[65] = self.parent;
        buf[66..68].copy_from_slice(&self.mode.bits().to_le_bytes());
        buf[68..70].copy_from_slice(&self.owner.to_le_bytes());
        buf[72..76].copy_from_slice(&self.size.to_le_bytes());
        buf[76..80].copy_from_slice(&self.blocks.to_le_bytes());
        buf[80..88].copy_from_slice(&self.ctime.to_le_bytes());
        buf[88..96].copy_from_slice(&self.mtime.to_le_bytes());
        for (i, id) in self.block_refs.iter().enumerate() {
            buf[96 + i * 2..98 + i * 2].copy_from_slice(&id.to_le_bytes());
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&buf[..NAME_FIELD_LEN]);
        let mut block_refs = [0; NUM_BLOCK_REFS];
        for (i, id) in block_refs.iter_mut().enumerate() {
            *id = u16::from_le_bytes([buf[96 + i * 2], buf[97 + i * 2]]);
        }
        Ok(Inode {
            name,
            ftype: FileType::try_from(buf[64]).map_err(|_| FsError::Corrupted)?,
            parent: buf[65],
            mode: BitFlags::from_bits_truncate(u16::from_le_bytes([buf[66], buf[67]])),
            owner: u16::from_le_bytes([buf[68], buf[69]]),
            size: u32::from_le_bytes([buf[72], buf[73], buf[74], buf[75]]),
            blocks: u32::from_le_bytes([buf[76], buf[77], buf[78], buf[79]]),
            ctime: u64::from_le_bytes(buf[80..88].try_into().map_err(|_| FsError::Corrupted)?),
            mtime: u64::from_le_bytes(buf[88..96].try_into().map_err(|_| FsError::Corrupted)?),
            block_refs,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; NAME_FIELD_LEN],
    pub inode: u8,
}

impl DirEntry {
    pub const NULL: Self = Self {
        name: [0; NAME_FIELD_LEN],
        inode: 0,
    };

    pub fn new(name: [u8; NAME_FIELD_LEN], inode: u8) -> Self {
        DirEntry { name, inode }
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name_eq(&self, name: &[u8]) -> bool {
        !self.is_free() && trim_zero(&self.name) == trim_zero(name)
    }
}

/// A directory's single data block: a fixed array of entries, free slots
/// have an empty name. The tail of the block past the entries is unused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirBlock {
    pub entries: [DirEntry; DIR_ENTRIES_PER_BLOCK],
}

impl DirBlock {
    pub fn new() -> Self {
        DirBlock {
            entries: [DirEntry::NULL; DIR_ENTRIES_PER_BLOCK],
        }
    }

    pub fn encode(&self) -> Block {
        let mut buf = [0u8; BLOCK_SIZE];
        for (slot, entry) in buf.chunks_exact_mut(DIR_ENTRY_SIZE).zip(self.entries.iter()) {
            slot[..NAME_FIELD_LEN].copy_from_slice(&entry.name);
            slot[NAME_FIELD_LEN] = entry.inode;
        }
        buf
    }

    pub fn decode(buf: &Block) -> Self {
        let mut dir = DirBlock::new();
        for (entry, slot) in dir.entries.iter_mut().zip(buf.chunks_exact(DIR_ENTRY_SIZE)) {
            entry.name.copy_from_slice(&slot[..NAME_FIELD_LEN]);
            entry.inode = slot[NAME_FIELD_LEN];
        }
        dir
    }
}

impl Default for DirBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inode_layout() {
        let mut inode = Inode::new(encode_name("notes.txt").unwrap(), FileType::Regular, 3, 42);
        inode.size = 5000;
        inode.blocks = 5;
        inode.block_refs = [41, 42, 43, 44, 45, 0, 0, 900];
        let mut buf = [0u8; INODE_SIZE];
        inode.encode(&mut buf);
        assert_eq!(&buf[..9], b"notes.txt");
        assert_eq!(buf[64], FileType::Regular as u8);
        assert_eq!(buf[65], 3);
        assert_eq!(u16::from_le_bytes([buf[66], buf[67]]), DEFAULT_FILE_MODE);
        assert_eq!(Inode::decode(&buf).unwrap(), inode);
    }

    #[test]
    fn test_encode_name() {
        assert!(encode_name("a").is_ok());
        assert!(encode_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert_eq!(encode_name(&"x".repeat(MAX_NAME_LEN + 1)), Err(FsError::InvalidPath));
        assert_eq!(encode_name(""), Err(FsError::InvalidPath));
        assert_eq!(encode_name("a/b"), Err(FsError::InvalidPath));
    }

    #[test]
    fn test_dir_block_fits() {
        assert_eq!(DIR_ENTRIES_PER_BLOCK, 15);
        let mut dir = DirBlock::new();
        dir.entries[14] = DirEntry::new(encode_name("last").unwrap(), 200);
        let decoded = DirBlock::decode(&dir.encode());
        assert!(decoded.entries[14].name_eq(b"last"));
        assert_eq!(decoded.entries[14].inode, 200);
        assert!(decoded.entries[..14].iter().all(DirEntry::is_free));
    }
}
