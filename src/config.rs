//! On-disk geometry. Every range boundary is derived from `BLOCK_SIZE` and the
//! 16-bit block id width, so changing one of them keeps the layout consistent.

pub const BLOCK_SIZE: usize = 1024;

/// Block ids are `u16`, which caps the device at 65536 blocks (64 MiB).
pub const MAX_BLOCKS: usize = 1 << 16;
/// Default image size used by `FileDisk`-backed file systems.
pub const DEFAULT_BLOCKS: usize = MAX_BLOCKS;

/// The free-space bitmap lives in the first blocks of the device, one bit per block.
pub const BITMAP_BLOCKS: usize = MAX_BLOCKS / (BLOCK_SIZE * 8);

pub const INODE_COUNT: usize = 256;
pub const INODE_SIZE: usize = 128;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const INODE_TABLE_START: usize = BITMAP_BLOCKS;
pub const INODE_TABLE_BLOCKS: usize = INODE_COUNT / INODES_PER_BLOCK;
/// First block past the inode table; holds the root directory.
pub const ROOT_DIR_BLOCK: usize = INODE_TABLE_START + INODE_TABLE_BLOCKS;
pub const ROOT_INODE: u8 = 0;
pub const ROOT_NAME: &str = "/";

/// Smallest device that still leaves data blocks after the reserved runs.
pub const MIN_BLOCKS: usize = ROOT_DIR_BLOCK + 8;

/// Name field of inodes and directory entries, NUL padded.
pub const NAME_FIELD_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;
pub const MAX_PATH_LEN: usize = 4095;

pub const DIR_ENTRY_SIZE: usize = NAME_FIELD_LEN + 1; // name + inode index
/// As many entries as fit in one block.
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

pub const NUM_BLOCK_REFS: usize = 8;
pub const NUM_DIRECT: usize = 6;
pub const INDIRECT_SLOT: usize = NUM_DIRECT;
pub const DOUBLE_INDIRECT_SLOT: usize = NUM_DIRECT + 1;
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / core::mem::size_of::<u16>();

pub const INDIRECT_START: usize = NUM_DIRECT;
pub const DOUBLE_INDIRECT_START: usize = INDIRECT_START + PTRS_PER_BLOCK;
/// Logical blocks addressable by one inode.
pub const MAX_FILE_BLOCKS: usize = DOUBLE_INDIRECT_START + PTRS_PER_BLOCK * PTRS_PER_BLOCK;

pub const MAX_OPEN_FILES: usize = 256;

pub const DEFAULT_FILE_MODE: u16 = 0o644;
pub const DEFAULT_DIR_MODE: u16 = 0o755;
