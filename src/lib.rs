//! Tauon is a small single-user file system living on a fixed-size block store.
//! It has one flat namespace tree, regular files and directories, and byte
//! granular reads and writes through numeric descriptors.
//!
//! Tauon's linear layout (1 KiB blocks, 16-bit block ids):
//! - Block Bitmap:   blocks 0..8, one bit per block of the device
//! - Inode Table:    blocks 8..40, 256 records of 128 bytes
//! - Root Directory: block 40
//! - Data Blocks:    everything after, handed out by the bitmap
//!
//! Tauon's layers (from bottom to top):
//! 1. Block Device: fixed-size block I/O.                       RamDisk, FileDisk, or user implemented
//! 2. Back Store: block allocation over a device.               Bitmap persisted in the reserved blocks
//! 3. Inode: file metadata and block mapping.                   Direct, indirect and double indirect refs
//! 4. Directory/Path: name to inode maps and path resolution.   One block per directory
//! 5. File: descriptors and byte-level I/O.                     Short writes when space runs out
//! 6. FileSystem: the interface for users.                      Owns everything above

extern crate alloc;

mod config;
mod error;
mod block_dev;
mod bitmap;
mod back_store;
mod structs;
mod inode;
mod directory;
mod path;
mod file;
mod fs;

pub use block_dev::{Block, BlockDevice, FileDisk, RamDisk};
pub use back_store::{BackStore, BlockId};
pub use config::*;
pub use structs::*;
pub use inode::{InodeTable, bmap, reachable_blocks, release_blocks};
pub use path::FsPath;
pub use file::{Fd, Whence};
pub use fs::*;
pub use error::FsError as Error;
pub use error::Result;
pub use enumflags2::BitFlags;
