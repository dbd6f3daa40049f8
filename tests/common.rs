//! Common utilities for tests
#![allow(dead_code)]

use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tauon::{Block, BlockDevice, Error, FileSystem, RamDisk, Result};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// Routes the crate's `log` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A freshly formatted file system on a RAM disk of `num_blocks` blocks.
pub fn ram_fs(num_blocks: usize) -> FileSystem<RamDisk> {
    init_logger();
    FileSystem::format(RamDisk::new(num_blocks)).unwrap()
}

/// Deterministic, non-repeating-per-block content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 1024) as u8).collect()
}

/// Switches shared between a test and a `FlakyDisk` it handed to a file system.
pub struct Faults {
    writes: AtomicBool,
    read_of: AtomicUsize,
}

impl Faults {
    pub fn new() -> Arc<Self> {
        Arc::new(Faults {
            writes: AtomicBool::new(false),
            read_of: AtomicUsize::new(usize::MAX),
        })
    }

    /// Every block write fails while set.
    pub fn fail_writes(&self, on: bool) {
        self.writes.store(on, Ordering::SeqCst);
    }

    /// Reads of `block_id` fail until `heal` is called.
    pub fn fail_reads_of(&self, block_id: usize) {
        self.read_of.store(block_id, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.writes.store(false, Ordering::SeqCst);
        self.read_of.store(usize::MAX, Ordering::SeqCst);
    }
}

/// A RAM disk whose reads and writes can be made to fail on demand.
pub struct FlakyDisk {
    inner: RamDisk,
    faults: Arc<Faults>,
}

impl FlakyDisk {
    pub fn new(num_blocks: usize, faults: &Arc<Faults>) -> Self {
        FlakyDisk {
            inner: RamDisk::new(num_blocks),
            faults: Arc::clone(faults),
        }
    }
}

impl BlockDevice for FlakyDisk {
    fn num_blocks(&self) -> usize {
        self.inner.num_blocks()
    }

    fn read_block(&self, block_id: usize, buf: &mut Block) -> Result<()> {
        if self.faults.read_of.load(Ordering::SeqCst) == block_id {
            return Err(Error::StorageIo(ErrorKind::Other));
        }
        self.inner.read_block(block_id, buf)
    }

    fn write_block(&self, block_id: usize, buf: &Block) -> Result<()> {
        if self.faults.writes.load(Ordering::SeqCst) {
            return Err(Error::StorageIo(ErrorKind::Other));
        }
        self.inner.write_block(block_id, buf)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

/// A formatted file system on a `FlakyDisk`, with its fault switches.
pub fn flaky_fs(num_blocks: usize) -> (FileSystem<FlakyDisk>, Arc<Faults>) {
    init_logger();
    let faults = Faults::new();
    let fs = FileSystem::format(FlakyDisk::new(num_blocks, &faults)).unwrap();
    (fs, faults)
}
