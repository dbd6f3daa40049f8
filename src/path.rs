//! Path parsing and resolution.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::back_store::BackStore;
use crate::block_dev::BlockDevice;
use crate::config::*;
use crate::directory::read_dir;
use crate::error::{FsError, Result};
use crate::inode::InodeTable;
use crate::structs::FileType;

/// An absolute path split into owned components. The root has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsPath {
    components: Vec<String>,
}

impl FsPath {
    /// Both `""` and `"/"` name the root. Anything else must start with a
    /// slash, must not end with one and may not contain empty components.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() || path == ROOT_NAME {
            return Ok(FsPath { components: Vec::new() });
        }
        if path.len() > MAX_PATH_LEN || !path.starts_with('/') || path.ends_with('/') {
            return Err(FsError::InvalidPath);
        }
        let components = path[1..]
            .split('/')
            .map(|part| {
                if part.is_empty() || part.len() > MAX_NAME_LEN || part.contains('\0') {
                    Err(FsError::InvalidPath)
                } else {
                    Ok(part.to_string())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FsPath { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Splits into the parent directory and the final component.
    pub fn split_last(&self) -> Option<(FsPath, &str)> {
        let (last, parent) = self.components.split_last()?;
        Some((
            FsPath {
                components: parent.to_vec(),
            },
            last.as_str(),
        ))
    }
}

/// Walks `path` from the root and returns the inode index it names.
pub fn resolve<D: BlockDevice>(store: &BackStore<D>, table: &InodeTable, path: &FsPath) -> Result<u8> {
    let mut current = ROOT_INODE;
    for component in path.components() {
        let inode = table.get(current);
        if inode.ftype != FileType::Directory {
            return Err(FsError::NotADirectory);
        }
        let dir = read_dir(store, inode)?;
        current = dir.lookup(component.as_bytes()).ok_or(FsError::NotFound)?;
    }
    Ok(current)
}
