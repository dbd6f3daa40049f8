use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid path")]
    InvalidPath,
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("file already exists")]
    AlreadyExists,
    #[error("directory is full")]
    DirectoryFull,
    #[error("inode table is full")]
    InodeTableFull,
    #[error("descriptor table is full")]
    DescriptorTableFull,
    #[error("bad file descriptor")]
    InvalidDescriptor,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("the root directory cannot be created, removed or moved")]
    RootProtected,
    #[error("no space left on device")]
    NoSpace,
    #[error("logical block out of range")]
    OutOfRange,
    #[error("invalid block id")]
    InvalidBlockId,
    #[error("device does not hold a formatted file system")]
    NotFormatted,
    #[error("file system is corrupted")]
    Corrupted,
    #[error("storage I/O error: {0}")]
    StorageIo(std::io::ErrorKind),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::StorageIo(err.kind())
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
