use thiserror::Error;

use crate::{disk::error::BlockError, fs::layout::InodeNumber};

/// 文件系统错误类型
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error(transparent)]
    Block(#[from] BlockError), // 块服务错误，原样上报
    #[error("No such file or directory: {0}")]
    NotFound(String),
    #[error("File or directory already exists: {0}")]
    AlreadyExists(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Not a regular file: {0}")]
    NotAFile(String),
    #[error("No free inode available")]
    NoFreeInode,
    #[error("No space left")]
    NoSpace, // 位图耗尽或目录项已满
    #[error("File too large: {requested} bytes exceeds the {max} byte limit")]
    FileTooLarge { requested: usize, max: usize },
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Directory is not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("Invalid inode: {0}")]
    InvalidInode(InodeNumber),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Incompatible format: {0}")]
    IncompatibleFormat(String),
    #[error("Disk I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
