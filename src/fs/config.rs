use serde::{Deserialize, Serialize};

use crate::fs::error::{FileSystemError, Result};

/// 默认参数：128 字节的块，共 256 块
pub const DEFAULT_BLOCK_SIZE: usize = 128;
pub const DEFAULT_TOTAL_BLOCKS: u32 = 256;

/// 每个 inode 16 字节，最多 16 个 inode
pub const DEFAULT_INODE_SIZE: usize = 16;
pub const DEFAULT_MAX_INODES: u32 = 16;

/// 文件名最长 12 字节，加上 4 字节 inode 号构成一个目录项
pub const DEFAULT_MAX_FILENAME: usize = 12;

/// inode 头部：size(4) + type(2) + refcnt(2)
pub const INODE_HEADER_SIZE: usize = 8;

/// 格式化参数，决定整个磁盘布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub block_size: usize,
    pub total_blocks: u32,
    pub inode_size: usize,
    pub max_inodes: u32,
    pub max_filename: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            total_blocks: DEFAULT_TOTAL_BLOCKS,
            inode_size: DEFAULT_INODE_SIZE,
            max_inodes: DEFAULT_MAX_INODES,
            max_filename: DEFAULT_MAX_FILENAME,
        }
    }
}

impl Geometry {
    /// 检查参数能否排出一个可用的布局
    pub fn validate(&self) -> Result<()> {
        let invalid = |why: &str| Err(FileSystemError::InvalidGeometry(why.to_string()));

        if self.inode_size < INODE_HEADER_SIZE + 4 || self.inode_size % 4 != 0 {
            return invalid("inode size must be a multiple of 4 and at least 12 bytes");
        }
        if self.block_size == 0 || self.block_size % self.inode_size != 0 {
            return invalid("block size must be a multiple of the inode size");
        }
        if self.max_filename == 0 || self.max_filename + 4 > self.block_size {
            return invalid("a directory entry must fit in one block");
        }
        if self.max_inodes == 0 {
            return invalid("at least one inode is required");
        }

        let block_size = self.block_size as u64;
        let bitmap_blocks = (self.total_blocks as u64).div_ceil(block_size);
        let inode_blocks = (self.max_inodes as u64 * self.inode_size as u64).div_ceil(block_size);
        if 2 + bitmap_blocks + inode_blocks >= self.total_blocks as u64 {
            return invalid("no blocks left for the data region");
        }
        Ok(())
    }
}
