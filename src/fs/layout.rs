use crate::{
    disk::types::{BlockNumber, BOOT_BLOCK, SUPER_BLOCK},
    fs::config::{Geometry, INODE_HEADER_SIZE},
};

/// inode 号
pub type InodeNumber = u32;

/// 根目录固定为 0 号 inode
pub const ROOT_INODE: InodeNumber = 0;

/// 由格式化参数推导出的磁盘布局
///
/// ```text
/// | boot | super | bitmap ... | inode table ... | data ... |
///    0      1      2
/// ```
///
/// 引导块不存放数据，首字节用作 `CompoundLock` 的锁字节。
/// 纯计算，构造后不再改变。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub geometry: Geometry,
    pub block_size: usize,
    pub total_blocks: u32,

    pub lock_block: BlockNumber,
    pub bitmap_start: BlockNumber,
    pub bitmap_blocks: u32,
    pub inode_table_start: BlockNumber,
    pub inode_table_blocks: u32,
    pub data_start: BlockNumber,

    pub inode_size: usize,
    pub max_inodes: u32,
    pub inodes_per_block: usize,
    pub max_inode_block_numbers: usize,
    pub max_file_size: usize,

    pub max_filename: usize,
    pub dir_entry_size: usize,
    pub entries_per_block: usize,
}

impl Layout {
    pub fn new(geometry: Geometry) -> Self {
        let block_size = geometry.block_size;
        let bitmap_start = SUPER_BLOCK + 1;
        // 每块一个状态字节，按整块占用
        let bitmap_blocks = (geometry.total_blocks as usize).div_ceil(block_size) as u32;
        let inode_table_start = bitmap_start + bitmap_blocks;
        let inode_table_blocks =
            (geometry.max_inodes as usize * geometry.inode_size).div_ceil(block_size) as u32;
        let data_start = inode_table_start + inode_table_blocks;

        let max_inode_block_numbers = (geometry.inode_size - INODE_HEADER_SIZE) / 4;
        let dir_entry_size = geometry.max_filename + 4;

        Self {
            geometry,
            block_size,
            total_blocks: geometry.total_blocks,
            lock_block: BOOT_BLOCK,
            bitmap_start,
            bitmap_blocks,
            inode_table_start,
            inode_table_blocks,
            data_start,
            inode_size: geometry.inode_size,
            max_inodes: geometry.max_inodes,
            inodes_per_block: block_size / geometry.inode_size,
            max_inode_block_numbers,
            max_file_size: max_inode_block_numbers * block_size,
            max_filename: geometry.max_filename,
            dir_entry_size,
            entries_per_block: block_size / dir_entry_size,
        }
    }

    /// inode 所在的块，以及它在块内的字节偏移
    pub fn inode_position(&self, inode_number: InodeNumber) -> (BlockNumber, usize) {
        let index = inode_number as usize;
        let block = self.inode_table_start + (index / self.inodes_per_block) as u32;
        let offset = (index % self.inodes_per_block) * self.inode_size;
        (block, offset)
    }

    /// 块号在位图中的位置：(位图块号, 块内字节偏移)
    pub fn bitmap_position(&self, block_number: BlockNumber) -> (BlockNumber, usize) {
        let index = block_number as usize;
        let block = self.bitmap_start + (index / self.block_size) as u32;
        (block, index % self.block_size)
    }

    pub fn data_blocks(&self) -> u32 {
        self.total_blocks - self.data_start
    }

    /// 一个目录最多容纳的目录项数
    pub fn max_dir_entries(&self) -> usize {
        self.max_inode_block_numbers * self.entries_per_block
    }
}
