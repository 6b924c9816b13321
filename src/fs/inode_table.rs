use std::sync::Arc;

use log::debug;

use crate::{
    disk::{types::BOOT_BLOCK, BlockDevice, BlockNumber},
    fs::{
        data_block_bitmap::DataBlockBitmap,
        error::{FileSystemError, Result},
        layout::{InodeNumber, Layout},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InodeType {
    Invalid = 0,   // 空闲槽位
    File = 1,      // 文件
    Directory = 2, // 目录
    Symlink = 3,   // 符号链接
}

impl InodeType {
    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Invalid),
            1 => Some(Self::File),
            2 => Some(Self::Directory),
            3 => Some(Self::Symlink),
            _ => None,
        }
    }
}

/// 定长 inode 记录
///
/// ```text
/// | size: u32 | type: u16 | refcnt: u16 | block_numbers: [u32; N] |
/// ```
///
/// 引导块永远不会被分配，因此用它的块号表示空槽。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub size: u32,             // 已用字节数
    pub inode_type: InodeType, // 文件类型
    pub refcnt: u16,           // 硬链接数（有多少目录项链接到该 inode）
    pub block_numbers: Vec<BlockNumber>,
}

impl Inode {
    pub fn new(inode_type: InodeType, slots: usize) -> Self {
        Self {
            size: 0,
            inode_type,
            refcnt: 1,
            block_numbers: vec![BOOT_BLOCK; slots],
        }
    }

    pub fn empty(slots: usize) -> Self {
        Self {
            size: 0,
            inode_type: InodeType::Invalid,
            refcnt: 0,
            block_numbers: vec![BOOT_BLOCK; slots],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inode_type != InodeType::Invalid
    }

    pub fn is_dir(&self) -> bool {
        self.inode_type == InodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.inode_type == InodeType::File
    }

    // 增加/减少硬链接计数
    pub fn inc_link(&mut self) -> Result<()> {
        self.refcnt = self.refcnt.checked_add(1).ok_or(FileSystemError::NoSpace)?;
        Ok(())
    }

    pub fn dec_link(&mut self) {
        if self.refcnt > 0 {
            self.refcnt -= 1;
        }
    }

    /// 已分配的数据块
    pub fn blocks(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.block_numbers.iter().copied().filter(|&b| b != BOOT_BLOCK)
    }

    fn pack(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..6].copy_from_slice(&(self.inode_type as u16).to_le_bytes());
        out[6..8].copy_from_slice(&self.refcnt.to_le_bytes());
        for (i, block) in self.block_numbers.iter().enumerate() {
            let at = 8 + i * 4;
            out[at..at + 4].copy_from_slice(&block.to_le_bytes());
        }
    }

    fn unpack(inode_number: InodeNumber, raw: &[u8], slots: usize) -> Result<Self> {
        let u32_at =
            |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let u16_at = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);

        let inode_type =
            InodeType::from_raw(u16_at(4)).ok_or(FileSystemError::InvalidInode(inode_number))?;

        Ok(Self {
            size: u32_at(0),
            inode_type,
            refcnt: u16_at(6),
            block_numbers: (0..slots).map(|i| u32_at(8 + i * 4)).collect(),
        })
    }
}

/// inode 表：磁盘上一段连续的定长 inode 记录，多个 inode 共用一个块
///
/// 写 inode 是对所在块的读-改-写，同块的其他 inode 会被一起写回，
/// 所有修改都必须在 `CompoundLock` 内进行。
#[derive(Clone)]
pub struct InodeTable {
    disk: Arc<dyn BlockDevice>,
    layout: Layout,
    bitmap: DataBlockBitmap,
}

impl InodeTable {
    pub fn new(disk: Arc<dyn BlockDevice>, layout: Layout, bitmap: DataBlockBitmap) -> Self {
        Self {
            disk,
            layout,
            bitmap,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn bitmap(&self) -> &DataBlockBitmap {
        &self.bitmap
    }

    pub(crate) fn disk(&self) -> &dyn BlockDevice {
        self.disk.as_ref()
    }

    /// 格式化时把整个 inode 表清零，即全部置为 INVALID
    pub fn clear(&self) -> Result<()> {
        for i in 0..self.layout.inode_table_blocks {
            self.disk.put(self.layout.inode_table_start + i, &[])?;
        }
        Ok(())
    }

    fn check_number(&self, inode_number: InodeNumber) -> Result<()> {
        if inode_number >= self.layout.max_inodes {
            return Err(FileSystemError::InvalidInode(inode_number));
        }
        Ok(())
    }

    pub fn read(&self, inode_number: InodeNumber) -> Result<Inode> {
        self.check_number(inode_number)?;
        let (block, offset) = self.layout.inode_position(inode_number);
        let bytes = self.disk.get(block)?;
        Inode::unpack(
            inode_number,
            &bytes[offset..offset + self.layout.inode_size],
            self.layout.max_inode_block_numbers,
        )
    }

    pub fn write(&self, inode_number: InodeNumber, inode: &Inode) -> Result<()> {
        self.check_number(inode_number)?;
        let (block, offset) = self.layout.inode_position(inode_number);
        let mut bytes = self.disk.get(block)?;
        inode.pack(&mut bytes[offset..offset + self.layout.inode_size]);
        self.disk.put(block, &bytes)?;
        Ok(())
    }

    /// 全部 inode，按编号顺序
    pub fn read_all(&self) -> Result<Vec<(InodeNumber, Inode)>> {
        let mut inodes = Vec::with_capacity(self.layout.max_inodes as usize);
        for i in 0..self.layout.inode_table_blocks {
            let bytes = self.disk.get(self.layout.inode_table_start + i)?;
            for slot in 0..self.layout.inodes_per_block {
                let inode_number =
                    (i as usize * self.layout.inodes_per_block + slot) as InodeNumber;
                if inode_number >= self.layout.max_inodes {
                    break;
                }
                let at = slot * self.layout.inode_size;
                let inode = Inode::unpack(
                    inode_number,
                    &bytes[at..at + self.layout.inode_size],
                    self.layout.max_inode_block_numbers,
                )?;
                inodes.push((inode_number, inode));
            }
        }
        Ok(inodes)
    }

    /// 找到编号最小的空闲 inode，只查找不占用
    pub fn find_available(&self) -> Result<InodeNumber> {
        self.read_all()?
            .into_iter()
            .find(|(_, inode)| !inode.is_valid())
            .map(|(inode_number, _)| inode_number)
            .ok_or(FileSystemError::NoFreeInode)
    }

    pub fn free_count(&self) -> Result<u32> {
        Ok(self
            .read_all()?
            .iter()
            .filter(|(_, inode)| !inode.is_valid())
            .count() as u32)
    }

    /// 把文件内的字节偏移映射到物理块
    ///
    /// 偏移所在的槽位还没有块时，`allocate` 为真则从位图分配一个清零的新块
    /// 并记入 inode，否则返回 `None`。不修改 `size`。
    pub fn block_for_offset(
        &self,
        inode_number: InodeNumber,
        offset: usize,
        allocate: bool,
    ) -> Result<Option<BlockNumber>> {
        let index = offset / self.layout.block_size;
        if index >= self.layout.max_inode_block_numbers {
            return Err(FileSystemError::FileTooLarge {
                requested: offset + 1,
                max: self.layout.max_file_size,
            });
        }

        let mut inode = self.read(inode_number)?;
        let current = inode.block_numbers[index];
        if current != BOOT_BLOCK {
            return Ok(Some(current));
        }
        if !allocate {
            return Ok(None);
        }

        let block = self.bitmap.alloc()?;
        // 新块可能残留已删除文件的内容
        if let Err(e) = self.disk.put(block, &[]) {
            self.bitmap.free(block)?;
            return Err(e.into());
        }
        inode.block_numbers[index] = block;
        if let Err(e) = self.write(inode_number, &inode) {
            self.bitmap.free(block)?;
            return Err(e);
        }

        debug!(
            "inode {}: slot {} backed by block {}",
            inode_number, index, block
        );
        Ok(Some(block))
    }

    /// 释放 inode：数据块归还位图，槽位置为 INVALID
    pub fn release(&self, inode_number: InodeNumber) -> Result<()> {
        let inode = self.read(inode_number)?;
        for block in inode.blocks() {
            self.bitmap.free(block)?;
        }
        self.write(
            inode_number,
            &Inode::empty(self.layout.max_inode_block_numbers),
        )?;
        debug!("inode {}: released", inode_number);
        Ok(())
    }
}
