use std::sync::Arc;

use log::debug;

use crate::{
    disk::{BlockDevice, BlockError, BlockNumber},
    fs::{
        error::{FileSystemError, Result},
        layout::Layout,
    },
};

/// 空闲块位图
///
/// 位图区每个字节对应一个块号，0 表示空闲，非 0 表示已用。
/// 只有数据区的块参与分配。读-改-写没有原子性，调用方必须持有 `CompoundLock`。
#[derive(Clone)]
pub struct DataBlockBitmap {
    disk: Arc<dyn BlockDevice>,
    layout: Layout,
}

impl DataBlockBitmap {
    pub fn new(disk: Arc<dyn BlockDevice>, layout: Layout) -> Self {
        Self { disk, layout }
    }

    /// 格式化时把整个位图区清零
    pub fn clear(&self) -> Result<()> {
        for i in 0..self.layout.bitmap_blocks {
            self.disk.put(self.layout.bitmap_start + i, &[])?;
        }
        Ok(())
    }

    /// 首次适配：分配编号最小的空闲数据块
    pub fn alloc(&self) -> Result<BlockNumber> {
        let block_size = self.layout.block_size;

        for i in 0..self.layout.bitmap_blocks {
            let first = i as usize * block_size;
            if first >= self.layout.total_blocks as usize {
                break;
            }

            let bitmap_block = self.layout.bitmap_start + i;
            let mut bytes = self.disk.get(bitmap_block)?;
            let free = bytes.iter().enumerate().position(|(j, &used)| {
                let block_number = first + j;
                used == 0
                    && block_number >= self.layout.data_start as usize
                    && block_number < self.layout.total_blocks as usize
            });

            if let Some(j) = free {
                bytes[j] = 1;
                self.disk.put(bitmap_block, &bytes)?;
                let block_number = (first + j) as BlockNumber;
                debug!("bitmap: allocated block {}", block_number);
                return Ok(block_number);
            }
        }

        Err(FileSystemError::NoSpace)
    }

    /// 释放一个数据块，调用方保证已没有 inode 引用它
    pub fn free(&self, block_number: BlockNumber) -> Result<()> {
        self.check_data_block(block_number)?;
        let (bitmap_block, index) = self.layout.bitmap_position(block_number);
        let mut bytes = self.disk.get(bitmap_block)?;
        bytes[index] = 0;
        self.disk.put(bitmap_block, &bytes)?;
        debug!("bitmap: released block {}", block_number);
        Ok(())
    }

    /// 已用的数据块号
    pub fn used_blocks(&self) -> Result<Vec<BlockNumber>> {
        let mut used = Vec::new();
        let mut cached: Option<(BlockNumber, Vec<u8>)> = None;

        for block_number in self.layout.data_start..self.layout.total_blocks {
            let (bitmap_block, index) = self.layout.bitmap_position(block_number);
            if cached.as_ref().map(|(b, _)| *b) != Some(bitmap_block) {
                cached = Some((bitmap_block, self.disk.get(bitmap_block)?));
            }
            if let Some((_, bytes)) = &cached {
                if bytes[index] != 0 {
                    used.push(block_number);
                }
            }
        }
        Ok(used)
    }

    pub fn free_count(&self) -> Result<u32> {
        Ok(self.layout.data_blocks() - self.used_blocks()?.len() as u32)
    }

    fn check_data_block(&self, block_number: BlockNumber) -> Result<()> {
        if block_number < self.layout.data_start || block_number >= self.layout.total_blocks {
            return Err(BlockError::OutOfRange {
                block: block_number,
                total: self.layout.total_blocks,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{disk::MemoryDisk, fs::config::Geometry};

    fn bitmap() -> DataBlockBitmap {
        let geometry = Geometry::default();
        let disk = Arc::new(MemoryDisk::new(geometry.block_size, geometry.total_blocks));
        DataBlockBitmap::new(disk, Layout::new(geometry))
    }

    #[test]
    fn allocates_lowest_free_data_block() {
        let bitmap = bitmap();

        assert_eq!(bitmap.alloc().unwrap(), 6);
        assert_eq!(bitmap.alloc().unwrap(), 7);
        assert_eq!(bitmap.alloc().unwrap(), 8);

        bitmap.free(7).unwrap();
        assert_eq!(bitmap.used_blocks().unwrap(), vec![6, 8]);
        assert_eq!(bitmap.alloc().unwrap(), 7);
    }

    #[test]
    fn allocation_crosses_bitmap_blocks() {
        let bitmap = bitmap();
        for expected in 6..256 {
            assert_eq!(bitmap.alloc().unwrap(), expected);
        }
        assert!(matches!(bitmap.alloc(), Err(FileSystemError::NoSpace)));
        assert_eq!(bitmap.free_count().unwrap(), 0);

        bitmap.free(200).unwrap();
        assert_eq!(bitmap.free_count().unwrap(), 1);
        assert_eq!(bitmap.alloc().unwrap(), 200);
    }

    #[test]
    fn refuses_metadata_blocks() {
        let bitmap = bitmap();
        assert!(bitmap.free(3).is_err());
        assert!(bitmap.free(256).is_err());
    }
}
