use log::debug;

use crate::{
    disk::types::BOOT_BLOCK,
    fs::{
        error::{FileSystemError, Result},
        inode_table::InodeTable,
        layout::InodeNumber,
    },
};

/// 普通文件的按字节读写
pub struct RegularFile<'a> {
    table: &'a InodeTable,
    inode_number: InodeNumber,
}

impl<'a> RegularFile<'a> {
    pub fn open(table: &'a InodeTable, inode_number: InodeNumber) -> Result<Self> {
        if !table.read(inode_number)?.is_file() {
            return Err(FileSystemError::NotAFile(format!("inode {}", inode_number)));
        }
        Ok(Self {
            table,
            inode_number,
        })
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.table.read(self.inode_number)?.size as usize)
    }

    /// 读取 `[offset, offset + length)`，超出文件大小的部分被截掉
    pub fn read(&self, offset: usize, length: usize) -> Result<Vec<u8>> {
        let block_size = self.table.layout().block_size;
        let size = self.size()?;
        let end = offset.saturating_add(length).min(size);
        if offset >= end {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(end - offset);
        let mut pos = offset;
        while pos < end {
            let within = pos % block_size;
            let chunk = (block_size - within).min(end - pos);

            match self.table.block_for_offset(self.inode_number, pos, false)? {
                Some(block) => {
                    let bytes = self.table.disk().get(block)?;
                    data.extend_from_slice(&bytes[within..within + chunk]);
                }
                // 空洞读出为零
                None => data.resize(data.len() + chunk, 0),
            }
            pos += chunk;
        }
        Ok(data)
    }

    /// 在 `offset` 处写入，按需分配块，返回写入的字节数
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<usize> {
        let layout = self.table.layout();
        let block_size = layout.block_size;
        let end = offset.saturating_add(data.len());
        if end > layout.max_file_size {
            return Err(FileSystemError::FileTooLarge {
                requested: end,
                max: layout.max_file_size,
            });
        }
        if data.is_empty() {
            return Ok(0);
        }

        // 先确认空间足够，避免写到一半才发现没有块
        let inode = self.table.read(self.inode_number)?;
        let missing = (offset / block_size..=(end - 1) / block_size)
            .filter(|&index| inode.block_numbers[index] == BOOT_BLOCK)
            .count() as u32;
        if missing > self.table.bitmap().free_count()? {
            return Err(FileSystemError::NoSpace);
        }

        let disk = self.table.disk();
        let mut pos = offset;
        while pos < end {
            let within = pos % block_size;
            let chunk = (block_size - within).min(end - pos);
            let block = self
                .table
                .block_for_offset(self.inode_number, pos, true)?
                .ok_or(FileSystemError::NoSpace)?;

            let source = &data[pos - offset..pos - offset + chunk];
            if chunk == block_size {
                disk.put(block, source)?;
            } else {
                let mut bytes = disk.get(block)?;
                bytes[within..within + chunk].copy_from_slice(source);
                disk.put(block, &bytes)?;
            }
            pos += chunk;
        }

        let mut inode = self.table.read(self.inode_number)?;
        if end as u32 > inode.size {
            inode.size = end as u32;
            self.table.write(self.inode_number, &inode)?;
        }

        debug!(
            "inode {}: wrote {} bytes at {}",
            self.inode_number,
            data.len(),
            offset
        );
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        disk::{BlockDevice, MemoryDisk},
        fs::{
            config::Geometry,
            data_block_bitmap::DataBlockBitmap,
            inode_table::{Inode, InodeType},
            layout::Layout,
        },
    };

    fn table_with_file() -> InodeTable {
        let geometry = Geometry::default();
        let disk: Arc<dyn BlockDevice> =
            Arc::new(MemoryDisk::new(geometry.block_size, geometry.total_blocks));
        let layout = Layout::new(geometry);
        let table = InodeTable::new(Arc::clone(&disk), layout, DataBlockBitmap::new(disk, layout));
        table.write(0, &Inode::new(InodeType::Directory, 2)).unwrap();
        table.write(1, &Inode::new(InodeType::File, 2)).unwrap();
        table
    }

    #[test]
    fn write_then_read_across_blocks() {
        let table = table_with_file();
        let file = RegularFile::open(&table, 1).unwrap();
        let data: Vec<u8> = (0..200).map(|i| i as u8).collect();

        assert_eq!(file.write(0, &data).unwrap(), 200);
        assert_eq!(file.size().unwrap(), 200);
        assert_eq!(file.read(0, 256).unwrap(), data);
        assert_eq!(file.read(120, 10).unwrap(), data[120..130].to_vec());
        assert!(file.read(200, 10).unwrap().is_empty());
        assert!(file.read(500, 10).unwrap().is_empty());
    }

    #[test]
    fn overwrite_merges_into_existing_block() {
        let table = table_with_file();
        let file = RegularFile::open(&table, 1).unwrap();
        file.write(0, b"hello world").unwrap();
        file.write(6, b"there").unwrap();

        assert_eq!(file.read(0, 100).unwrap(), b"hello there".to_vec());
        assert_eq!(file.size().unwrap(), 11);
    }

    #[test]
    fn sparse_write_reads_zeros_before_it() {
        let table = table_with_file();
        let file = RegularFile::open(&table, 1).unwrap();
        file.write(130, b"x").unwrap();

        let content = file.read(0, 256).unwrap();
        assert_eq!(content.len(), 131);
        assert!(content[..130].iter().all(|&b| b == 0));
        assert_eq!(content[130], b'x');
        assert_eq!(table.read(1).unwrap().blocks().count(), 1);
    }

    #[test]
    fn too_large_write_changes_nothing() {
        let table = table_with_file();
        let file = RegularFile::open(&table, 1).unwrap();
        file.write(0, b"keep").unwrap();
        let free = table.bitmap().free_count().unwrap();

        assert!(matches!(
            file.write(256, b"x"),
            Err(FileSystemError::FileTooLarge { requested: 257, max: 256 })
        ));
        assert!(matches!(
            file.write(100, &[1; 200]),
            Err(FileSystemError::FileTooLarge { .. })
        ));
        assert_eq!(file.read(0, 256).unwrap(), b"keep".to_vec());
        assert_eq!(table.bitmap().free_count().unwrap(), free);
    }

    #[test]
    fn write_fills_to_exact_limit() {
        let table = table_with_file();
        let file = RegularFile::open(&table, 1).unwrap();
        assert_eq!(file.write(0, &[7; 256]).unwrap(), 256);
        assert_eq!(file.read(0, 1000).unwrap(), vec![7; 256]);
    }

    #[test]
    fn no_space_is_reported_before_writing() {
        let table = table_with_file();
        while table.bitmap().alloc().is_ok() {}
        let file = RegularFile::open(&table, 1).unwrap();

        assert!(matches!(file.write(0, b"data"), Err(FileSystemError::NoSpace)));
        assert_eq!(file.size().unwrap(), 0);
    }

    #[test]
    fn directories_are_not_files() {
        let table = table_with_file();
        assert!(matches!(
            RegularFile::open(&table, 0),
            Err(FileSystemError::NotAFile(_))
        ));
    }
}
