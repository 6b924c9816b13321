use log::debug;

use crate::{
    disk::BlockNumber,
    fs::{
        error::{FileSystemError, Result},
        inode_table::{InodeTable, InodeType},
        layout::InodeNumber,
    },
};

// 一个目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode_number: InodeNumber,
}

/// 目录项槽位：第 `index` 个目录项，位于 `block` 中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySlot {
    pub index: usize,
    pub block: BlockNumber,
}

/// 检查文件名并编码为定长、右侧补零的字节串
pub fn encode_name(name: &str, max_filename: usize) -> Result<Vec<u8>> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
        || name.len() > max_filename
    {
        return Err(FileSystemError::InvalidName(name.to_string()));
    }
    let mut bytes = name.as_bytes().to_vec();
    bytes.resize(max_filename, 0);
    Ok(bytes)
}

/// 目录：内容是一串定长的 (文件名, inode 号) 目录项，存放在目录 inode 的数据块中
///
/// 目录 inode 的 `size` 记录曾经用到的目录项字节数，删除留下的空槽
/// （文件名全零）会被后续插入复用。
pub struct Directory<'a> {
    table: &'a InodeTable,
    inode_number: InodeNumber,
}

impl<'a> Directory<'a> {
    pub fn open(table: &'a InodeTable, inode_number: InodeNumber) -> Result<Self> {
        let inode = table.read(inode_number)?;
        if inode.inode_type != InodeType::Directory {
            return Err(FileSystemError::NotADirectory(format!("inode {}", inode_number)));
        }
        Ok(Self {
            table,
            inode_number,
        })
    }

    /// 已用过的槽位数（含空槽）
    fn slot_count(&self) -> Result<usize> {
        let size = self.table.read(self.inode_number)?.size as usize;
        Ok(size / self.table.layout().dir_entry_size)
    }

    fn block_offset(&self, index: usize) -> usize {
        let layout = self.table.layout();
        (index / layout.entries_per_block) * layout.block_size
    }

    fn entry_range(&self, index: usize) -> std::ops::Range<usize> {
        let layout = self.table.layout();
        let start = (index % layout.entries_per_block) * layout.dir_entry_size;
        start..start + layout.dir_entry_size
    }

    /// 遍历所有已用过的槽位，回调返回 `Some` 时提前结束
    fn scan<T>(
        &self,
        mut visit: impl FnMut(EntrySlot, Option<DirEntry>) -> Option<T>,
    ) -> Result<Option<T>> {
        let layout = self.table.layout();
        let count = self.slot_count()?;
        let mut index = 0;

        while index < count {
            let offset = self.block_offset(index);
            let block = self
                .table
                .block_for_offset(self.inode_number, offset, false)?
                .ok_or(FileSystemError::InvalidInode(self.inode_number))?;
            let bytes = self.table.disk().get(block)?;

            let last = (index / layout.entries_per_block + 1) * layout.entries_per_block;
            while index < count.min(last) {
                let raw = &bytes[self.entry_range(index)];
                let entry = decode_entry(raw, layout.max_filename);
                if let Some(found) = visit(EntrySlot { index, block }, entry) {
                    return Ok(Some(found));
                }
                index += 1;
            }
        }
        Ok(None)
    }

    /// 全部有效目录项
    pub fn entries(&self) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        self.scan::<()>(|_, entry| {
            entries.extend(entry);
            None
        })?;
        Ok(entries)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.scan(|_, entry| entry.map(|_| ()))?.is_none())
    }

    fn find(&self, name: &str) -> Result<Option<(EntrySlot, InodeNumber)>> {
        self.scan(|slot, entry| match entry {
            Some(entry) if entry.name == name => Some((slot, entry.inode_number)),
            _ => None,
        })
    }

    /// 按名查找，返回 inode 号
    pub fn lookup(&self, name: &str) -> Result<InodeNumber> {
        self.find(name)?
            .map(|(_, inode_number)| inode_number)
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))
    }

    /// 找一个可用槽位：优先复用空槽，否则在末尾追加，必要时分配新块
    pub fn find_available_entry(&self) -> Result<EntrySlot> {
        if let Some(slot) = self.scan(|slot, entry| entry.is_none().then_some(slot))? {
            return Ok(slot);
        }

        let index = self.slot_count()?;
        if index >= self.table.layout().max_dir_entries() {
            return Err(FileSystemError::NoSpace);
        }
        let block = self
            .table
            .block_for_offset(self.inode_number, self.block_offset(index), true)?
            .ok_or(FileSystemError::NoSpace)?;
        Ok(EntrySlot { index, block })
    }

    /// 写入目录项；槽位在当前 size 之外时同时扩大目录的 size
    pub fn insert_entry(
        &self,
        slot: EntrySlot,
        name: &str,
        inode_number: InodeNumber,
    ) -> Result<()> {
        let layout = self.table.layout();
        let mut raw = encode_name(name, layout.max_filename)?;
        raw.extend_from_slice(&inode_number.to_le_bytes());

        let disk = self.table.disk();
        let mut bytes = disk.get(slot.block)?;
        bytes[self.entry_range(slot.index)].copy_from_slice(&raw);
        disk.put(slot.block, &bytes)?;

        let mut dir = self.table.read(self.inode_number)?;
        let end = ((slot.index + 1) * layout.dir_entry_size) as u32;
        if end > dir.size {
            dir.size = end;
            self.table.write(self.inode_number, &dir)?;
        }

        debug!(
            "dir {}: entry {} '{}' -> inode {}",
            self.inode_number, slot.index, name, inode_number
        );
        Ok(())
    }

    /// 删除目录项，槽位清零留待复用，返回它指向的 inode 号
    pub fn remove_entry(&self, name: &str) -> Result<InodeNumber> {
        let (slot, inode_number) = self
            .find(name)?
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))?;

        let disk = self.table.disk();
        let mut bytes = disk.get(slot.block)?;
        bytes[self.entry_range(slot.index)].fill(0);
        disk.put(slot.block, &bytes)?;

        debug!("dir {}: removed entry {} '{}'", self.inode_number, slot.index, name);
        Ok(inode_number)
    }
}

fn decode_entry(raw: &[u8], max_filename: usize) -> Option<DirEntry> {
    let name = &raw[..max_filename];
    if name.iter().all(|&b| b == 0) {
        return None;
    }
    let end = name.iter().position(|&b| b == 0).unwrap_or(max_filename);
    let number = &raw[max_filename..max_filename + 4];

    Some(DirEntry {
        name: String::from_utf8_lossy(&name[..end]).into_owned(),
        inode_number: u32::from_le_bytes([number[0], number[1], number[2], number[3]]),
    })
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
            inode_table::Inode,
            layout::{Layout, ROOT_INODE},
        },
    };

    fn table_with_root() -> InodeTable {
        let geometry = Geometry::default();
        let disk: Arc<dyn BlockDevice> =
            Arc::new(MemoryDisk::new(geometry.block_size, geometry.total_blocks));
        let layout = Layout::new(geometry);
        let bitmap = DataBlockBitmap::new(Arc::clone(&disk), layout);
        let table = InodeTable::new(disk, layout, bitmap);
        table
            .write(ROOT_INODE, &Inode::new(InodeType::Directory, 2))
            .unwrap();
        table
    }

    fn add(dir: &Directory, name: &str, inode_number: InodeNumber) {
        let slot = dir.find_available_entry().unwrap();
        dir.insert_entry(slot, name, inode_number).unwrap();
    }

    #[test]
    fn encode_name_rejects_bad_names() {
        assert_eq!(encode_name("abc", 4).unwrap(), b"abc\0".to_vec());
        for bad in ["", ".", "..", "a/b", "toolongname"] {
            assert!(matches!(
                encode_name(bad, 8),
                Err(FileSystemError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn insert_then_lookup() {
        let table = table_with_root();
        let root = Directory::open(&table, ROOT_INODE).unwrap();

        add(&root, "alpha", 3);
        add(&root, "beta", 5);

        assert_eq!(root.lookup("alpha").unwrap(), 3);
        assert_eq!(root.lookup("beta").unwrap(), 5);
        assert!(matches!(root.lookup("gamma"), Err(FileSystemError::NotFound(_))));
        assert_eq!(table.read(ROOT_INODE).unwrap().size, 32);
    }

    #[test]
    fn entries_span_blocks_until_full() {
        let table = table_with_root();
        let root = Directory::open(&table, ROOT_INODE).unwrap();

        for i in 0..16 {
            add(&root, &format!("f{}", i), i + 1);
        }
        assert_eq!(root.lookup("f15").unwrap(), 16);
        assert_eq!(root.entries().unwrap().len(), 16);
        assert_eq!(table.read(ROOT_INODE).unwrap().blocks().count(), 2);
        assert!(matches!(
            root.find_available_entry(),
            Err(FileSystemError::NoSpace)
        ));
    }

    #[test]
    fn removed_slot_is_reused() {
        let table = table_with_root();
        let root = Directory::open(&table, ROOT_INODE).unwrap();
        add(&root, "a", 1);
        add(&root, "b", 2);
        add(&root, "c", 3);

        assert_eq!(root.remove_entry("b").unwrap(), 2);
        assert!(matches!(root.lookup("b"), Err(FileSystemError::NotFound(_))));

        let slot = root.find_available_entry().unwrap();
        assert_eq!(slot.index, 1);
        root.insert_entry(slot, "d", 4).unwrap();

        let names: Vec<_> = root.entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["a", "d", "c"]);
        assert_eq!(table.read(ROOT_INODE).unwrap().size, 48);
    }

    #[test]
    fn full_length_names_round_trip() {
        let table = table_with_root();
        let root = Directory::open(&table, ROOT_INODE).unwrap();
        add(&root, "twelve_chars", 7);
        assert_eq!(root.lookup("twelve_chars").unwrap(), 7);
        assert!(!root.is_empty().unwrap());
    }

    #[test]
    fn open_requires_directory() {
        let table = table_with_root();
        table.write(1, &Inode::new(InodeType::File, 2)).unwrap();
        assert!(matches!(
            Directory::open(&table, 1),
            Err(FileSystemError::NotADirectory(_))
        ));
    }
}
