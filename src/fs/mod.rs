use std::sync::Arc;

use log::{info, warn};

use crate::{
    disk::BlockDevice,
    fs::{
        check::Problem,
        config::Geometry,
        data_block_bitmap::DataBlockBitmap,
        directory::{encode_name, Directory},
        error::{FileSystemError, Result},
        file::RegularFile,
        inode_table::{Inode, InodeTable, InodeType},
        layout::{InodeNumber, Layout, ROOT_INODE},
        lock::CompoundLock,
        super_block::SuperBlock,
    },
};

pub mod check;
pub mod config;
pub mod data_block_bitmap;
pub mod directory;
pub mod error;
pub mod file;
pub mod inode_table;
pub mod layout;
pub mod lock;
pub mod path;
pub mod super_block;


/// `ls` 的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub name: String,
    pub inode_number: InodeNumber,
    pub inode_type: InodeType,
    pub refcnt: u16,
    pub size: u32,
}

/// 空间使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub free_blocks: u32,
    pub data_blocks: u32,
    pub free_inodes: u32,
    pub total_inodes: u32,
}

/// 文件系统：在块服务之上提供层次化的命名空间
///
/// 所有修改操作在 `CompoundLock` 内完成，失败时撤销已做的分配；
/// 只读操作不加锁。
pub struct FileSystem {
    disk: Arc<dyn BlockDevice>, // 底层块服务
    geometry: Geometry,
    inode_table: InodeTable, // inode 表，内含数据块位图
    lock: CompoundLock,
}

impl FileSystem {
    pub fn new(disk: Arc<dyn BlockDevice>, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;
        if disk.block_size() != geometry.block_size || disk.total_blocks() != geometry.total_blocks
        {
            return Err(FileSystemError::IncompatibleFormat(format!(
                "block service has {} blocks of {} bytes, geometry wants {} of {}",
                disk.total_blocks(),
                disk.block_size(),
                geometry.total_blocks,
                geometry.block_size
            )));
        }

        let layout = Layout::new(geometry);
        let bitmap = DataBlockBitmap::new(Arc::clone(&disk), layout);
        let inode_table = InodeTable::new(Arc::clone(&disk), layout, bitmap);
        let lock = CompoundLock::new(Arc::clone(&disk), layout.lock_block);

        Ok(Self {
            disk,
            geometry,
            inode_table,
            lock,
        })
    }

    pub fn layout(&self) -> &Layout {
        self.inode_table.layout()
    }

    /// 写入空的位图、inode 表与超级块，并建立根目录
    pub fn format(&self) -> Result<()> {
        let _guard = self.lock.acquire()?;

        self.inode_table.bitmap().clear()?;
        self.inode_table.clear()?;
        SuperBlock::new(self.geometry).store(self.disk.as_ref())?;

        let slots = self.layout().max_inode_block_numbers;
        self.inode_table
            .write(ROOT_INODE, &Inode::new(InodeType::Directory, slots))?;

        info!(
            "formatted: data region {}..{}, {} inodes",
            self.layout().data_start,
            self.layout().total_blocks,
            self.layout().max_inodes
        );
        Ok(())
    }

    /// 清除上次异常退出时留在锁块里的 `LOCKED`
    ///
    /// 只能在确定没有其他客户端的时候调用，例如刚从转储载入之后。
    pub fn clear_stale_lock(&self) -> Result<()> {
        self.lock.reset()?;
        info!("lock block {} reset", self.layout().lock_block);
        Ok(())
    }

    /// 校验超级块并设置挂载标志
    pub fn mount(&self) -> Result<()> {
        SuperBlock::load(self.disk.as_ref())?.check(&self.geometry)?;
        let root = self.inode_table.read(ROOT_INODE)?;
        if !root.is_dir() {
            return Err(FileSystemError::IncompatibleFormat(
                "root inode is not a directory".to_string(),
            ));
        }

        SuperBlock::swap_mounted(self.disk.as_ref(), true)?;
        info!("mounted");
        Ok(())
    }

    pub fn unmount(&self) -> Result<()> {
        if !SuperBlock::swap_mounted(self.disk.as_ref(), false)? {
            warn!("unmount: store was not marked mounted");
        }
        info!("unmounted");
        Ok(())
    }

    pub fn resolve(&self, path: &str, cwd: InodeNumber) -> Result<InodeNumber> {
        path::resolve(&self.inode_table, path, cwd)
    }

    pub fn resolve_parent<'p>(
        &self,
        path: &'p str,
        cwd: InodeNumber,
    ) -> Result<(InodeNumber, &'p str)> {
        path::resolve_parent(&self.inode_table, path, cwd)
    }

    pub fn stat(&self, inode_number: InodeNumber) -> Result<Inode> {
        let inode = self.inode_table.read(inode_number)?;
        if !inode.is_valid() {
            return Err(FileSystemError::InvalidInode(inode_number));
        }
        Ok(inode)
    }

    /// 列出目录，目录在前，其余按名字排序
    pub fn list_dir(&self, dir_inode: InodeNumber) -> Result<Vec<DirListing>> {
        let mut listing = Directory::open(&self.inode_table, dir_inode)?
            .entries()?
            .into_iter()
            .map(|entry| -> Result<DirListing> {
                let inode = self.inode_table.read(entry.inode_number)?;
                Ok(DirListing {
                    name: entry.name,
                    inode_number: entry.inode_number,
                    inode_type: inode.inode_type,
                    refcnt: inode.refcnt,
                    size: inode.size,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        listing.sort_by(|a, b| {
            let a_dir = a.inode_type == InodeType::Directory;
            let b_dir = b.inode_type == InodeType::Directory;
            b_dir.cmp(&a_dir).then_with(|| a.name.cmp(&b.name))
        });
        Ok(listing)
    }

    /// 在目录中创建新对象：分配 inode、分配目录槽位、写入目录项
    ///
    /// 任何一步失败都会把已占用的 inode 退回 INVALID。
    pub fn create(
        &self,
        dir_inode: InodeNumber,
        name: &str,
        inode_type: InodeType,
    ) -> Result<InodeNumber> {
        let _guard = self.lock.acquire()?;

        encode_name(name, self.layout().max_filename)?;
        let dir = Directory::open(&self.inode_table, dir_inode)?;
        match dir.lookup(name) {
            Ok(_) => return Err(FileSystemError::AlreadyExists(name.to_string())),
            Err(FileSystemError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let inode_number = self.inode_table.find_available()?;
        let slots = self.layout().max_inode_block_numbers;
        self.inode_table
            .write(inode_number, &Inode::new(inode_type, slots))?;

        let inserted = dir
            .find_available_entry()
            .and_then(|slot| dir.insert_entry(slot, name, inode_number));
        if let Err(e) = inserted {
            warn!(
                "create '{}' failed after claiming inode {}: {}",
                name, inode_number, e
            );
            if let Err(rollback) = self.inode_table.release(inode_number) {
                warn!("rollback of inode {} failed: {}", inode_number, rollback);
            }
            return Err(e);
        }

        info!(
            "created {:?} '{}' as inode {} in dir {}",
            inode_type, name, inode_number, dir_inode
        );
        Ok(inode_number)
    }

    pub fn mkdir(&self, dir_inode: InodeNumber, name: &str) -> Result<InodeNumber> {
        self.create(dir_inode, name, InodeType::Directory)
    }

    /// 硬链接：在 `dir_inode` 中新增指向 `target_path` 的目录项
    pub fn link(&self, target_path: &str, link_name: &str, dir_inode: InodeNumber) -> Result<()> {
        let _guard = self.lock.acquire()?;

        encode_name(link_name, self.layout().max_filename)?;
        let target = self.resolve(target_path, dir_inode)?;
        let dir = Directory::open(&self.inode_table, dir_inode)?;
        match dir.lookup(link_name) {
            Ok(_) => return Err(FileSystemError::AlreadyExists(link_name.to_string())),
            Err(FileSystemError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let slot = dir.find_available_entry()?;
        let original = self.inode_table.read(target)?;
        let mut linked = original.clone();
        linked.inc_link()?;
        self.inode_table.write(target, &linked)?;

        if let Err(e) = dir.insert_entry(slot, link_name, target) {
            warn!("link '{}' failed, restoring refcnt of inode {}", link_name, target);
            if let Err(rollback) = self.inode_table.write(target, &original) {
                warn!("rollback of inode {} failed: {}", target, rollback);
            }
            return Err(e);
        }

        info!(
            "linked '{}' in dir {} -> inode {} (refcnt {})",
            link_name, dir_inode, target, linked.refcnt
        );
        Ok(())
    }

    /// 删除一个目录项；最后一个链接消失时释放 inode 和它的数据块
    pub fn unlink(&self, path: &str, cwd: InodeNumber) -> Result<()> {
        let _guard = self.lock.acquire()?;

        let (parent, name) = self.resolve_parent(path, cwd)?;
        let dir = Directory::open(&self.inode_table, parent)?;
        let target = dir.lookup(name)?;
        if target == ROOT_INODE {
            return Err(FileSystemError::InvalidName(path.to_string()));
        }

        let mut inode = self.inode_table.read(target)?;
        if inode.is_dir()
            && inode.refcnt <= 1
            && !Directory::open(&self.inode_table, target)?.is_empty()?
        {
            return Err(FileSystemError::DirectoryNotEmpty(path.to_string()));
        }

        dir.remove_entry(name)?;
        inode.dec_link();
        if inode.refcnt == 0 {
            self.inode_table.release(target)?;
        } else {
            self.inode_table.write(target, &inode)?;
        }

        info!("unlinked '{}' (inode {}, refcnt {})", path, target, inode.refcnt);
        Ok(())
    }

    pub fn read(&self, inode_number: InodeNumber, offset: usize, length: usize) -> Result<Vec<u8>> {
        RegularFile::open(&self.inode_table, inode_number)?.read(offset, length)
    }

    pub fn write(&self, inode_number: InodeNumber, offset: usize, data: &[u8]) -> Result<usize> {
        let _guard = self.lock.acquire()?;
        RegularFile::open(&self.inode_table, inode_number)?.write(offset, data)
    }

    /// 追加：读取当前大小并在末尾写入，两步在同一个临界区内
    pub fn append(&self, inode_number: InodeNumber, data: &[u8]) -> Result<usize> {
        let _guard = self.lock.acquire()?;
        let file = RegularFile::open(&self.inode_table, inode_number)?;
        let size = file.size()?;
        file.write(size, data)
    }

    pub fn usage(&self) -> Result<Usage> {
        Ok(Usage {
            free_blocks: self.inode_table.bitmap().free_count()?,
            data_blocks: self.layout().data_blocks(),
            free_inodes: self.inode_table.free_count()?,
            total_inodes: self.layout().max_inodes,
        })
    }

    /// 一致性检查，持锁进行以免看到中间状态
    pub fn check(&self) -> Result<Vec<Problem>> {
        let _guard = self.lock.acquire()?;
        check::check(&self.inode_table)
    }
}
