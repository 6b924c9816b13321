use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{types::SUPER_BLOCK, BlockDevice},
    fs::{
        config::Geometry,
        error::{FileSystemError, Result},
    },
};

/// 魔数，用于识别文件系统
pub const MAGIC: u32 = 0x4D46_5331; // "MFS1"

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u32,
    pub geometry: Geometry, // 格式化参数
    pub mounted: bool,      // 是否已被某个客户端挂载
}

impl SuperBlock {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            magic: MAGIC,
            geometry,
            mounted: false,
        }
    }

    fn encode(&self, block_size: usize) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > block_size {
            return Err(FileSystemError::InvalidGeometry(format!(
                "superblock needs {} bytes, block holds {}",
                bytes.len(),
                block_size
            )));
        }
        Ok(bytes)
    }

    fn decode(block: &[u8]) -> Result<Self> {
        bincode::deserialize(block)
            .map_err(|_| FileSystemError::IncompatibleFormat("unreadable superblock".to_string()))
    }

    pub fn store(&self, disk: &dyn BlockDevice) -> Result<()> {
        disk.put(SUPER_BLOCK, &self.encode(disk.block_size())?)?;
        Ok(())
    }

    pub fn load(disk: &dyn BlockDevice) -> Result<Self> {
        Self::decode(&disk.get(SUPER_BLOCK)?)
    }

    /// 检查磁盘上的超级块与期望的参数一致
    pub fn check(&self, expected: &Geometry) -> Result<()> {
        if self.magic != MAGIC {
            return Err(FileSystemError::IncompatibleFormat(format!(
                "bad magic {:#x}",
                self.magic
            )));
        }
        if &self.geometry != expected {
            return Err(FileSystemError::IncompatibleFormat(format!(
                "on-disk geometry {:?} differs from requested {:?}",
                self.geometry, expected
            )));
        }
        Ok(())
    }

    /// 原子地设置挂载标志，返回之前是否已挂载
    pub fn swap_mounted(disk: &dyn BlockDevice, mounted: bool) -> Result<bool> {
        let mut current = Self::load(disk)?;
        current.mounted = mounted;
        let encoded = current.encode(disk.block_size())?;
        let previous = Self::decode(&disk.read_set(SUPER_BLOCK, &encoded)?)?;
        if mounted && previous.mounted {
            warn!("superblock was already marked mounted; store is shared or was not released");
        }
        Ok(previous.mounted)
    }
}
