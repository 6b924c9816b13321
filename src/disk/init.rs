use std::path::Path;

use indicatif::ProgressBar;
use log::{info, warn};

use crate::{
    disk::{dump::load_dump, fault::FaultPolicy, memory_disk::MemoryDisk},
    fs::{config::Geometry, error::Result},
};

/// 启动时准备好的块存储
pub struct PreparedDisk {
    pub disk: MemoryDisk,
    pub needs_format: bool, // 新建的空白磁盘需要先格式化
}

/// 有转储文件就重新载入，否则创建空白磁盘
pub fn prepare_disk(
    geometry: &Geometry,
    dump: &Path,
    fresh: bool,
    faults: Box<dyn FaultPolicy>,
    progress: &ProgressBar,
) -> Result<PreparedDisk> {
    geometry.validate()?;

    if !fresh && dump.exists() {
        info!("reloading block store from {}", dump.display());
        let disk = load_dump(geometry, dump, faults, progress)?;
        return Ok(PreparedDisk {
            disk,
            needs_format: false,
        });
    }

    if fresh && dump.exists() {
        warn!("ignoring existing dump {}", dump.display());
    }
    info!(
        "creating blank block store: {} blocks of {} bytes",
        geometry.total_blocks, geometry.block_size
    );
    Ok(PreparedDisk {
        disk: MemoryDisk::with_faults(geometry.block_size, geometry.total_blocks, faults),
        needs_format: true,
    })
}
