use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{fault::FaultPolicy, memory_disk::MemoryDisk, types::Block, BlockDevice},
    fs::{
        config::Geometry,
        error::{FileSystemError, Result},
    },
};

/// 转储文件内容：参数头加上全部原始块
#[derive(Debug, Serialize, Deserialize)]
struct DumpImage {
    geometry: Geometry,
    blocks: Vec<Block>,
}

/// 转储文件名，编码了标识前缀与四个布局参数
pub fn dump_file_name(prefix: &[u8], geometry: &Geometry) -> String {
    let hex: String = prefix.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}_BS_{}_NB_{}_IS_{}_MI_{}.dump",
        hex, geometry.block_size, geometry.total_blocks, geometry.inode_size, geometry.max_inodes
    )
}

pub fn dump_path(dir: &Path, prefix: &[u8], geometry: &Geometry) -> PathBuf {
    dir.join(dump_file_name(prefix, geometry))
}

/// 解析十六进制前缀，例如 "12345678"
pub fn parse_prefix(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// 将整个块数组写入转储文件
pub fn save_dump(
    disk: &MemoryDisk,
    geometry: &Geometry,
    path: &Path,
    progress: &ProgressBar,
) -> Result<()> {
    progress.set_length(disk.total_blocks() as u64);
    let mut blocks = Vec::with_capacity(disk.total_blocks() as usize);
    for block in disk.snapshot() {
        blocks.push(block);
        progress.inc(1);
    }

    let image = DumpImage {
        geometry: *geometry,
        blocks,
    };
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &image)?;
    progress.finish_and_clear();

    info!("dumped {} blocks to {}", image.blocks.len(), path.display());
    Ok(())
}

/// 从转储文件重建块存储，参数不一致视为格式不兼容
pub fn load_dump(
    geometry: &Geometry,
    path: &Path,
    faults: Box<dyn FaultPolicy>,
    progress: &ProgressBar,
) -> Result<MemoryDisk> {
    let reader = BufReader::new(File::open(path)?);
    let image: DumpImage = bincode::deserialize_from(reader)?;

    if &image.geometry != geometry {
        return Err(FileSystemError::IncompatibleFormat(format!(
            "dump was written with {:?}, expected {:?}",
            image.geometry, geometry
        )));
    }
    if image.blocks.len() != geometry.total_blocks as usize {
        return Err(FileSystemError::IncompatibleFormat(format!(
            "dump holds {} blocks, expected {}",
            image.blocks.len(),
            geometry.total_blocks
        )));
    }

    progress.set_length(image.blocks.len() as u64);
    for block in &image.blocks {
        if block.len() != geometry.block_size {
            return Err(FileSystemError::IncompatibleFormat(format!(
                "dump block of {} bytes, expected {}",
                block.len(),
                geometry.block_size
            )));
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!("loaded {} blocks from {}", image.blocks.len(), path.display());
    Ok(MemoryDisk::from_blocks(
        geometry.block_size,
        image.blocks,
        faults,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::NoFaults;

    #[test]
    fn file_name_encodes_prefix_and_geometry() {
        let name = dump_file_name(&[0x12, 0x34, 0x56, 0x78], &Geometry::default());
        assert_eq!(name, "12345678_BS_128_NB_256_IS_16_MI_16.dump");
    }

    #[test]
    fn parses_hex_prefix() {
        assert_eq!(parse_prefix("12ab"), Some(vec![0x12, 0xab]));
        assert_eq!(parse_prefix("123"), None);
        assert_eq!(parse_prefix("zz"), None);
        assert_eq!(parse_prefix(""), None);
    }

    #[test]
    fn dump_and_reload_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = Geometry::default();
        let path = dump_path(dir.path(), b"\x01", &geometry);

        let disk = MemoryDisk::new(geometry.block_size, geometry.total_blocks);
        disk.put(42, b"persisted").unwrap();
        save_dump(&disk, &geometry, &path, &ProgressBar::hidden()).unwrap();

        let reloaded =
            load_dump(&geometry, &path, Box::new(NoFaults), &ProgressBar::hidden()).unwrap();
        assert_eq!(&reloaded.get(42).unwrap()[..9], b"persisted");
    }

    #[test]
    fn mismatched_geometry_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = Geometry::default();
        let path = dir.path().join("image.dump");

        let disk = MemoryDisk::new(geometry.block_size, geometry.total_blocks);
        save_dump(&disk, &geometry, &path, &ProgressBar::hidden()).unwrap();

        let other = Geometry {
            inode_size: 32,
            ..geometry
        };
        let result = load_dump(&other, &path, Box::new(NoFaults), &ProgressBar::hidden());
        assert!(matches!(result, Err(FileSystemError::IncompatibleFormat(_))));
    }
}
