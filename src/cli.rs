use std::path::PathBuf;

use clap::Parser;

use crate::fs::config::{
    Geometry, DEFAULT_BLOCK_SIZE, DEFAULT_INODE_SIZE, DEFAULT_MAX_FILENAME, DEFAULT_MAX_INODES,
    DEFAULT_TOTAL_BLOCKS,
};

/// MiniFS：块服务之上的 inode 文件系统交互 shell
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Block size in bytes
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Total number of blocks
    #[arg(long, default_value_t = DEFAULT_TOTAL_BLOCKS)]
    pub blocks: u32,

    /// Inode record size in bytes
    #[arg(long, default_value_t = DEFAULT_INODE_SIZE)]
    pub inode_size: usize,

    /// Maximum number of inodes
    #[arg(long, default_value_t = DEFAULT_MAX_INODES)]
    pub inodes: u32,

    /// Maximum file name length in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FILENAME)]
    pub max_filename: usize,

    /// Identifying prefix of the dump file, in hex
    #[arg(long, default_value = "12345678")]
    pub prefix: String,

    /// Directory holding dump files
    #[arg(long, default_value = ".")]
    pub dump_dir: PathBuf,

    /// Ignore an existing dump and format a blank store
    #[arg(long)]
    pub fresh: bool,

    /// Simulate a damaged block: every read of it reports corruption
    #[arg(long)]
    pub damaged_block: Option<u32>,

    /// Timeout for each block service call, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Log file (filter with RUST_LOG)
    #[arg(long, default_value = "minifs.log")]
    pub log_file: PathBuf,
}

impl Cli {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            block_size: self.block_size,
            total_blocks: self.blocks,
            inode_size: self.inode_size,
            max_inodes: self.inodes,
            max_filename: self.max_filename,
        }
    }
}
